//! # walletd-wallet
//!
//! Wallet state for factom-walletd.
//!
//! This crate provides:
//! - An address book of Factoid and EC keys, derived from a seed or imported
//! - Atomic JSON persistence of the address book
//! - Named transaction drafts, each behind its own lock
//! - Entry credit rate sources for fee calculation

pub mod error;
pub mod rate;
pub mod store;
pub mod wallet;

pub use error::WalletError;
pub use rate::{FixedRate, RateSource};
pub use store::{WalletFile, WalletStore};
pub use wallet::{Wallet, WalletAddress, SEED_LEN};
