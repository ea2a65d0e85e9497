//! # walletd-core
//!
//! Factom primitives for factom-walletd.
//!
//! This crate provides:
//! - Canonical binary encoding and hashing of entries and chains
//! - Content-derived chain IDs and commit hashes
//! - Address classification and Ed25519-backed Factoid/EC addresses
//! - The Factoid transaction model and its wire encoding

pub mod address;
pub mod chain;
pub mod entry;
pub mod error;
pub mod hash;
pub mod transaction;
pub mod varint;

pub use address::{classify, AddressKind, EcAddress, FactoidAddress, KeyedAddress};
pub use chain::{derive_chain_id, Chain, ChainSource, CommitHashes};
pub use entry::{Entry, EntrySource};
pub use error::CoreError;
pub use transaction::{Transaction, TransactionInput, TransactionOutput};
