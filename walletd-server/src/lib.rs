//! # walletd-server
//!
//! HTTP JSON-RPC server for factom-walletd.
//!
//! This crate provides:
//! - The `/v2` JSON-RPC endpoint over HTTP/1.1
//! - Method dispatch onto the wallet
//! - YAML and environment configuration
//! - Optional Prometheus metrics on `/metrics`

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;

pub use config::{Config, ConfigError, MetricsConfig, NetworkConfig, WalletConfig};
pub use error::ServerError;
pub use handler::RequestHandler;
pub use metrics::Metrics;
pub use server::{Server, ServerConfig, ServerStats};
