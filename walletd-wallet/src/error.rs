//! Wallet error types.

use thiserror::Error;
use walletd_core::CoreError;

/// Errors from the wallet layer.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("address not found in wallet: {0}")]
    AddressNotFound(String),

    #[error("transaction already exists: {0}")]
    TransactionExists(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("wallet file is corrupt: {0}")]
    Corruption(String),

    #[error("fee rate unavailable: {0}")]
    RateUnavailable(String),
}
