//! Server error types.

use thiserror::Error;
use walletd_core::CoreError;
use walletd_protocol::{ErrorCode, ParamsError, ProtocolError};
use walletd_wallet::WalletError;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("{0}")]
    Params(#[from] ParamsError),

    #[error("{0}")]
    Wallet(#[from] WalletError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    UnrecognizedAddress(String),
}

impl ServerError {
    /// Converts to protocol error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::Protocol(_) => ErrorCode::InvalidRequest,
            ServerError::BodyTooLarge { .. } | ServerError::BodyRead(_) => {
                ErrorCode::InvalidRequest
            }
            ServerError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            ServerError::Params(_) => ErrorCode::InvalidParams,
            ServerError::Io(_)
            | ServerError::Wallet(_)
            | ServerError::Core(_)
            | ServerError::Json(_)
            | ServerError::UnrecognizedAddress(_) => ErrorCode::InternalError,
        }
    }
}
