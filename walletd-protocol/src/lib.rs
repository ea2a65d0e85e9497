//! # walletd-protocol
//!
//! JSON-RPC 2.0 protocol implementation for factom-walletd.
//!
//! This crate provides:
//! - Request/Response envelope types with verbatim ID echo
//! - Stable error codes and error objects
//! - The static method table
//! - Per-method parameter and result types
//! - Structural parameter validation with field-level diagnostics

pub mod error;
pub mod message;
pub mod params;

pub use error::{ErrorCode, ProtocolError};
pub use message::{ErrorObject, Method, Request, Response};
pub use params::{bind_params, FieldKind, FieldSpec, Params, ParamsError};

/// JSON-RPC version implemented by this crate.
pub const JSONRPC_VERSION: &str = "2.0";

/// Path the wallet API is served under.
pub const API_PATH: &str = "/v2";

/// Default port for the wallet daemon.
pub const DEFAULT_PORT: u16 = 8089;
