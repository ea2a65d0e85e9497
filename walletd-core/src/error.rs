//! Core error types.

use thiserror::Error;

/// Errors from encoding, address handling and transaction construction.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("chain ID too long: {len} bytes (max {max})")]
    ChainIdTooLong { len: usize, max: usize },

    #[error("too many external IDs: {count} (max {max})")]
    TooManyExtIds { count: usize, max: usize },

    #[error("external ID {index} too long: {len} bytes")]
    ExtIdTooLong { index: usize, len: usize },

    #[error("chain ID mismatch: stored {stored}, derived {derived}")]
    ChainIdMismatch { stored: String, derived: String },

    #[error("first entry points at chain {entry_chain_id}, expected {chain_id}")]
    FirstEntryChainMismatch {
        chain_id: String,
        entry_chain_id: String,
    },

    #[error("truncated input: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid varint at offset {offset}")]
    InvalidVarint { offset: usize },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("expected {expected} address, got {actual}")]
    WrongAddressKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("too many transaction {kind}: max {max}")]
    TooManyTransactionItems { kind: &'static str, max: usize },

    #[error("{0} is not an input of the transaction")]
    NotAnInput(String),

    #[error("{0} is not an output of the transaction")]
    NotAnOutput(String),

    #[error("transaction is not balanced: inputs {inputs}, outputs {outputs}")]
    Unbalanced { inputs: u64, outputs: u64 },

    #[error("output amount {amount} is smaller than the fee {fee}")]
    FeeExceedsOutput { amount: u64, fee: u64 },

    #[error("amount overflow")]
    AmountOverflow,

    #[error("insufficient inputs: inputs {inputs}, outputs {outputs}")]
    InsufficientInputs { inputs: u64, outputs: u64 },

    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction is not signed")]
    NotSigned,

    #[error("signature {index} does not verify")]
    BadSignature { index: usize },

    #[error("signing key does not match input {index}")]
    SignerMismatch { index: usize },
}
