// =============================================================================
// Typed failure taxonomy for the feed subsystem
// =============================================================================
//
// Nothing here is fatal to the host process.  Transient connection failures
// and reference-fetch failures stay internal (logged and retried); the two
// categories below are the ones callers and tests need to match on.

use thiserror::Error;

/// Why a raw stream message could not be decoded.  The message is dropped and
/// the connection keeps running.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message has no stream tag")]
    MissingStreamTag,

    #[error("unrecognized stream tag: {0}")]
    UnknownStream(String),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {field} is not a valid number: {value}")]
    BadNumber { field: &'static str, value: String },
}

/// Why a start request was rejected synchronously.  No session is created.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid symbol {0:?}: expected an uppercase alphanumeric pair like BTCUSDT")]
    InvalidSymbol(String),
}
