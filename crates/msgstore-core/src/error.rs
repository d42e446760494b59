//! Error types for msgstore core.

use thiserror::Error;

/// Errors raised while encoding or decoding keys and records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Validation errors for caller-supplied message input.
///
/// These are raised before any storage access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
