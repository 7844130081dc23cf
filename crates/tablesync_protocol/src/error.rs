//! Error types for protocol decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding wire data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame or body was not valid JSON.
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The JSON was valid but did not have the expected shape.
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// A record did not carry its unique key.
    #[error("record {index} has no key at {path}")]
    MissingKey {
        /// Position of the record within its batch.
        index: usize,
        /// JSON pointer that was looked up.
        path: String,
    },
}

impl ProtocolError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure(message.into())
    }
}
