//! Error types for the sync engine.

use tablesync_protocol::{ProtocolError, ValidationError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a non-success status.
    #[error("http status {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Canonical status text.
        message: String,
    },

    /// Wire data could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A record was rejected before submission.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A configured URL is invalid.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if let Some(status) = err.status() {
            SyncError::http(
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status"),
            )
        } else if err.is_decode() {
            SyncError::transport_fatal(err.to_string())
        } else {
            SyncError::transport_retryable(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::transport_retryable(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::http(503, "Service Unavailable").is_retryable());
        assert!(!SyncError::http(404, "Not Found").is_retryable());
        assert!(!SyncError::InvalidUrl("relative URL without a base".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::http(500, "Internal Server Error");
        assert_eq!(err.to_string(), "http status 500: Internal Server Error");

        let err = SyncError::from(ValidationError {
            errors: vec!["/id is missing".into(), "/customer is missing".into()],
        });
        assert_eq!(
            err.to_string(),
            "record validation failed: /id is missing; /customer is missing"
        );
    }

    #[test]
    fn url_errors_convert() {
        let err: SyncError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, SyncError::InvalidUrl(_)));
    }
}
