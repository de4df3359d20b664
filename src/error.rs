//! Error types for the session layer.

use crate::transport::TransportError;
use thiserror::Error;

/// Main error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Null, empty or oversized input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not valid in the current lifecycle phase.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Referenced object is not registered.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The transport reported a server-side error.
    #[error("{operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    /// An internal invariant was violated. Indicates a bug, not user error.
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("Value conversion error: expected {expected}, found {found}")]
    Conversion {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Wrap a transport failure with the name of the operation that issued it.
    pub fn transport(operation: &'static str, source: TransportError) -> Self {
        SessionError::Transport { operation, source }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Config(e.to_string())
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
