//! Error types for the reconciliation service

use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
#[derive(Error, Debug)]
pub enum Error {
    /// Source fetch failed
    #[error("Source error ({source_name}): {message}")]
    Source {
        /// Source that failed
        source_name: &'static str,
        /// Failure detail
        message: String,
    },

    /// Source fetch exceeded its timeout
    #[error("Source timeout ({source_name}) after {timeout_ms}ms")]
    Timeout {
        /// Source that timed out
        source_name: &'static str,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Source failure
    pub fn source_failure(source_name: &'static str, message: impl Into<String>) -> Self {
        Error::Source {
            source_name,
            message: message.into(),
        }
    }
}
