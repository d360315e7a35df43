//! Error types for the datasync core
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for datasync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the datasync system
///
/// Errors are `Clone` because a single fetch failure is delivered to every
/// caller sharing the in-flight fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration errors (fatal at construction)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The injected fetch function failed
    #[error("Fetch error ({name}): {message}")]
    Fetch {
        /// Source name
        name: String,
        /// Error message
        message: String,
    },

    /// HTTP transport errors (from fetch function implementations)
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a fetch error for a named source
    pub fn fetch(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
