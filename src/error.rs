//! Error types for datatask
//!
//! The library distinguishes between failures that are recovered locally
//! (network errors become "source unavailable", cache errors become misses)
//! and failures that end a job. Everything that crosses a public function
//! boundary is expressed through [`Error`].

use thiserror::Error;

/// Result type alias for datatask operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for datatask
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The environment variable or setting that caused the error (e.g., "MAX_RETRIES")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level HTTP error (connect, timeout, body decode)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wallet address does not look like an EVM address
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A job gave up; the message is recorded in the execution report
    #[error("{0}")]
    Job(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// HTTP status code carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
