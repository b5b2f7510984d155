//! Error types for the subwatch system
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for subwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the subwatch system
#[derive(Error, Debug)]
pub enum Error {
    /// Discovery source errors
    #[error("Discovery source error: {0}")]
    Source(String),

    /// DNS validation errors
    #[error("Validator error: {0}")]
    Validator(String),

    /// Port observer errors
    #[error("Port observer error: {0}")]
    Observer(String),

    /// World-state store errors
    #[error("State store error: {0}")]
    Store(String),

    /// Notification errors
    #[error("Notifier error: {0}")]
    Notifier(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// I/O errors (process spawning, filesystem)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a discovery source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a validator error
    pub fn validator(msg: impl Into<String>) -> Self {
        Self::Validator(msg.into())
    }

    /// Create a port observer error
    pub fn observer(msg: impl Into<String>) -> Self {
        Self::Observer(msg.into())
    }

    /// Create a state store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a notifier error
    pub fn notifier(msg: impl Into<String>) -> Self {
        Self::Notifier(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
