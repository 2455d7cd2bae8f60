//! Error types for the backing store layer
//!
//! Every failure to talk to the backing store surfaces as a [`BackendError`].
//! Higher layers wrap it without translation.

use thiserror::Error;

/// Errors raised by a [`LogBackend`](crate::LogBackend) implementation
#[derive(Debug, Error)]
pub enum BackendError {
    /// The store could not be reached or an I/O operation failed
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    /// A transaction could not be committed
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// The key holds a value of a different kind than the operation expects
    #[error("wrong kind of value stored at key {0}")]
    WrongType(String),

    /// Error while encoding a value for storage
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Error while decoding a stored value
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl BackendError {
    /// Create a new Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create a new Transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Create a new WrongType error for a key
    pub fn wrong_type(key: impl Into<String>) -> Self {
        Self::WrongType(key.into())
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Unavailable(err.to_string())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
