//! Error types for insight-logs

use insight_core::{BackendError, Level};
use thiserror::Error;

/// Errors returned by the log store
#[derive(Debug, Error)]
pub enum LogStoreError {
    /// Writes at this level are never persisted
    #[error("Unsupported log level: {0}")]
    RejectedLevel(Level),

    /// The backing store failed
    #[error("Backing store error: {0}")]
    Backend(#[from] BackendError),

    /// A `timestamp` context value that is not a whole number of seconds
    #[error("Invalid timestamp in context: {0}")]
    InvalidTimestamp(String),

    /// Pages and page sizes start at 1
    #[error("Invalid pagination: page {page}, per page {per_page}")]
    InvalidPagination { page: usize, per_page: usize },

    /// A stored record could not be decoded
    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LogStoreError {
    /// Create a new CorruptRecord error
    pub fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from the backing store rather than the caller
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Result type for log store operations
pub type LogStoreResult<T> = Result<T, LogStoreError>;
