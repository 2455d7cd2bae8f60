//! Log record types

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::level::Level;

/// Short opaque identifier of a log record, unique within a namespace
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an identifier string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id, returning the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Immutable payload stored for every record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    pub level: Level,
    /// Message with placeholders already rendered
    pub message: String,
    /// Context keys that no placeholder consumed
    pub context: Context,
}

/// A log record resolved from the index and the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: RecordId,
    /// Unix timestamp (seconds) the record is ordered by
    pub timestamp: i64,
    pub level: Level,
    pub message: String,
    pub context: Context,
}

impl LogRecord {
    /// Assemble a record from its index entry and stored fields
    pub fn from_parts(id: RecordId, timestamp: i64, fields: RecordFields) -> Self {
        Self {
            id,
            timestamp,
            level: fields.level,
            message: fields.message,
            context: fields.context,
        }
    }
}
