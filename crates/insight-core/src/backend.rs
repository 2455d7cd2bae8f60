//! Backing store abstraction
//!
//! The log store needs two kinds of values from its store:
//!
//! - **ordered indexes**: members with integer scores, queried by rank in
//!   descending order, counted and trimmed by score range
//! - **records**: small groups of named string fields with an optional
//!   per-key time-to-live
//!
//! Mutations that must land together are collected into a [`WriteBatch`] and
//! handed to [`LogBackend::execute`], which applies all of them or none.

use async_trait::async_trait;

use crate::error::BackendResult;

/// A member of an ordered index together with its score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

impl ScoredMember {
    pub fn new(member: impl Into<String>, score: i64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// The key does not exist (or has already expired)
    Missing,
    /// The key exists and never expires
    Persistent,
    /// The key expires after this many seconds
    Expires(u64),
}

/// A single mutation inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Set fields of a record, creating it if needed
    SetFields {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Expire a key after the given number of seconds
    Expire { key: String, seconds: u64 },
    /// Add a member to an ordered index or overwrite its score
    IndexUpsert {
        key: String,
        member: String,
        score: i64,
    },
}

impl BatchOp {
    /// Key the operation touches
    pub fn key(&self) -> &str {
        match self {
            BatchOp::SetFields { key, .. }
            | BatchOp::Expire { key, .. }
            | BatchOp::IndexUpsert { key, .. } => key,
        }
    }
}

/// Ordered group of mutations applied atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue setting fields of a record
    pub fn set_fields<K, V>(&mut self, key: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.ops.push(BatchOp::SetFields {
            key: key.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        });
        self
    }

    /// Queue an expiry
    pub fn expire(&mut self, key: impl Into<String>, seconds: u64) -> &mut Self {
        self.ops.push(BatchOp::Expire {
            key: key.into(),
            seconds,
        });
        self
    }

    /// Queue an index upsert
    pub fn index_upsert(&mut self, key: impl Into<String>, member: impl Into<String>, score: i64) -> &mut Self {
        self.ops.push(BatchOp::IndexUpsert {
            key: key.into(),
            member: member.into(),
            score,
        });
        self
    }

    /// Queued operations in order
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Key-value store the log store is layered over
///
/// Implementations must make [`execute`](LogBackend::execute) atomic: a
/// concurrent reader observes either none or all of a batch.
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Whether a key holds any value
    async fn exists(&self, key: &str) -> BackendResult<bool>;

    /// Read named fields of a record
    ///
    /// Returns `None` when the record does not exist. Otherwise the vector has
    /// one entry per requested field, `None` for fields that are not set.
    async fn get_fields(&self, key: &str, fields: &[&str]) -> BackendResult<Option<Vec<Option<String>>>>;

    /// Remaining lifetime of a key
    async fn ttl(&self, key: &str) -> BackendResult<TtlStatus>;

    /// Members of an ordered index by rank, highest score first
    ///
    /// Skips `offset` members and returns at most `limit`. Members sharing a
    /// score come out in descending member order.
    async fn index_range_desc(&self, key: &str, offset: usize, limit: usize) -> BackendResult<Vec<ScoredMember>>;

    /// Number of members with `min <= score <= max`
    async fn index_count(&self, key: &str, min: i64, max: i64) -> BackendResult<usize>;

    /// Number of members in an ordered index
    async fn index_len(&self, key: &str) -> BackendResult<usize>;

    /// Remove every member with a score at or below `max`
    ///
    /// The range is open towards negative infinity. Returns how many members
    /// were removed.
    async fn index_remove_up_to(&self, key: &str, max: i64) -> BackendResult<usize>;

    /// Apply a batch of mutations atomically
    async fn execute(&self, batch: WriteBatch) -> BackendResult<()>;

    /// Add a member to an ordered index or overwrite its score
    async fn index_upsert(&self, key: &str, member: &str, score: i64) -> BackendResult<()> {
        let mut batch = WriteBatch::new();
        batch.index_upsert(key, member, score);
        self.execute(batch).await
    }

    /// Expire a key after `seconds`
    async fn expire(&self, key: &str, seconds: u64) -> BackendResult<()> {
        let mut batch = WriteBatch::new();
        batch.expire(key, seconds);
        self.execute(batch).await
    }
}
