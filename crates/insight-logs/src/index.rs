//! Per-account ordered log index
//!
//! Maps record ids to the timestamp they were written at, kept in one
//! ordered index at `<namespace>:log:records`.

use std::sync::Arc;

use insight_core::{LogBackend, Namespace, RecordId, WriteBatch};
use tracing::{debug, instrument};

use crate::error::LogStoreResult;

/// Ordered `id -> timestamp` mapping for one account
#[derive(Clone)]
pub struct LogIndex {
    backend: Arc<dyn LogBackend>,
    key: String,
}

impl std::fmt::Debug for LogIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogIndex").field("key", &self.key).finish()
    }
}

impl LogIndex {
    pub fn new(backend: Arc<dyn LogBackend>, namespace: &Namespace) -> Self {
        Self {
            backend,
            key: namespace.log_records_key(),
        }
    }

    /// Backing store key of the index
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Add `id` at `timestamp`, or move it there if already present
    pub async fn insert(&self, id: &RecordId, timestamp: i64) -> LogStoreResult<()> {
        self.backend
            .index_upsert(&self.key, id.as_str(), timestamp)
            .await?;
        Ok(())
    }

    /// Queue an insert into a batch instead of applying it
    pub fn stage_insert(&self, batch: &mut WriteBatch, id: &RecordId, timestamp: i64) {
        batch.index_upsert(self.key.as_str(), id.as_str(), timestamp);
    }

    /// Up to `limit` entries from rank `offset`, newest first
    pub async fn range_descending(&self, offset: usize, limit: usize) -> LogStoreResult<Vec<(RecordId, i64)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let members = self
            .backend
            .index_range_desc(&self.key, offset, limit)
            .await?;
        Ok(members
            .into_iter()
            .map(|m| (RecordId::from(m.member), m.score))
            .collect())
    }

    /// Entries with `low <= timestamp <= high`
    pub async fn count_between(&self, low: i64, high: i64) -> LogStoreResult<usize> {
        Ok(self.backend.index_count(&self.key, low, high).await?)
    }

    /// Remove every entry at or before `cutoff`
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn prune_older_than(&self, cutoff: i64) -> LogStoreResult<usize> {
        let removed = self.backend.index_remove_up_to(&self.key, cutoff).await?;
        if removed > 0 {
            debug!(removed, "Pruned expired log index entries");
        }
        Ok(removed)
    }

    /// Total number of entries
    pub async fn size(&self) -> LogStoreResult<usize> {
        Ok(self.backend.index_len(&self.key).await?)
    }
}
