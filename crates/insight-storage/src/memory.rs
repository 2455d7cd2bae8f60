//! In-memory backend
//!
//! This module provides an in-memory implementation of [`LogBackend`],
//! suitable for testing and for embedding the log store without an external
//! database. All keys live behind one lock so a [`WriteBatch`] is applied
//! atomically.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use insight_core::{
    BackendError, BackendResult, BatchOp, Clock, LogBackend, ScoredMember, SystemClock, TtlStatus,
    WriteBatch,
};
use parking_lot::RwLock;
use tracing::{debug, trace};

/// Members of one ordered index
#[derive(Debug, Default)]
struct SortedSet {
    /// Member to score
    scores: HashMap<String, i64>,
    /// (score, member), ascending
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn upsert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn range_desc(&self, offset: usize, limit: usize) -> Vec<ScoredMember> {
        self.ordered
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .map(|(score, member)| ScoredMember::new(member.clone(), *score))
            .collect()
    }

    fn count(&self, min: i64, max: i64) -> usize {
        if min > max {
            return 0;
        }
        self.ordered
            .range((min, String::new())..)
            .take_while(|(score, _)| *score <= max)
            .count()
    }

    fn remove_up_to(&mut self, max: i64) -> usize {
        let doomed: Vec<(i64, String)> = self
            .ordered
            .iter()
            .take_while(|(score, _)| *score <= max)
            .cloned()
            .collect();

        for entry in &doomed {
            self.ordered.remove(entry);
            self.scores.remove(&entry.1);
        }
        doomed.len()
    }

    fn len(&self) -> usize {
        self.ordered.len()
    }

    fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[derive(Debug)]
enum Value {
    Index(SortedSet),
    Fields(HashMap<String, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Index,
    Fields,
}

#[derive(Debug)]
struct Slot {
    value: Value,
    /// Unix timestamp at which the key disappears
    expires_at: Option<i64>,
}

impl Slot {
    fn kind(&self) -> Kind {
        match self.value {
            Value::Index(_) => Kind::Index,
            Value::Fields(_) => Kind::Fields,
        }
    }

    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory implementation of [`LogBackend`]
///
/// Keys expire lazily: an expired key is invisible to reads and is dropped
/// the next time a write touches it or [`purge_expired`](Self::purge_expired)
/// runs.
#[derive(Debug)]
pub struct MemoryBackend {
    slots: RwLock<HashMap<String, Slot>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new in-memory backend on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a backend that expires keys against the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of keys currently held, including expired ones not yet purged
    pub fn key_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Drop every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        let purged = before - slots.len();
        if purged > 0 {
            debug!(purged, "Purged expired keys");
        }
        purged
    }

    /// Remove every key
    pub fn clear(&self) {
        self.slots.write().clear();
    }

    fn with_index<T>(&self, key: &str, read: impl FnOnce(Option<&SortedSet>) -> T) -> BackendResult<T> {
        let now = self.clock.now();
        let slots = self.slots.read();
        match slots.get(key).filter(|slot| slot.is_live(now)) {
            None => Ok(read(None)),
            Some(Slot {
                value: Value::Index(set),
                ..
            }) => Ok(read(Some(set))),
            Some(_) => Err(BackendError::wrong_type(key)),
        }
    }
}

/// Check that every op in the batch fits the kind of value at its key,
/// taking earlier ops in the same batch into account.
fn validate(slots: &HashMap<String, Slot>, ops: &[BatchOp], now: i64) -> BackendResult<()> {
    let mut pending: HashMap<&str, Kind> = HashMap::new();

    for op in ops {
        let key = op.key();
        let current = pending.get(key).copied().or_else(|| {
            slots
                .get(key)
                .filter(|slot| slot.is_live(now))
                .map(Slot::kind)
        });

        let wanted = match op {
            BatchOp::SetFields { .. } | BatchOp::Expire { .. } => Kind::Fields,
            BatchOp::IndexUpsert { .. } => Kind::Index,
        };

        match (op, current) {
            (BatchOp::Expire { .. }, None) => {}
            (_, Some(kind)) if kind != wanted => return Err(BackendError::wrong_type(key)),
            _ => {
                pending.insert(key, wanted);
            }
        }
    }

    Ok(())
}

fn apply(slots: &mut HashMap<String, Slot>, op: BatchOp, now: i64) {
    match op {
        BatchOp::SetFields { key, fields } => {
            let slot = slots.entry(key).or_insert_with(|| Slot {
                value: Value::Fields(HashMap::new()),
                expires_at: None,
            });
            if let Value::Fields(stored) = &mut slot.value {
                stored.extend(fields);
            }
        }
        BatchOp::Expire { key, seconds } => {
            if seconds == 0 {
                slots.remove(&key);
            } else if let Some(slot) = slots.get_mut(&key) {
                slot.expires_at = Some(now.saturating_add_unsigned(seconds));
            }
        }
        BatchOp::IndexUpsert { key, member, score } => {
            let slot = slots.entry(key).or_insert_with(|| Slot {
                value: Value::Index(SortedSet::default()),
                expires_at: None,
            });
            if let Value::Index(set) = &mut slot.value {
                set.upsert(&member, score);
            }
        }
    }
}

#[async_trait]
impl LogBackend for MemoryBackend {
    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let now = self.clock.now();
        Ok(self
            .slots
            .read()
            .get(key)
            .is_some_and(|slot| slot.is_live(now)))
    }

    async fn get_fields(&self, key: &str, fields: &[&str]) -> BackendResult<Option<Vec<Option<String>>>> {
        let now = self.clock.now();
        let slots = self.slots.read();
        match slots.get(key).filter(|slot| slot.is_live(now)) {
            None => Ok(None),
            Some(Slot {
                value: Value::Fields(stored),
                ..
            }) => Ok(Some(
                fields.iter().map(|field| stored.get(*field).cloned()).collect(),
            )),
            Some(_) => Err(BackendError::wrong_type(key)),
        }
    }

    async fn ttl(&self, key: &str) -> BackendResult<TtlStatus> {
        let now = self.clock.now();
        let slots = self.slots.read();
        Ok(match slots.get(key).filter(|slot| slot.is_live(now)) {
            None => TtlStatus::Missing,
            Some(Slot {
                expires_at: None, ..
            }) => TtlStatus::Persistent,
            Some(Slot {
                expires_at: Some(at),
                ..
            }) => TtlStatus::Expires((at - now) as u64),
        })
    }

    async fn index_range_desc(&self, key: &str, offset: usize, limit: usize) -> BackendResult<Vec<ScoredMember>> {
        trace!(key, offset, limit, "Index range (descending)");
        self.with_index(key, |set| {
            set.map(|s| s.range_desc(offset, limit)).unwrap_or_default()
        })
    }

    async fn index_count(&self, key: &str, min: i64, max: i64) -> BackendResult<usize> {
        self.with_index(key, |set| set.map(|s| s.count(min, max)).unwrap_or(0))
    }

    async fn index_len(&self, key: &str) -> BackendResult<usize> {
        self.with_index(key, |set| set.map(SortedSet::len).unwrap_or(0))
    }

    async fn index_remove_up_to(&self, key: &str, max: i64) -> BackendResult<usize> {
        let now = self.clock.now();
        let mut slots = self.slots.write();

        let Some(slot) = slots.get_mut(key).filter(|slot| slot.is_live(now)) else {
            return Ok(0);
        };
        let Value::Index(set) = &mut slot.value else {
            return Err(BackendError::wrong_type(key));
        };

        let removed = set.remove_up_to(max);
        if set.is_empty() {
            slots.remove(key);
        }

        trace!(key, max, removed, "Removed index members by score");
        Ok(removed)
    }

    async fn execute(&self, batch: WriteBatch) -> BackendResult<()> {
        let now = self.clock.now();
        let mut slots = self.slots.write();

        for op in batch.ops() {
            if slots.get(op.key()).is_some_and(|slot| !slot.is_live(now)) {
                slots.remove(op.key());
            }
        }

        validate(&slots, batch.ops(), now)?;

        let op_count = batch.len();
        for op in batch.into_ops() {
            apply(&mut slots, op, now);
        }

        trace!(ops = op_count, "Applied write batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::ManualClock;

    fn backend_at(now: i64) -> (MemoryBackend, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(now));
        (MemoryBackend::with_clock(clock.clone()), clock)
    }

    async fn upsert(backend: &MemoryBackend, key: &str, member: &str, score: i64) {
        backend.index_upsert(key, member, score).await.unwrap();
    }

    #[tokio::test]
    async fn test_range_desc_orders_by_score() {
        let (backend, _clock) = backend_at(1_000);
        upsert(&backend, "idx", "a", 10).await;
        upsert(&backend, "idx", "b", 30).await;
        upsert(&backend, "idx", "c", 20).await;

        let members: Vec<_> = backend
            .index_range_desc("idx", 0, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.member)
            .collect();
        assert_eq!(members, vec!["b", "c", "a"]);

        let page = backend.index_range_desc("idx", 1, 1).await.unwrap();
        assert_eq!(page, vec![ScoredMember::new("c", 20)]);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_score() {
        let (backend, _clock) = backend_at(1_000);
        upsert(&backend, "idx", "a", 10).await;
        upsert(&backend, "idx", "a", 50).await;

        assert_eq!(backend.index_len("idx").await.unwrap(), 1);
        assert_eq!(backend.index_count("idx", 10, 10).await.unwrap(), 0);
        assert_eq!(backend.index_count("idx", 50, 50).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_up_to_is_inclusive_and_idempotent() {
        let (backend, _clock) = backend_at(1_000);
        for (member, score) in [("a", 1), ("b", 2), ("c", 3)] {
            upsert(&backend, "idx", member, score).await;
        }

        assert_eq!(backend.index_remove_up_to("idx", 2).await.unwrap(), 2);
        assert_eq!(backend.index_remove_up_to("idx", 2).await.unwrap(), 0);
        assert_eq!(backend.index_len("idx").await.unwrap(), 1);

        assert_eq!(backend.index_remove_up_to("idx", i64::MAX).await.unwrap(), 1);
        assert!(!backend.exists("idx").await.unwrap());
    }

    #[tokio::test]
    async fn test_fields_expire_with_clock() {
        let (backend, clock) = backend_at(1_000);
        let mut batch = WriteBatch::new();
        batch
            .set_fields("rec", [("level", "info"), ("message", "hello")])
            .expire("rec", 60);
        backend.execute(batch).await.unwrap();

        assert_eq!(backend.ttl("rec").await.unwrap(), TtlStatus::Expires(60));
        let fields = backend
            .get_fields("rec", &["message", "missing"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fields, vec![Some("hello".to_string()), None]);

        clock.advance(59);
        assert_eq!(backend.ttl("rec").await.unwrap(), TtlStatus::Expires(1));

        clock.advance(1);
        assert!(!backend.exists("rec").await.unwrap());
        assert!(backend.get_fields("rec", &["message"]).await.unwrap().is_none());
        assert_eq!(backend.ttl("rec").await.unwrap(), TtlStatus::Missing);

        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.key_count(), 0);
    }

    #[tokio::test]
    async fn test_persistent_record() {
        let (backend, _clock) = backend_at(1_000);
        let mut batch = WriteBatch::new();
        batch.set_fields("rec", [("level", "info")]);
        backend.execute(batch).await.unwrap();

        assert_eq!(backend.ttl("rec").await.unwrap(), TtlStatus::Persistent);
    }

    #[tokio::test]
    async fn test_wrong_type_rejects_whole_batch() {
        let (backend, _clock) = backend_at(1_000);
        upsert(&backend, "idx", "a", 1).await;

        let mut batch = WriteBatch::new();
        batch
            .set_fields("rec", [("level", "info")])
            .set_fields("idx", [("level", "info")]);

        let err = backend.execute(batch).await.unwrap_err();
        assert!(matches!(err, BackendError::WrongType(_)));
        assert!(!backend.exists("rec").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_on_missing_key_is_noop() {
        let (backend, _clock) = backend_at(1_000);
        backend.expire("nothing", 10).await.unwrap();
        assert_eq!(backend.key_count(), 0);
    }

    #[tokio::test]
    async fn test_count_between() {
        let (backend, _clock) = backend_at(1_000);
        for i in 0..10 {
            upsert(&backend, "idx", &format!("m{i}"), i).await;
        }
        assert_eq!(backend.index_count("idx", 3, 6).await.unwrap(), 4);
        assert_eq!(backend.index_count("idx", i64::MIN, i64::MAX).await.unwrap(), 10);
        assert_eq!(backend.index_count("idx", 6, 3).await.unwrap(), 0);
    }
}
