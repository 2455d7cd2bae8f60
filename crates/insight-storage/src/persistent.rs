//! Persistent backend on redb
//!
//! Ordered indexes and records live in four redb tables. Every
//! [`WriteBatch`] runs inside a single redb write transaction, so a batch is
//! committed completely or not at all.
//!
//! ## Key layout
//!
//! ```text
//! index_entries  <index key> 0x00 <score: 8 bytes, order-preserving> <member>  -> ()
//! index_scores   <index key> 0x00 <member>                                     -> score
//! records        <record key>                                                  -> postcard(fields)
//! expiries       <record key>                                                  -> unix seconds
//! ```
//!
//! Keys never contain a NUL byte, so `<index key> 0x00` is a prefix that no
//! other index can share.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use insight_core::{
    BackendError, BackendResult, BatchOp, Clock, LogBackend, ScoredMember, SystemClock, TtlStatus,
    WriteBatch,
};
use redb::{Builder, Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};

const INDEX_ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("index_entries");
const INDEX_SCORES: TableDefinition<&[u8], i64> = TableDefinition::new("index_scores");
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
const EXPIRIES: TableDefinition<&str, i64> = TableDefinition::new("expiries");

/// Configuration for the redb backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedbBackendConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Cache size in bytes
    pub cache_size: usize,
}

impl Default for RedbBackendConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/insight.redb"),
            cache_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl RedbBackendConfig {
    /// Configuration for a database file at the given path
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }
}

/// Stored form of a record's fields
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredFields {
    fields: Vec<(String, String)>,
}

impl StoredFields {
    fn get(&self, name: &str) -> Option<&String> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    fn merge(&mut self, updates: Vec<(String, String)>) {
        for (name, value) in updates {
            match self.fields.iter_mut().find(|(k, _)| *k == name) {
                Some(slot) => slot.1 = value,
                None => self.fields.push((name, value)),
            }
        }
    }
}

fn db_err(err: impl std::fmt::Display) -> BackendError {
    BackendError::Unavailable(err.to_string())
}

fn index_prefix(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key.as_bytes());
    prefix.push(0);
    prefix
}

/// First key past every entry of an index
fn index_end(key: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(key.len() + 1);
    end.extend_from_slice(key.as_bytes());
    end.push(1);
    end
}

/// Big-endian with the sign bit flipped, so byte order matches numeric order
fn encode_score(score: i64) -> [u8; 8] {
    ((score as u64) ^ (1 << 63)).to_be_bytes()
}

fn decode_score(bytes: &[u8]) -> BackendResult<i64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| BackendError::Deserialization("truncated index score".to_string()))?;
    Ok((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
}

fn score_bound(key: &str, score: i64) -> Vec<u8> {
    let mut bound = index_prefix(key);
    bound.extend_from_slice(&encode_score(score));
    bound
}

/// Exclusive upper bound covering every score up to and including `max`
fn score_upper(key: &str, max: i64) -> Vec<u8> {
    match max.checked_add(1) {
        Some(next) => score_bound(key, next),
        None => index_end(key),
    }
}

fn entry_key(key: &str, score: i64, member: &str) -> Vec<u8> {
    let mut entry = score_bound(key, score);
    entry.extend_from_slice(member.as_bytes());
    entry
}

fn member_key(key: &str, member: &str) -> Vec<u8> {
    let mut entry = index_prefix(key);
    entry.extend_from_slice(member.as_bytes());
    entry
}

fn split_entry(prefix_len: usize, entry: &[u8]) -> BackendResult<ScoredMember> {
    let score = decode_score(&entry[prefix_len..prefix_len + 8])?;
    let member = std::str::from_utf8(&entry[prefix_len + 8..])
        .map_err(|e| BackendError::Deserialization(e.to_string()))?;
    Ok(ScoredMember::new(member, score))
}

/// Persistent implementation of [`LogBackend`] backed by redb
///
/// Expiry is lazy: an expired record is invisible to reads and its rows are
/// deleted the next time a batch touches the key or
/// [`purge_expired`](Self::purge_expired) runs.
pub struct RedbBackend {
    db: Arc<Database>,
    config: RedbBackendConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}

impl RedbBackend {
    /// Open or create the database on the system clock
    pub fn open(config: RedbBackendConfig) -> BackendResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open or create the database, expiring records against `clock`
    #[instrument(skip(config, clock), fields(path = %config.db_path.display()))]
    pub fn open_with_clock(config: RedbBackendConfig, clock: Arc<dyn Clock>) -> BackendResult<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Builder::new()
            .set_cache_size(config.cache_size)
            .create(&config.db_path)
            .map_err(db_err)?;

        info!("Opened redb database");

        let backend = Self {
            db: Arc::new(db),
            config,
            clock,
        };
        backend.init_tables()?;

        Ok(backend)
    }

    /// Get the configuration
    pub fn config(&self) -> &RedbBackendConfig {
        &self.config
    }

    fn init_tables(&self) -> BackendResult<()> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        write_txn.open_table(INDEX_ENTRIES).map_err(db_err)?;
        write_txn.open_table(INDEX_SCORES).map_err(db_err)?;
        write_txn.open_table(RECORDS).map_err(db_err)?;
        write_txn.open_table(EXPIRIES).map_err(db_err)?;
        write_txn
            .commit()
            .map_err(|e| BackendError::transaction(e.to_string()))?;

        debug!("Initialized redb tables");
        Ok(())
    }

    /// Delete every expired record, returning how many were removed
    pub fn purge_expired(&self) -> BackendResult<usize> {
        let now = self.clock.now();
        let write_txn = self.db.begin_write().map_err(db_err)?;

        let expired: Vec<String> = {
            let expiries = write_txn.open_table(EXPIRIES).map_err(db_err)?;
            let mut expired = Vec::new();
            for entry in expiries.iter().map_err(db_err)? {
                let (key, at) = entry.map_err(db_err)?;
                if at.value() <= now {
                    expired.push(key.value().to_string());
                }
            }
            expired
        };

        for key in &expired {
            drop_record(&write_txn, key)?;
        }

        write_txn
            .commit()
            .map_err(|e| BackendError::transaction(e.to_string()))?;

        if !expired.is_empty() {
            debug!(purged = expired.len(), "Purged expired records");
        }
        Ok(expired.len())
    }

    /// Expiry deadline of a record, if any, as seen in a read transaction
    fn record_state(&self, key: &str) -> BackendResult<RecordState> {
        let now = self.clock.now();
        let read_txn = self.db.begin_read().map_err(db_err)?;

        let records = read_txn.open_table(RECORDS).map_err(db_err)?;
        if records.get(key).map_err(db_err)?.is_none() {
            return Ok(RecordState::Missing);
        }

        let expiries = read_txn.open_table(EXPIRIES).map_err(db_err)?;
        match expiries.get(key).map_err(db_err)?.map(|at| at.value()) {
            None => Ok(RecordState::Live(None)),
            Some(at) if at > now => Ok(RecordState::Live(Some(at - now))),
            Some(_) => Ok(RecordState::Missing),
        }
    }

    fn index_exists(&self, key: &str) -> BackendResult<bool> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let entries = read_txn.open_table(INDEX_ENTRIES).map_err(db_err)?;
        let start = index_prefix(key);
        let end = index_end(key);
        let mut range = entries
            .range(start.as_slice()..end.as_slice())
            .map_err(db_err)?;
        Ok(range.next().is_some())
    }
}

enum RecordState {
    Missing,
    /// Live record with its remaining lifetime, if it expires
    Live(Option<i64>),
}

fn drop_record(txn: &WriteTransaction, key: &str) -> BackendResult<()> {
    let mut records = txn.open_table(RECORDS).map_err(db_err)?;
    records.remove(key).map_err(db_err)?;
    let mut expiries = txn.open_table(EXPIRIES).map_err(db_err)?;
    expiries.remove(key).map_err(db_err)?;
    Ok(())
}

fn record_expired(txn: &WriteTransaction, key: &str, now: i64) -> BackendResult<bool> {
    let expiries = txn.open_table(EXPIRIES).map_err(db_err)?;
    let expired = expiries
        .get(key)
        .map_err(db_err)?
        .is_some_and(|at| at.value() <= now);
    Ok(expired)
}

fn record_present(txn: &WriteTransaction, key: &str) -> BackendResult<bool> {
    let records = txn.open_table(RECORDS).map_err(db_err)?;
    let present = records.get(key).map_err(db_err)?.is_some();
    Ok(present)
}

fn index_present(txn: &WriteTransaction, key: &str) -> BackendResult<bool> {
    let entries = txn.open_table(INDEX_ENTRIES).map_err(db_err)?;
    let start = index_prefix(key);
    let end = index_end(key);
    let present = entries
        .range(start.as_slice()..end.as_slice())
        .map_err(db_err)?
        .next()
        .is_some();
    Ok(present)
}

fn apply_op(txn: &WriteTransaction, op: BatchOp, now: i64) -> BackendResult<()> {
    match op {
        BatchOp::SetFields { key, fields } => {
            if index_present(txn, &key)? {
                return Err(BackendError::wrong_type(key));
            }
            let mut records = txn.open_table(RECORDS).map_err(db_err)?;
            let mut stored = match records.get(key.as_str()).map_err(db_err)? {
                Some(raw) => postcard::from_bytes::<StoredFields>(raw.value())
                    .map_err(|e| BackendError::Deserialization(e.to_string()))?,
                None => StoredFields::default(),
            };
            stored.merge(fields);
            let encoded = postcard::to_allocvec(&stored)
                .map_err(|e| BackendError::Serialization(e.to_string()))?;
            records
                .insert(key.as_str(), encoded.as_slice())
                .map_err(db_err)?;
        }
        BatchOp::Expire { key, seconds } => {
            if index_present(txn, &key)? {
                return Err(BackendError::wrong_type(key));
            }
            if !record_present(txn, &key)? {
                return Ok(());
            }
            if seconds == 0 {
                drop_record(txn, &key)?;
            } else {
                let mut expiries = txn.open_table(EXPIRIES).map_err(db_err)?;
                expiries
                    .insert(key.as_str(), now.saturating_add_unsigned(seconds))
                    .map_err(db_err)?;
            }
        }
        BatchOp::IndexUpsert { key, member, score } => {
            if record_present(txn, &key)? {
                return Err(BackendError::wrong_type(key));
            }
            let mut scores = txn.open_table(INDEX_SCORES).map_err(db_err)?;
            let mut entries = txn.open_table(INDEX_ENTRIES).map_err(db_err)?;

            let by_member = member_key(&key, &member);
            let previous = scores
                .get(by_member.as_slice())
                .map_err(db_err)?
                .map(|s| s.value());
            if let Some(old) = previous {
                entries
                    .remove(entry_key(&key, old, &member).as_slice())
                    .map_err(db_err)?;
            }

            scores
                .insert(by_member.as_slice(), score)
                .map_err(db_err)?;
            let empty: &[u8] = &[];
            entries
                .insert(entry_key(&key, score, &member).as_slice(), empty)
                .map_err(db_err)?;
        }
    }
    Ok(())
}

#[async_trait]
impl LogBackend for RedbBackend {
    async fn exists(&self, key: &str) -> BackendResult<bool> {
        match self.record_state(key)? {
            RecordState::Live(_) => Ok(true),
            RecordState::Missing => self.index_exists(key),
        }
    }

    async fn get_fields(&self, key: &str, fields: &[&str]) -> BackendResult<Option<Vec<Option<String>>>> {
        let now = self.clock.now();
        let read_txn = self.db.begin_read().map_err(db_err)?;

        let expiries = read_txn.open_table(EXPIRIES).map_err(db_err)?;
        if expiries
            .get(key)
            .map_err(db_err)?
            .is_some_and(|at| at.value() <= now)
        {
            return Ok(None);
        }

        let records = read_txn.open_table(RECORDS).map_err(db_err)?;
        let Some(raw) = records.get(key).map_err(db_err)? else {
            return Ok(None);
        };
        let stored: StoredFields = postcard::from_bytes(raw.value())
            .map_err(|e| BackendError::Deserialization(e.to_string()))?;

        Ok(Some(
            fields.iter().map(|name| stored.get(name).cloned()).collect(),
        ))
    }

    async fn ttl(&self, key: &str) -> BackendResult<TtlStatus> {
        match self.record_state(key)? {
            RecordState::Live(Some(remaining)) => Ok(TtlStatus::Expires(remaining as u64)),
            RecordState::Live(None) => Ok(TtlStatus::Persistent),
            RecordState::Missing if self.index_exists(key)? => Ok(TtlStatus::Persistent),
            RecordState::Missing => Ok(TtlStatus::Missing),
        }
    }

    async fn index_range_desc(&self, key: &str, offset: usize, limit: usize) -> BackendResult<Vec<ScoredMember>> {
        trace!(key, offset, limit, "Index range (descending)");
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let entries = read_txn.open_table(INDEX_ENTRIES).map_err(db_err)?;

        let start = index_prefix(key);
        let end = index_end(key);
        let range = entries
            .range(start.as_slice()..end.as_slice())
            .map_err(db_err)?;

        let mut members = Vec::new();
        for entry in range.rev().skip(offset).take(limit) {
            let (entry_key, _) = entry.map_err(db_err)?;
            members.push(split_entry(start.len(), entry_key.value())?);
        }
        Ok(members)
    }

    async fn index_count(&self, key: &str, min: i64, max: i64) -> BackendResult<usize> {
        if min > max {
            return Ok(0);
        }
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let entries = read_txn.open_table(INDEX_ENTRIES).map_err(db_err)?;

        let start = score_bound(key, min);
        let end = score_upper(key, max);
        let mut count = 0;
        for entry in entries
            .range(start.as_slice()..end.as_slice())
            .map_err(db_err)?
        {
            entry.map_err(db_err)?;
            count += 1;
        }
        Ok(count)
    }

    async fn index_len(&self, key: &str) -> BackendResult<usize> {
        self.index_count(key, i64::MIN, i64::MAX).await
    }

    async fn index_remove_up_to(&self, key: &str, max: i64) -> BackendResult<usize> {
        let write_txn = self.db.begin_write().map_err(db_err)?;

        let doomed: Vec<Vec<u8>> = {
            let entries = write_txn.open_table(INDEX_ENTRIES).map_err(db_err)?;
            let start = index_prefix(key);
            let end = score_upper(key, max);
            let mut doomed = Vec::new();
            for entry in entries
                .range(start.as_slice()..end.as_slice())
                .map_err(db_err)?
            {
                let (entry_key, _) = entry.map_err(db_err)?;
                doomed.push(entry_key.value().to_vec());
            }
            doomed
        };

        {
            let prefix_len = index_prefix(key).len();
            let mut entries = write_txn.open_table(INDEX_ENTRIES).map_err(db_err)?;
            let mut scores = write_txn.open_table(INDEX_SCORES).map_err(db_err)?;
            for entry in &doomed {
                let scored = split_entry(prefix_len, entry)?;
                entries.remove(entry.as_slice()).map_err(db_err)?;
                scores
                    .remove(member_key(key, &scored.member).as_slice())
                    .map_err(db_err)?;
            }
        }

        write_txn
            .commit()
            .map_err(|e| BackendError::transaction(e.to_string()))?;

        trace!(key, max, removed = doomed.len(), "Removed index members by score");
        Ok(doomed.len())
    }

    async fn execute(&self, batch: WriteBatch) -> BackendResult<()> {
        let now = self.clock.now();
        let write_txn = self.db.begin_write().map_err(db_err)?;

        for op in batch.ops() {
            if record_expired(&write_txn, op.key(), now)? {
                drop_record(&write_txn, op.key())?;
            }
        }

        let op_count = batch.len();
        for op in batch.into_ops() {
            if let Err(err) = apply_op(&write_txn, op, now) {
                write_txn.abort().map_err(db_err)?;
                return Err(err);
            }
        }

        write_txn
            .commit()
            .map_err(|e| BackendError::transaction(e.to_string()))?;

        trace!(ops = op_count, "Committed write batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::ManualClock;
    use tempfile::TempDir;

    fn create_test_backend(now: i64) -> (RedbBackend, Arc<ManualClock>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at(now));
        let config = RedbBackendConfig::at(temp_dir.path().join("test.redb"));
        let backend = RedbBackend::open_with_clock(config, clock.clone()).unwrap();
        (backend, clock, temp_dir)
    }

    #[test]
    fn test_score_encoding_preserves_order() {
        let scores = [i64::MIN, -1_000, -1, 0, 1, 1_000, i64::MAX];
        for pair in scores.windows(2) {
            assert!(encode_score(pair[0]) < encode_score(pair[1]));
        }
        for score in scores {
            assert_eq!(decode_score(&encode_score(score)).unwrap(), score);
        }
    }

    #[tokio::test]
    async fn test_range_desc_and_negative_scores() {
        let (backend, _clock, _temp) = create_test_backend(1_000);
        for (member, score) in [("a", -5), ("b", 7), ("c", 0)] {
            backend.index_upsert("idx", member, score).await.unwrap();
        }

        let all = backend.index_range_desc("idx", 0, 10).await.unwrap();
        assert_eq!(
            all,
            vec![
                ScoredMember::new("b", 7),
                ScoredMember::new("c", 0),
                ScoredMember::new("a", -5),
            ]
        );
        assert_eq!(backend.index_range_desc("idx", 2, 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_indexes_do_not_leak_into_each_other() {
        let (backend, _clock, _temp) = create_test_backend(1_000);
        backend.index_upsert("ns:1:log:records", "a", 1).await.unwrap();
        backend.index_upsert("ns:1:log:records2", "b", 2).await.unwrap();

        assert_eq!(backend.index_len("ns:1:log:records").await.unwrap(), 1);
        assert_eq!(backend.index_len("ns:1:log:records2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_moves_member() {
        let (backend, _clock, _temp) = create_test_backend(1_000);
        backend.index_upsert("idx", "a", 10).await.unwrap();
        backend.index_upsert("idx", "a", 20).await.unwrap();

        assert_eq!(backend.index_len("idx").await.unwrap(), 1);
        assert_eq!(backend.index_count("idx", 20, 20).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_up_to() {
        let (backend, _clock, _temp) = create_test_backend(1_000);
        for i in 1..=5 {
            backend.index_upsert("idx", &format!("m{i}"), i).await.unwrap();
        }

        assert_eq!(backend.index_remove_up_to("idx", 3).await.unwrap(), 3);
        assert_eq!(backend.index_len("idx").await.unwrap(), 2);
        assert_eq!(backend.index_count("idx", i64::MIN, 3).await.unwrap(), 0);

        // Removed members can be re-added at a new score
        backend.index_upsert("idx", "m1", 9).await.unwrap();
        assert_eq!(backend.index_len("idx").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_batch_with_ttl() {
        let (backend, clock, _temp) = create_test_backend(1_000);
        let mut batch = WriteBatch::new();
        batch
            .set_fields("rec", [("level", "error"), ("message", "boom")])
            .expire("rec", 604_800)
            .index_upsert("idx", "rec", 1_000);
        backend.execute(batch).await.unwrap();

        assert_eq!(backend.ttl("rec").await.unwrap(), TtlStatus::Expires(604_800));
        assert_eq!(backend.ttl("idx").await.unwrap(), TtlStatus::Persistent);
        let fields = backend
            .get_fields("rec", &["level", "message"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fields, vec![Some("error".into()), Some("boom".into())]);

        clock.advance(604_800);
        assert!(!backend.exists("rec").await.unwrap());
        assert_eq!(backend.ttl("rec").await.unwrap(), TtlStatus::Missing);
        assert_eq!(backend.purge_expired().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_no_trace() {
        let (backend, _clock, _temp) = create_test_backend(1_000);
        backend.index_upsert("idx", "a", 1).await.unwrap();

        let mut batch = WriteBatch::new();
        batch
            .set_fields("rec", [("level", "info")])
            .set_fields("idx", [("level", "info")]);

        let err = backend.execute(batch).await.unwrap_err();
        assert!(matches!(err, BackendError::WrongType(_)));
        assert!(!backend.exists("rec").await.unwrap());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reopen.redb");
        let clock = Arc::new(ManualClock::at(1_000));

        {
            let backend =
                RedbBackend::open_with_clock(RedbBackendConfig::at(&path), clock.clone()).unwrap();
            backend.index_upsert("idx", "a", 1).await.unwrap();
        }

        let backend = RedbBackend::open_with_clock(RedbBackendConfig::at(&path), clock).unwrap();
        assert_eq!(backend.index_len("idx").await.unwrap(), 1);
    }
}
