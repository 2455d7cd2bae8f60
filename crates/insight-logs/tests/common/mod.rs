//! Shared fixtures for the log store integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use insight_core::{
    BackendResult, Context, LogBackend, ManualClock, Namespace, ScoredMember, TtlStatus, WriteBatch,
};
use insight_logs::{LogStore, LogStoreConfig};
use insight_storage::{MemoryBackend, RedbBackend, RedbBackendConfig};
use serde_json::Value;
use tempfile::TempDir;

/// Fixed "now" for every test store
pub const NOW: i64 = 1_700_000_000;

pub const DAY: i64 = 86_400;

/// A log store over one backend, with the clock both of them read
pub struct Harness {
    pub store: Arc<LogStore>,
    pub backend: Arc<dyn LogBackend>,
    pub clock: Arc<ManualClock>,
    _temp_dir: Option<TempDir>,
}

impl Harness {
    pub fn memory() -> Self {
        Self::memory_with(LogStoreConfig::default())
    }

    pub fn memory_with(config: LogStoreConfig) -> Self {
        insight_logging::init_testing();
        let clock = Arc::new(ManualClock::at(NOW));
        let backend: Arc<dyn LogBackend> = Arc::new(MemoryBackend::with_clock(clock.clone()));
        Self::build(backend, clock, config, None)
    }

    pub fn redb() -> Self {
        Self::redb_with(LogStoreConfig::default())
    }

    pub fn redb_with(config: LogStoreConfig) -> Self {
        insight_logging::init_testing();
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at(NOW));
        let backend: Arc<dyn LogBackend> = Arc::new(
            RedbBackend::open_with_clock(
                RedbBackendConfig::at(temp_dir.path().join("logs.redb")),
                clock.clone(),
            )
            .unwrap(),
        );
        Self::build(backend, clock, config, Some(temp_dir))
    }

    fn build(
        backend: Arc<dyn LogBackend>,
        clock: Arc<ManualClock>,
        config: LogStoreConfig,
        temp_dir: Option<TempDir>,
    ) -> Self {
        let store = LogStore::new(backend.clone(), Namespace::for_account(1))
            .with_clock(clock.clone())
            .with_config(config)
            .unwrap();
        Self {
            store: Arc::new(store),
            backend,
            clock,
            _temp_dir: temp_dir,
        }
    }

    /// The same data behind a backend that counts record reads
    pub fn counting(self) -> (Self, Arc<CountingBackend>) {
        let counting = Arc::new(CountingBackend::new(self.backend.clone()));
        let backend: Arc<dyn LogBackend> = counting.clone();
        let harness = Self::build(
            backend,
            self.clock,
            self.store.config().clone(),
            self._temp_dir,
        );
        (harness, counting)
    }

    /// Another account's store on the same backend and clock
    pub fn account(&self, account_id: u64) -> LogStore {
        LogStore::new(self.backend.clone(), Namespace::for_account(account_id))
            .with_clock(self.clock.clone())
    }
}

/// Forwards to another backend, counting `get_fields` calls
pub struct CountingBackend {
    inner: Arc<dyn LogBackend>,
    field_reads: AtomicUsize,
}

impl CountingBackend {
    pub fn new(inner: Arc<dyn LogBackend>) -> Self {
        Self {
            inner,
            field_reads: AtomicUsize::new(0),
        }
    }

    /// Records resolved so far
    pub fn field_reads(&self) -> usize {
        self.field_reads.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.field_reads.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogBackend for CountingBackend {
    async fn exists(&self, key: &str) -> BackendResult<bool> {
        self.inner.exists(key).await
    }

    async fn get_fields(&self, key: &str, fields: &[&str]) -> BackendResult<Option<Vec<Option<String>>>> {
        self.field_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_fields(key, fields).await
    }

    async fn ttl(&self, key: &str) -> BackendResult<TtlStatus> {
        self.inner.ttl(key).await
    }

    async fn index_range_desc(&self, key: &str, offset: usize, limit: usize) -> BackendResult<Vec<ScoredMember>> {
        self.inner.index_range_desc(key, offset, limit).await
    }

    async fn index_count(&self, key: &str, min: i64, max: i64) -> BackendResult<usize> {
        self.inner.index_count(key, min, max).await
    }

    async fn index_len(&self, key: &str) -> BackendResult<usize> {
        self.inner.index_len(key).await
    }

    async fn index_remove_up_to(&self, key: &str, max: i64) -> BackendResult<usize> {
        self.inner.index_remove_up_to(key, max).await
    }

    async fn execute(&self, batch: WriteBatch) -> BackendResult<()> {
        self.inner.execute(batch).await
    }
}

/// Build a context from a JSON object literal
pub fn ctx(value: Value) -> Context {
    match value {
        Value::Object(map) => map,
        other => panic!("context must be a JSON object, got {other}"),
    }
}

/// Context that only pins the record timestamp
pub fn at(timestamp: i64) -> Context {
    ctx(serde_json::json!({ "timestamp": timestamp }))
}

/// Run an async test body once per backend
#[allow(unused_macros)]
macro_rules! on_both_backends {
    ($name:ident, $body:ident) => {
        mod $name {
            use super::*;

            #[tokio::test]
            async fn memory() {
                $body(common::Harness::memory()).await;
            }

            #[tokio::test]
            async fn redb() {
                $body(common::Harness::redb()).await;
            }
        }
    };
}
