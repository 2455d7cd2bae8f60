//! Account-level entry point
//!
//! [`Insight`] owns the shared backend and configuration. Each account gets
//! an [`AccountInsight`] handle whose log lives in the account's namespace.
//!
//! ```rust,ignore
//! let insight = Insight::in_memory();
//! let account = insight.account(42);
//! account.info("User {user} signed in", context).await?;
//! let newest = account.get_log(1, 100).await?;
//! ```

use std::sync::Arc;

use insight_core::{
    Clock, Context, DEFAULT_KEY_PREFIX, Level, LogBackend, LogRecord, Namespace, RecordId,
    SystemClock,
};
use insight_storage::{MemoryBackend, RedbBackend, RedbBackendConfig};

use crate::config::LogStoreConfig;
use crate::error::LogStoreResult;
use crate::filter::{Flow, LogFilter};
use crate::store::LogStore;

/// Shared entry point handing out per-account log handles
#[derive(Clone)]
pub struct Insight {
    backend: Arc<dyn LogBackend>,
    config: LogStoreConfig,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl std::fmt::Debug for Insight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Insight")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl Insight {
    /// Create an entry point over `backend` with default settings
    pub fn new(backend: Arc<dyn LogBackend>) -> Self {
        Self {
            backend,
            config: LogStoreConfig::default(),
            clock: Arc::new(SystemClock),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Entry point over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Entry point over a redb database
    pub fn open(config: RedbBackendConfig) -> LogStoreResult<Self> {
        Ok(Self::new(Arc::new(RedbBackend::open(config)?)))
    }

    /// Use the given log configuration for every account
    pub fn with_config(mut self, config: LogStoreConfig) -> LogStoreResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Read the current time from `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Put account namespaces under a different key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn config(&self) -> &LogStoreConfig {
        &self.config
    }

    /// Namespace of an account
    pub fn namespace(&self, account_id: u64) -> Namespace {
        Namespace::for_account_with_prefix(&self.key_prefix, account_id)
    }

    /// Log handle for an account
    pub fn account(&self, account_id: u64) -> AccountInsight {
        let logs = LogStore::new(self.backend.clone(), self.namespace(account_id))
            .with_clock(self.clock.clone())
            .with_checked_config(self.config.clone());

        AccountInsight { account_id, logs }
    }
}

/// Log operations of a single account
#[derive(Debug)]
pub struct AccountInsight {
    account_id: u64,
    logs: LogStore,
}

impl AccountInsight {
    pub fn account_id(&self) -> u64 {
        self.account_id
    }

    /// The underlying log store
    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    /// Write a record at `level`
    pub async fn log(&self, level: Level, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.logs.write(level, message, context).await
    }

    pub async fn emergency(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.logs.emergency(message, context).await
    }

    pub async fn alert(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.logs.alert(message, context).await
    }

    pub async fn critical(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.logs.critical(message, context).await
    }

    pub async fn error(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.logs.error(message, context).await
    }

    pub async fn warning(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.logs.warning(message, context).await
    }

    pub async fn notice(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.logs.notice(message, context).await
    }

    pub async fn info(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.logs.info(message, context).await
    }

    /// Always fails; debug records are never stored
    pub fn debug(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.logs.debug(message, context)
    }

    /// One page of the log, newest first
    pub async fn get_log(&self, page: usize, per_page: usize) -> LogStoreResult<Vec<LogRecord>> {
        self.logs.paginate(page, per_page).await
    }

    /// Visit log records newest first
    pub async fn for_each_log<F>(&self, filter: &LogFilter, callback: F) -> LogStoreResult<usize>
    where
        F: FnMut(&LogRecord, usize) -> Flow,
    {
        self.logs.for_each(filter, callback).await
    }

    /// Number of records in the log
    pub async fn count_logs(&self) -> LogStoreResult<usize> {
        self.logs.count().await
    }
}
