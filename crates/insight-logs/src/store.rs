//! The log store: writer and reader for one account's log
//!
//! ## Writing
//!
//! [`LogStore::write`] renders the message, resolves the timestamp, picks an
//! id no live record uses, then stores the record and its index entry in a
//! single [`WriteBatch`]. After the batch commits, index entries older than
//! the retention window are pruned; a backend failure there is returned to
//! the caller like any other.
//!
//! ## Reading
//!
//! Reads walk the index newest first and resolve each id against the record
//! store. An id without a record is a gap (the record expired or was never
//! fully visible) and ends the read: records past a gap are not returned.

use std::sync::Arc;

use insight_core::{
    Clock, Context, Level, LogBackend, LogRecord, Namespace, RecordFields, RecordId, SystemClock,
    WriteBatch, is_truthy,
};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::config::LogStoreConfig;
use crate::error::{LogStoreError, LogStoreResult};
use crate::filter::{Flow, LogFilter};
use crate::id::generate_id;
use crate::index::LogIndex;
use crate::records::RecordStore;
use crate::render::render_template;

/// Context key that overrides a record's timestamp
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Sub-key the index occupies under `log:`; never handed out as an id
const RESERVED_ID: &str = "records";

/// Log of one account
///
/// Cheap to share behind an `Arc`; every method takes `&self` and the store
/// may be used from many tasks at once.
pub struct LogStore {
    namespace: Namespace,
    index: LogIndex,
    records: RecordStore,
    backend: Arc<dyn LogBackend>,
    config: LogStoreConfig,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}

impl LogStore {
    /// Create a store with the default configuration on the system clock
    pub fn new(backend: Arc<dyn LogBackend>, namespace: Namespace) -> Self {
        Self {
            index: LogIndex::new(backend.clone(), &namespace),
            records: RecordStore::new(backend.clone(), namespace.clone()),
            namespace,
            backend,
            config: LogStoreConfig::default(),
            clock: Arc::new(SystemClock),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Use the given configuration
    pub fn with_config(mut self, config: LogStoreConfig) -> LogStoreResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Use a configuration that already passed validation
    pub(crate) fn with_checked_config(mut self, config: LogStoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Read the current time from `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Generate ids from a seeded RNG, making them reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn config(&self) -> &LogStoreConfig {
        &self.config
    }

    /// The ordered index of this log
    pub fn index(&self) -> &LogIndex {
        &self.index
    }

    /// The record payloads of this log
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    // ---------------------------------------------------
    //  Writer
    // ---------------------------------------------------

    /// Write a record at `level`, returning its id
    ///
    /// `{key}` placeholders in `message` are replaced from `context`. A truthy
    /// `timestamp` context entry sets the record's timestamp; otherwise the
    /// clock's current time is used.
    pub async fn write(&self, level: Level, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.write_at(level, message, context, None).await
    }

    /// Write a record with an explicit timestamp
    ///
    /// An explicit timestamp takes precedence over a `timestamp` context
    /// entry, which is still removed from the stored context and is not
    /// parsed. A failed retention prune after the commit is returned as an
    /// error even though the record is stored.
    #[instrument(skip(self, message, context), fields(namespace = %self.namespace))]
    pub async fn write_at(
        &self,
        level: Level,
        message: &str,
        context: Context,
        timestamp: Option<i64>,
    ) -> LogStoreResult<RecordId> {
        if !level.is_persistable() {
            return Err(LogStoreError::RejectedLevel(level));
        }

        let (message, mut context) = render_template(message, context);
        let timestamp = match timestamp {
            Some(explicit) => {
                strip_timestamp(&mut context);
                explicit
            }
            None => take_timestamp(&mut context)?.unwrap_or_else(|| self.clock.now()),
        };

        let id = self.allocate_id().await?;
        let fields = RecordFields {
            level,
            message,
            context,
        };

        let mut batch = WriteBatch::new();
        self.records
            .stage_put(&mut batch, &id, &fields, self.config.record_ttl_secs())?;
        self.index.stage_insert(&mut batch, &id, timestamp);
        self.backend.execute(batch).await?;

        debug!(id = %id, timestamp, "Wrote log record");

        self.prune_expired().await?;
        Ok(id)
    }

    /// Find an id no live record uses
    ///
    /// Retries until a free id turns up; only backend failures end the loop.
    async fn allocate_id(&self) -> LogStoreResult<RecordId> {
        let mut collisions = 0u64;
        loop {
            let candidate = {
                let mut rng = self.rng.lock();
                generate_id(&mut *rng, &self.config.id_alphabet, self.config.id_length)
            };
            if candidate == RESERVED_ID {
                continue;
            }

            let id = RecordId::new(candidate);
            if !self.records.exists(&id).await? {
                if collisions > 0 {
                    debug!(collisions, id = %id, "Allocated record id after collisions");
                }
                return Ok(id);
            }

            collisions += 1;
            trace!(id = %id, "Record id already in use");
        }
    }

    /// Remove index entries older than the retention window
    pub async fn prune_expired(&self) -> LogStoreResult<usize> {
        let cutoff = self
            .clock
            .now()
            .saturating_sub_unsigned(self.config.retention_secs);
        self.index.prune_older_than(cutoff).await
    }

    pub async fn emergency(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.write(Level::Emergency, message, context).await
    }

    pub async fn alert(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.write(Level::Alert, message, context).await
    }

    pub async fn critical(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.write(Level::Critical, message, context).await
    }

    pub async fn error(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.write(Level::Error, message, context).await
    }

    pub async fn warning(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.write(Level::Warning, message, context).await
    }

    pub async fn notice(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.write(Level::Notice, message, context).await
    }

    pub async fn info(&self, message: &str, context: Context) -> LogStoreResult<RecordId> {
        self.write(Level::Info, message, context).await
    }

    /// Debug records are never stored; this always fails with
    /// [`LogStoreError::RejectedLevel`] without touching the backend.
    pub fn debug(&self, _message: &str, _context: Context) -> LogStoreResult<RecordId> {
        Err(LogStoreError::RejectedLevel(Level::Debug))
    }

    // ---------------------------------------------------
    //  Reader
    // ---------------------------------------------------

    /// One page of records, newest first
    ///
    /// Pages start at 1. A page ends early at the first gap.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn paginate(&self, page: usize, per_page: usize) -> LogStoreResult<Vec<LogRecord>> {
        if page == 0 || per_page == 0 {
            return Err(LogStoreError::InvalidPagination { page, per_page });
        }

        let offset = (page - 1).saturating_mul(per_page);
        let entries = self.index.range_descending(offset, per_page).await?;

        let mut page_records = Vec::with_capacity(entries.len());
        for (id, timestamp) in entries {
            match self.records.get(&id).await? {
                Some(fields) => page_records.push(LogRecord::from_parts(id, timestamp, fields)),
                None => {
                    debug!(id = %id, "Log record missing, ending page at gap");
                    break;
                }
            }
        }
        Ok(page_records)
    }

    /// Visit every record, newest first
    ///
    /// Records rejected by `filter` are skipped. `callback` gets each
    /// delivered record with its 1-based delivery count and decides whether
    /// to go on. Iteration also ends at the first gap. Returns how many
    /// records were delivered.
    #[instrument(skip(self, filter, callback), fields(namespace = %self.namespace))]
    pub async fn for_each<F>(&self, filter: &LogFilter, mut callback: F) -> LogStoreResult<usize>
    where
        F: FnMut(&LogRecord, usize) -> Flow,
    {
        let size = self.index.size().await?;
        let entries = self.index.range_descending(0, size).await?;

        let mut delivered = 0;
        for (id, timestamp) in entries {
            let Some(fields) = self.records.get(&id).await? else {
                debug!(id = %id, delivered, "Log record missing, ending iteration at gap");
                break;
            };

            if !filter.matches(&fields.message) {
                continue;
            }

            delivered += 1;
            let record = LogRecord::from_parts(id, timestamp, fields);
            if callback(&record, delivered) == Flow::Stop {
                break;
            }
        }
        Ok(delivered)
    }

    /// Number of entries in the index
    pub async fn count(&self) -> LogStoreResult<usize> {
        self.index.size().await
    }
}

/// Remove a truthy `timestamp` entry from `context` without parsing it
fn strip_timestamp(context: &mut Context) {
    if context.get(TIMESTAMP_KEY).is_some_and(is_truthy) {
        context.remove(TIMESTAMP_KEY);
    }
}

/// Remove a truthy `timestamp` entry from `context` and parse it
///
/// Falsy values are left in place and yield `None`.
fn take_timestamp(context: &mut Context) -> LogStoreResult<Option<i64>> {
    if !context.get(TIMESTAMP_KEY).is_some_and(is_truthy) {
        return Ok(None);
    }
    let Some(value) = context.remove(TIMESTAMP_KEY) else {
        return Ok(None);
    };

    let parsed = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| LogStoreError::InvalidTimestamp(value.to_string()))
}
