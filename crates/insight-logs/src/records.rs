//! Per-account record payloads
//!
//! Each record is a small group of fields at `<namespace>:log:<id>`:
//! `level`, `message` and `context` (the encoded context envelope).

use std::str::FromStr;
use std::sync::Arc;

use insight_core::{
    BackendError, Level, LogBackend, Namespace, RecordFields, RecordId, TtlStatus, WriteBatch, decode_context,
    encode_context,
};

use crate::error::{LogStoreError, LogStoreResult};

const FIELD_LEVEL: &str = "level";
const FIELD_MESSAGE: &str = "message";
const FIELD_CONTEXT: &str = "context";

/// Immutable, individually expiring record payloads for one account
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn LogBackend>,
    namespace: Namespace,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl RecordStore {
    pub fn new(backend: Arc<dyn LogBackend>, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }

    fn key(&self, id: &RecordId) -> String {
        self.namespace.log_record_key(id.as_str())
    }

    /// Whether a live record is stored under `id`
    pub async fn exists(&self, id: &RecordId) -> LogStoreResult<bool> {
        Ok(self.backend.exists(&self.key(id)).await?)
    }

    /// Store a record, expiring it after `ttl_secs` when given
    pub async fn put(&self, id: &RecordId, fields: &RecordFields, ttl_secs: Option<u64>) -> LogStoreResult<()> {
        let mut batch = WriteBatch::new();
        self.stage_put(&mut batch, id, fields, ttl_secs)?;
        self.backend.execute(batch).await?;
        Ok(())
    }

    /// Queue storing a record into a batch instead of applying it
    pub fn stage_put(
        &self,
        batch: &mut WriteBatch,
        id: &RecordId,
        fields: &RecordFields,
        ttl_secs: Option<u64>,
    ) -> LogStoreResult<()> {
        let context = encode_context(&fields.context)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;

        let key = self.key(id);
        batch.set_fields(
            key.as_str(),
            [
                (FIELD_LEVEL, fields.level.as_str().to_string()),
                (FIELD_MESSAGE, fields.message.clone()),
                (FIELD_CONTEXT, context),
            ],
        );
        if let Some(secs) = ttl_secs {
            batch.expire(key, secs);
        }
        Ok(())
    }

    /// Load the record stored under `id`
    ///
    /// Returns `None` when the record is missing or has expired.
    pub async fn get(&self, id: &RecordId) -> LogStoreResult<Option<RecordFields>> {
        let Some(values) = self
            .backend
            .get_fields(&self.key(id), &[FIELD_LEVEL, FIELD_MESSAGE, FIELD_CONTEXT])
            .await?
        else {
            return Ok(None);
        };

        let mut values = values.into_iter();
        let (Some(Some(level)), Some(Some(message)), Some(context)) =
            (values.next(), values.next(), values.next())
        else {
            return Err(LogStoreError::corrupt(id.as_str(), "missing level or message"));
        };

        let level = Level::from_str(&level)
            .map_err(|e| LogStoreError::corrupt(id.as_str(), e.to_string()))?;
        let context = match context {
            Some(raw) => decode_context(&raw)
                .map_err(|e| LogStoreError::corrupt(id.as_str(), e.to_string()))?,
            None => Default::default(),
        };

        Ok(Some(RecordFields {
            level,
            message,
            context,
        }))
    }

    /// Remaining lifetime of the record stored under `id`
    pub async fn ttl(&self, id: &RecordId) -> LogStoreResult<TtlStatus> {
        Ok(self.backend.ttl(&self.key(id)).await?)
    }
}
