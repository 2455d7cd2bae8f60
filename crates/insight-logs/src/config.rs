//! Log store configuration

use serde::{Deserialize, Serialize};

use crate::error::{LogStoreError, LogStoreResult};

/// Default retention window: 7 days
pub const DEFAULT_RETENTION_SECS: u64 = 604_800;

/// Characters record ids are drawn from
pub const ID_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of generated record ids
pub const ID_LENGTH: usize = 12;

/// Expiry applied to each stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTtl {
    /// Expire records after the retention window
    #[default]
    Retention,
    /// Keep records until the index prune removes their entry
    ///
    /// The record itself stays in the backing store after that.
    Persistent,
}

/// Configuration for a [`LogStore`](crate::LogStore)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStoreConfig {
    /// Maximum age of an index entry, in seconds
    pub retention_secs: u64,
    /// Expiry policy for record payloads
    pub record_ttl: RecordTtl,
    /// Length of generated ids
    pub id_length: usize,
    /// Alphabet generated ids are sampled from
    pub id_alphabet: String,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION_SECS,
            record_ttl: RecordTtl::Retention,
            id_length: ID_LENGTH,
            id_alphabet: ID_ALPHABET.to_string(),
        }
    }
}

impl LogStoreConfig {
    /// Short retention for tests and demos (1 hour)
    pub fn short_lived() -> Self {
        Self {
            retention_secs: 3_600,
            ..Default::default()
        }
    }

    /// Long retention (30 days)
    pub fn long_lived() -> Self {
        Self {
            retention_secs: 30 * 86_400,
            ..Default::default()
        }
    }

    /// Set the retention window
    pub fn with_retention_secs(mut self, secs: u64) -> Self {
        self.retention_secs = secs;
        self
    }

    /// Set the record expiry policy
    pub fn with_record_ttl(mut self, ttl: RecordTtl) -> Self {
        self.record_ttl = ttl;
        self
    }

    /// Set the id length
    pub fn with_id_length(mut self, length: usize) -> Self {
        self.id_length = length;
        self
    }

    /// Set the id alphabet
    pub fn with_id_alphabet(mut self, alphabet: impl Into<String>) -> Self {
        self.id_alphabet = alphabet.into();
        self
    }

    /// Seconds a freshly written record lives, or `None` if it does not expire
    pub fn record_ttl_secs(&self) -> Option<u64> {
        match self.record_ttl {
            RecordTtl::Retention => Some(self.retention_secs),
            RecordTtl::Persistent => None,
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> LogStoreResult<()> {
        if self.retention_secs == 0 {
            return Err(LogStoreError::InvalidConfig(
                "retention must be at least one second".to_string(),
            ));
        }
        if i64::try_from(self.retention_secs).is_err() {
            return Err(LogStoreError::InvalidConfig(format!(
                "retention of {} seconds is out of range",
                self.retention_secs
            )));
        }
        if self.id_length == 0 {
            return Err(LogStoreError::InvalidConfig(
                "id length must be positive".to_string(),
            ));
        }
        if self.id_alphabet.is_empty() {
            return Err(LogStoreError::InvalidConfig(
                "id alphabet must not be empty".to_string(),
            ));
        }
        if self.id_alphabet.contains(':') || self.id_alphabet.contains('\0') {
            return Err(LogStoreError::InvalidConfig(
                "id alphabet must not contain ':' or NUL".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogStoreConfig::default();
        assert_eq!(config.retention_secs, 604_800);
        assert_eq!(config.record_ttl, RecordTtl::Retention);
        assert_eq!(config.id_length, 12);
        assert_eq!(config.id_alphabet.len(), 36);
        assert_eq!(config.record_ttl_secs(), Some(604_800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_persistent_records() {
        let config = LogStoreConfig::default().with_record_ttl(RecordTtl::Persistent);
        assert_eq!(config.record_ttl_secs(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(LogStoreConfig::default().with_retention_secs(0).validate().is_err());
        assert!(LogStoreConfig::default().with_retention_secs(u64::MAX).validate().is_err());
        assert!(LogStoreConfig::default().with_id_length(0).validate().is_err());
        assert!(LogStoreConfig::default().with_id_alphabet("").validate().is_err());
        assert!(LogStoreConfig::default().with_id_alphabet("ab:").validate().is_err());
    }

    #[test]
    fn test_config_serde() {
        let config = LogStoreConfig::short_lived().with_record_ttl(RecordTtl::Persistent);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"persistent\""));
        let back: LogStoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
