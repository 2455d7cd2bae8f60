//! Per-account key namespaces
//!
//! Every account owns a private prefix in the shared store. The log index
//! lives at `<prefix>:log:records` and each record at `<prefix>:log:<id>`.

use serde::{Deserialize, Serialize};

/// Sub-key of the log index within a namespace
pub const LOG_RECORDS_SUBKEY: &str = "log:records";

/// Default prefix shared by all account namespaces
pub const DEFAULT_KEY_PREFIX: &str = "insight";

/// Key prefix owned by a single account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    /// Create a namespace from a raw prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Namespace of an account under the default prefix
    pub fn for_account(account_id: u64) -> Self {
        Self::for_account_with_prefix(DEFAULT_KEY_PREFIX, account_id)
    }

    /// Namespace of an account under a custom prefix
    pub fn for_account_with_prefix(prefix: &str, account_id: u64) -> Self {
        Self::new(format!("{prefix}:{account_id}"))
    }

    /// The raw prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full key for a sub-key of this namespace
    pub fn key(&self, sub: &str) -> String {
        format!("{}:{}", self.prefix, sub)
    }

    /// Key of the log index
    pub fn log_records_key(&self) -> String {
        self.key(LOG_RECORDS_SUBKEY)
    }

    /// Key of a single log record
    pub fn log_record_key(&self, id: &str) -> String {
        self.key(&format!("log:{id}"))
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.prefix)
    }
}
