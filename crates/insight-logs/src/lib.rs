//! # Insight Logs
//!
//! Per-account log store with time-bounded retention.
//!
//! Each account's log is two structures in the shared backend:
//!
//! - a **log index** ordering record ids by timestamp
//! - a **record store** holding each record's level, rendered message and
//!   residual context, expiring on its own
//!
//! [`LogStore`] writes both in one transaction and prunes the index on every
//! write. Reads go newest first and stop at the first index entry whose
//! record has already expired.
//!
//! ## Example
//!
//! ```rust,ignore
//! use insight_logs::{Flow, Insight, LogFilter};
//!
//! let insight = Insight::in_memory();
//! let account = insight.account(42);
//!
//! account.error("Failed to send email to {to}", context).await?;
//!
//! for record in account.get_log(1, 20).await? {
//!     println!("{} [{}] {}", record.timestamp, record.level, record.message);
//! }
//!
//! let filter = LogFilter::new().exclude(["Heartbeat"]);
//! account.for_each_log(&filter, |record, n| {
//!     println!("{n}: {}", record.message);
//!     Flow::from(n < 50)
//! }).await?;
//! ```

pub mod account;
pub mod config;
pub mod error;
pub mod filter;
pub mod id;
pub mod index;
pub mod records;
pub mod render;
pub mod store;

pub use account::{AccountInsight, Insight};
pub use config::{DEFAULT_RETENTION_SECS, ID_ALPHABET, ID_LENGTH, LogStoreConfig, RecordTtl};
pub use error::{LogStoreError, LogStoreResult};
pub use filter::{Flow, LogFilter};
pub use id::generate_id;
pub use index::LogIndex;
pub use records::RecordStore;
pub use render::render_template;
pub use store::{LogStore, TIMESTAMP_KEY};

// Re-export the core types callers need
pub use insight_core::{Context, Level, LogRecord, Namespace, RecordId};
