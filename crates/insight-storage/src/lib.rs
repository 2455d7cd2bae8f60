//! # Insight Storage
//!
//! Storage backends for the Insight log store.
//!
//! ## Features
//!
//! - **MemoryBackend**: In-memory implementation for tests and embedding
//! - **RedbBackend**: File-based persistent implementation for production
//!
//! Both implement [`LogBackend`] and apply a [`WriteBatch`](insight_core::WriteBatch)
//! atomically, so the log store behaves the same on either.
//!
//! ## Example
//!
//! ```rust,ignore
//! use insight_core::LogBackend;
//! use insight_storage::MemoryBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!     backend.index_upsert("insight:1:log:records", "abc", 1_700_000_000).await.unwrap();
//!     assert_eq!(backend.index_len("insight:1:log:records").await.unwrap(), 1);
//! }
//! ```

pub mod memory;
pub mod persistent;

// Re-exports
pub use memory::MemoryBackend;
pub use persistent::{RedbBackend, RedbBackendConfig};

// Re-export the backend trait for convenience
pub use insight_core::LogBackend;
