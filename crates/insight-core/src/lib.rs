//! # Insight Core
//!
//! Core traits, types, and errors for the Insight log store.
//!
//! This crate provides the foundational abstractions shared by the storage
//! backends and the log store engine, so that the same engine runs against
//! an in-memory store in tests and a persistent store in production.
//!
//! ## Key Traits
//!
//! - [`LogBackend`]: Ordered indexes and expiring records with atomic batches
//! - [`Clock`]: Time abstraction for testability
//!
//! ## Key Types
//!
//! - [`Level`]: Record severity
//! - [`LogRecord`]: A resolved log entry
//! - [`Namespace`]: Per-account key prefix
//! - [`WriteBatch`]: Mutations applied as one transaction

pub mod backend;
pub mod clock;
pub mod context;
pub mod error;
pub mod level;
pub mod namespace;
pub mod record;

// Re-export main types
pub use backend::*;
pub use clock::*;
pub use context::*;
pub use error::*;
pub use level::*;
pub use namespace::*;
pub use record::*;
