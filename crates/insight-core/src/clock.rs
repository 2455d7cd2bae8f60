//! Time abstraction for testability
//!
//! Record timestamps, expiry deadlines and the retention cutoff all come from
//! a [`Clock`], so tests can pin time the same way production reads it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Source of the current time in whole seconds since the Unix epoch
pub trait Clock: Send + Sync + Debug {
    /// Current Unix timestamp in seconds
    fn now(&self) -> i64;

    /// Current time as a UTC datetime
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.now(), 0).unwrap_or_default()
    }
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
///
/// Shared between a store and its backend so that writes, expiry and pruning
/// all observe the same instant.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock locked at the given timestamp
    pub fn at(timestamp: i64) -> Self {
        Self {
            now: AtomicI64::new(timestamp),
        }
    }

    /// Create a clock locked at the current system time
    pub fn starting_now() -> Self {
        Self::at(Utc::now().timestamp())
    }

    /// Lock the clock at a timestamp
    pub fn set(&self, timestamp: i64) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    /// Move the clock forward (or backward, for negative values)
    ///
    /// Returns the new time.
    pub fn advance(&self, seconds: i64) -> i64 {
        self.now.fetch_add(seconds, Ordering::SeqCst) + seconds
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
