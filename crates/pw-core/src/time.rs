//! Time utilities for Portway
//!
//! Session activity timestamps are stored as Unix milliseconds in atomics so
//! any user task can update them without taking a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is set before the Unix epoch.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Calculate elapsed time in milliseconds since a given timestamp.
///
/// Returns 0 if the given time is in the future.
pub fn elapsed_millis(since: u64) -> u64 {
    current_time_millis().saturating_sub(since)
}

/// A millisecond timestamp that can be updated through a shared reference
#[derive(Debug)]
pub struct Timestamp(AtomicU64);

impl Timestamp {
    /// Timestamp initialized to the current time
    pub fn now() -> Self {
        Self(AtomicU64::new(current_time_millis()))
    }

    /// Read the stored value
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Store the current time
    pub fn touch(&self) {
        self.set(current_time_millis());
    }

    /// Store an explicit value
    pub fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::Relaxed);
    }
}
