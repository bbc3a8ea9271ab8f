//! Storage backends for the ledger.
//!
//! Both backends share the row lock manager in [`locks`] and the buffered
//! unit of work in `work`; they differ only in where committed rows live.

pub mod in_memory;
pub mod locks;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
mod work;

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::time::Duration;

/// Knobs shared by every store implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a unit of work waits for a contended row lock.
    /// Zero means fail immediately with `Busy`.
    pub lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Ordering for "newest first" listings: creation time descending, then id
/// descending.
fn newest_first(a: (DateTime<Utc>, i64), b: (DateTime<Utc>, i64)) -> Ordering {
    b.cmp(&a)
}

fn page<T>(rows: impl Iterator<Item = T>, window: crate::domain::ports::Page) -> Vec<T> {
    rows.skip(window.offset).take(window.limit).collect()
}
