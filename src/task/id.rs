// src/task/id.rs

//! Task id generation.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::task::TaskId;

/// Generates ids of the form `task_<yyyymmddHHMMSSmmm>_<suffix>`.
///
/// The suffix is a per-generator counter, so two ids minted within the same
/// millisecond still differ and sort in submission order.
#[derive(Debug, Default)]
pub struct IdGenerator {
    seq: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
        }
    }

    /// Start the suffix after `seq`, e.g. after reloading a store.
    pub fn starting_after(seq: u64) -> Self {
        Self {
            seq: AtomicU64::new(seq),
        }
    }

    pub fn next_id(&self, now: DateTime<Utc>) -> TaskId {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("task_{}_{:06}", now.format("%Y%m%d%H%M%S%3f"), seq)
    }
}

/// Extract the numeric suffix of a generated id, if it has one.
pub fn suffix_of(id: &str) -> Option<u64> {
    let rest = id.strip_prefix("task_")?;
    let (_, suffix) = rest.rsplit_once('_')?;
    suffix.parse().ok()
}
