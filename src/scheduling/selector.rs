// src/scheduling/selector.rs

//! Selection of the next task to run.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::scheduling::gate::{satisfied_in, status_index};
use crate::task::Task;
use crate::types::TaskStatus;

/// Return the first eligible QUEUED task of `snapshot`.
///
/// `snapshot` must already be in store order (priority desc, created_at
/// asc). A blocked high-priority task does not hold back a lower-priority
/// eligible one. Tasks still waiting out a retry backoff are skipped.
pub fn next_runnable(snapshot: &[Task], now: DateTime<Utc>) -> Option<&Task> {
    let index = status_index(snapshot);

    snapshot
        .iter()
        .filter(|t| t.status == TaskStatus::Queued)
        .filter(|t| t.retry_after.is_none_or(|at| at <= now))
        .find(|t| {
            let ok = satisfied_in(t, &index);
            if !ok {
                trace!(task_id = %t.id, "skipping task with unmet dependencies");
            }
            ok
        })
}

/// Position of `next_runnable` within `snapshot`.
pub fn next_runnable_position(snapshot: &[Task], now: DateTime<Utc>) -> Option<usize> {
    let id = next_runnable(snapshot, now)?.id.as_str();
    snapshot.iter().position(|t| t.id == id)
}

/// Earliest `retry_after` among QUEUED tasks still backing off.
pub fn next_retry_at(snapshot: &[Task], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    snapshot
        .iter()
        .filter(|t| t.status == TaskStatus::Queued)
        .filter_map(|t| t.retry_after)
        .filter(|at| *at > now)
        .min()
}
