// src/scheduling/gate.rs

//! Dependency gate.

use std::collections::HashMap;

use crate::task::Task;
use crate::types::TaskStatus;

/// Status of every task in a snapshot, keyed by id.
pub type StatusIndex<'a> = HashMap<&'a str, TaskStatus>;

pub fn status_index(snapshot: &[Task]) -> StatusIndex<'_> {
    snapshot
        .iter()
        .map(|t| (t.id.as_str(), t.status))
        .collect()
}

/// Whether every dependency of `task` is satisfied in `snapshot`.
///
/// A dependency is satisfied when it is COMPLETED, or when it is not in the
/// snapshot at all: pruned records are assumed to have completed.
pub fn satisfied(task: &Task, snapshot: &[Task]) -> bool {
    satisfied_in(task, &status_index(snapshot))
}

/// Same as [`satisfied`], against a prebuilt index.
pub fn satisfied_in(task: &Task, index: &StatusIndex<'_>) -> bool {
    task.dependencies
        .iter()
        .all(|dep| index.get(dep.as_str()).is_none_or(|s| *s == TaskStatus::Completed))
}

/// Dependencies of `task` that currently hold it back.
pub fn unmet_dependencies<'t>(task: &'t Task, index: &StatusIndex<'_>) -> Vec<&'t str> {
    task.dependencies
        .iter()
        .filter(|dep| {
            index
                .get(dep.as_str())
                .is_some_and(|s| *s != TaskStatus::Completed)
        })
        .map(|dep| dep.as_str())
        .collect()
}
