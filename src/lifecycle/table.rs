// src/lifecycle/table.rs

//! The legal status transitions.

use crate::types::TaskStatus::{self, *};

/// Kind of a lifecycle transition, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Claim,
    Complete,
    Fail,
    Requeue,
    Cancel,
    Abort,
    ManualRetry,
}

/// Every legal `(kind, from, to)` triple. Anything not listed is rejected.
///
/// `Fail` has two rows; which one applies depends on the task's remaining
/// retry budget.
pub const TRANSITIONS: &[(TransitionKind, TaskStatus, TaskStatus)] = &[
    (TransitionKind::Claim, Queued, Running),
    (TransitionKind::Complete, Running, Completed),
    (TransitionKind::Fail, Running, Failed),
    (TransitionKind::Fail, Running, Retrying),
    (TransitionKind::Requeue, Retrying, Queued),
    (TransitionKind::Cancel, Queued, Cancelled),
    (TransitionKind::Abort, Running, Cancelled),
    (TransitionKind::ManualRetry, Failed, Retrying),
];

pub fn is_allowed(kind: TransitionKind, from: TaskStatus, to: TaskStatus) -> bool {
    TRANSITIONS
        .iter()
        .any(|&(k, f, t)| k == kind && f == from && t == to)
}
