// src/lifecycle/mod.rs

//! Task lifecycle state machine.
//!
//! [`apply`] is the only code path that writes `Task::status`. It checks the
//! requested [`Transition`] against the table in [`table`], updates the
//! lifecycle timestamps and outcome fields that belong to that transition,
//! and returns the [`ExecutionEvent`] to append to the log.

pub mod event;
pub mod table;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::{Result, TaskschedError};
use crate::task::Task;
use crate::types::{FailureKind, TaskStatus};

pub use event::ExecutionEvent;
pub use table::{TransitionKind, TRANSITIONS};

/// A requested status change, with the payload it records.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// QUEUED -> RUNNING, when the executor claims the task.
    Claim,
    /// RUNNING -> COMPLETED.
    Complete { result: Option<String> },
    /// RUNNING -> RETRYING while retries remain, RUNNING -> FAILED otherwise.
    Fail { error: String, kind: FailureKind },
    /// RETRYING -> QUEUED. The task is not selectable before `not_before`.
    Requeue { not_before: Option<DateTime<Utc>> },
    /// QUEUED -> CANCELLED.
    Cancel,
    /// RUNNING -> CANCELLED, once a cancelled invocation has returned.
    Abort,
    /// FAILED -> RETRYING, on explicit request.
    ManualRetry,
}

impl Transition {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Transition::Claim => TransitionKind::Claim,
            Transition::Complete { .. } => TransitionKind::Complete,
            Transition::Fail { .. } => TransitionKind::Fail,
            Transition::Requeue { .. } => TransitionKind::Requeue,
            Transition::Cancel => TransitionKind::Cancel,
            Transition::Abort => TransitionKind::Abort,
            Transition::ManualRetry => TransitionKind::ManualRetry,
        }
    }

    /// Status the task ends up in if the transition is accepted.
    pub fn target(&self, task: &Task) -> TaskStatus {
        match self {
            Transition::Claim => TaskStatus::Running,
            Transition::Complete { .. } => TaskStatus::Completed,
            Transition::Fail { .. } => {
                if task.retries_remaining() {
                    TaskStatus::Retrying
                } else {
                    TaskStatus::Failed
                }
            }
            Transition::Requeue { .. } => TaskStatus::Queued,
            Transition::Cancel | Transition::Abort => TaskStatus::Cancelled,
            Transition::ManualRetry => TaskStatus::Retrying,
        }
    }
}

/// Validate and apply `transition` to `task`.
///
/// On error the task is left untouched.
pub fn apply(task: &mut Task, transition: Transition, now: DateTime<Utc>) -> Result<ExecutionEvent> {
    let from = task.status;
    let to = transition.target(task);

    if !table::is_allowed(transition.kind(), from, to) {
        return Err(TaskschedError::InvalidTransition {
            task_id: task.id.clone(),
            from,
            to,
        });
    }

    match transition {
        Transition::Claim => {
            task.started_at = Some(now);
            task.retry_after = None;
            task.result = None;
            task.error = None;
            task.failure_kind = None;
        }
        Transition::Complete { result } => {
            task.completed_at = Some(now);
            task.execution_time = Some(elapsed_since(task.started_at, now));
            task.result = result;
        }
        Transition::Fail { error, kind } => {
            task.error = Some(error);
            task.failure_kind = Some(kind);
            task.execution_time = Some(elapsed_since(task.started_at, now));
            if to == TaskStatus::Retrying {
                task.retry_count += 1;
            } else {
                task.completed_at = Some(now);
            }
        }
        Transition::Requeue { not_before } => {
            task.queued_at = Some(now);
            task.retry_after = not_before;
        }
        Transition::Cancel => {
            task.completed_at = Some(now);
        }
        Transition::Abort => {
            task.completed_at = Some(now);
            task.execution_time = Some(elapsed_since(task.started_at, now));
            task.error = Some("cancelled while running".to_string());
        }
        Transition::ManualRetry => {
            if !task.retries_remaining() {
                return Err(TaskschedError::RetryLimitExceeded {
                    task_id: task.id.clone(),
                    retry_count: task.retry_count,
                    retry_limit: task.retry_limit,
                });
            }
            task.error = None;
            task.failure_kind = None;
            task.completed_at = None;
            task.execution_time = None;
        }
    }

    task.status = to;
    debug!(task_id = %task.id, %from, %to, "applied lifecycle transition");

    Ok(ExecutionEvent::transition(task, from, now))
}

fn elapsed_since(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> std::time::Duration {
    start
        .and_then(|s| (now - s).to_std().ok())
        .unwrap_or_default()
}
