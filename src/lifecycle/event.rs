// src/lifecycle/event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId};
use crate::types::{FailureKind, TaskStatus};

/// One entry of the append-only execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub task_id: TaskId,
    /// `None` for the submission event.
    pub from: Option<TaskStatus>,
    pub to: TaskStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

impl ExecutionEvent {
    pub fn submitted(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            from: None,
            to: task.status,
            timestamp: task.created_at,
            result: None,
            error: None,
            failure_kind: None,
        }
    }

    pub(crate) fn transition(task: &Task, from: TaskStatus, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id.clone(),
            from: Some(from),
            to: task.status,
            timestamp: now,
            result: task.result.clone(),
            error: task.error.clone(),
            failure_kind: task.failure_kind,
        }
    }
}
