// src/task/mod.rs

//! Task records and submission specs.
//!
//! - [`Task`] is the persisted record. Its `status` and lifecycle timestamps
//!   are only ever changed through [`crate::lifecycle`].
//! - [`TaskSpec`] is what a submitter hands to the store.
//! - [`id`] mints unique, ordered task ids.

pub mod id;

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FailureKind, Priority, TaskStatus, TaskType};

pub use id::IdGenerator;

/// Canonical task id type.
pub type TaskId = String;

/// The external unit of work a task triggers.
///
/// The scheduler treats this as opaque; the runner backend decides how to
/// execute it (a shell command line in production).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runnable {
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Runnable {
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }
}

/// Defaults applied to specs that leave `retry_limit` / `timeout` unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefaults {
    pub retry_limit: u32,
    pub timeout: Duration,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            timeout: Duration::from_secs(300),
        }
    }
}

/// A submission request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSpec {
    /// Caller-supplied id. Generated when `None`.
    pub id: Option<TaskId>,
    pub name: String,
    pub description: String,
    pub runnable: Option<Runnable>,
    pub priority: Priority,
    pub task_type: TaskType,
    pub dependencies: BTreeSet<TaskId>,
    pub retry_limit: Option<u32>,
    pub timeout: Option<Duration>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// A unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub runnable: Option<Runnable>,
    pub priority: Priority,
    pub status: TaskStatus,
    #[serde(default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    pub retry_limit: u32,
    #[serde(default)]
    pub retry_count: u32,
    pub timeout: Duration,

    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Earliest instant a re-queued task may be selected again.
    #[serde(default)]
    pub retry_after: Option<DateTime<Utc>>,

    pub execution_time: Option<Duration>,
    pub result: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub failure_kind: Option<FailureKind>,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Sort key that realises the store order:
/// priority descending, then creation time ascending, then id ascending.
pub type ScheduleKey<'a> = (Reverse<Priority>, DateTime<Utc>, &'a str);

impl Task {
    /// Build a freshly queued task from a spec.
    pub fn from_spec(spec: TaskSpec, id: TaskId, now: DateTime<Utc>, defaults: TaskDefaults) -> Self {
        Self {
            id,
            name: spec.name,
            description: spec.description,
            runnable: spec.runnable,
            priority: spec.priority,
            status: TaskStatus::Queued,
            task_type: spec.task_type,
            dependencies: spec.dependencies,
            retry_limit: spec.retry_limit.unwrap_or(defaults.retry_limit),
            retry_count: 0,
            timeout: spec.timeout.unwrap_or(defaults.timeout),
            created_at: now,
            queued_at: Some(now),
            started_at: None,
            completed_at: None,
            retry_after: None,
            execution_time: None,
            result: None,
            error: None,
            failure_kind: None,
            metadata: spec.metadata,
        }
    }

    pub fn schedule_key(&self) -> ScheduleKey<'_> {
        (Reverse(self.priority), self.created_at, self.id.as_str())
    }

    /// Marker tasks carry no runnable and complete as soon as they are claimed.
    pub fn is_marker(&self) -> bool {
        self.runnable.is_none()
    }

    pub fn retries_remaining(&self) -> bool {
        self.retry_count < self.retry_limit
    }
}

/// Read-only filter for listing tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub limit: Option<usize>,
}

impl ListFilter {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self.task_type.is_none_or(|t| task.task_type == t)
    }
}
