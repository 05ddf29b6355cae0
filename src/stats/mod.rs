// src/stats/mod.rs

//! Aggregate statistics.
//!
//! Counters are updated incrementally inside the same store commit as the
//! transition that caused them. They are never authoritative: [`rebuild`]
//! reconstructs them from the task collection and the execution log.
//!
//! [`rebuild`]: AggregateStatistics::rebuild

pub mod health;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::ExecutionEvent;
use crate::task::{Task, TaskId};
use crate::types::{FailureKind, Priority, TaskStatus, TaskType};

pub use health::{HealthGrade, HealthThresholds};

/// Counters that only ever grow. Survive pruning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifetimeCounters {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub pruned: u64,
    pub total_execution_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatistics {
    /// Tasks currently held by the store.
    pub total_tasks: u64,
    pub by_status: BTreeMap<TaskStatus, u64>,
    pub by_priority: BTreeMap<Priority, u64>,
    pub by_type: BTreeMap<TaskType, u64>,
    pub lifetime: LifetimeCounters,
    /// Start of the current attempt for every RUNNING task.
    #[serde(default)]
    pub running_since: BTreeMap<TaskId, DateTime<Utc>>,
    /// Percentage of stored tasks that are COMPLETED.
    pub completion_rate: f64,
    pub health_score: f64,
    pub health_grade: HealthGrade,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for AggregateStatistics {
    fn default() -> Self {
        Self {
            total_tasks: 0,
            by_status: BTreeMap::new(),
            by_priority: BTreeMap::new(),
            by_type: BTreeMap::new(),
            lifetime: LifetimeCounters::default(),
            running_since: BTreeMap::new(),
            completion_rate: 0.0,
            health_score: 100.0,
            health_grade: HealthGrade::Good,
            updated_at: None,
        }
    }
}

impl AggregateStatistics {
    pub fn count_of(&self, status: TaskStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// A task entered the store.
    pub fn record_added(&mut self, task: &Task, now: DateTime<Utc>) {
        self.total_tasks += 1;
        bump(&mut self.by_status, task.status);
        bump(&mut self.by_priority, task.priority);
        bump(&mut self.by_type, task.task_type);
        self.lifetime.submitted += 1;
        self.refresh(now);
    }

    /// `task` (already updated) went through the transition in `event`.
    pub fn record_transition(&mut self, task: &Task, event: &ExecutionEvent, now: DateTime<Utc>) {
        if let Some(from) = event.from {
            drop_one(&mut self.by_status, from);
        }
        bump(&mut self.by_status, event.to);

        match event.to {
            TaskStatus::Running => {
                if let Some(started) = task.started_at {
                    self.running_since.insert(task.id.clone(), started);
                }
            }
            _ => {
                self.running_since.remove(&task.id);
            }
        }

        self.count_lifetime(event);
        if event.to.is_terminal() {
            if let Some(elapsed) = task.execution_time {
                self.lifetime.total_execution_time += elapsed;
            }
        }

        self.refresh(now);
    }

    /// A task left the store (pruning).
    pub fn record_removed(&mut self, task: &Task, now: DateTime<Utc>) {
        self.total_tasks = self.total_tasks.saturating_sub(1);
        drop_one(&mut self.by_status, task.status);
        drop_one(&mut self.by_priority, task.priority);
        drop_one(&mut self.by_type, task.task_type);
        self.running_since.remove(&task.id);
        self.lifetime.pruned += 1;
        self.refresh(now);
    }

    /// Reconstruct statistics from the task collection and execution log.
    ///
    /// Lifetime counters can only be recovered as far back as the log
    /// reaches; pruned tasks whose events were truncated are not counted.
    pub fn rebuild<'a>(
        tasks: &[Task],
        events: impl IntoIterator<Item = &'a ExecutionEvent>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self::default();

        for task in tasks {
            stats.total_tasks += 1;
            bump(&mut stats.by_status, task.status);
            bump(&mut stats.by_priority, task.priority);
            bump(&mut stats.by_type, task.task_type);
            if task.status == TaskStatus::Running {
                if let Some(started) = task.started_at {
                    stats.running_since.insert(task.id.clone(), started);
                }
            }
            if task.status.is_terminal() {
                if let Some(elapsed) = task.execution_time {
                    stats.lifetime.total_execution_time += elapsed;
                }
            }
        }

        for event in events {
            if event.from.is_none() {
                stats.lifetime.submitted += 1;
            } else {
                stats.count_lifetime(event);
            }
        }
        stats.lifetime.submitted = stats.lifetime.submitted.max(stats.total_tasks);

        stats.refresh(now);
        stats
    }

    /// Recompute the derived fields as of `now`.
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        self.completion_rate = if self.total_tasks == 0 {
            0.0
        } else {
            self.count_of(TaskStatus::Completed) as f64 * 100.0 / self.total_tasks as f64
        };
        self.health_score = health::score(self, now, &HealthThresholds::default());
        self.health_grade = HealthGrade::from_score(self.health_score);
        self.updated_at = Some(now);
    }

    fn count_lifetime(&mut self, event: &ExecutionEvent) {
        match event.to {
            TaskStatus::Completed => self.lifetime.completed += 1,
            TaskStatus::Failed => self.lifetime.failed += 1,
            TaskStatus::Cancelled => self.lifetime.cancelled += 1,
            TaskStatus::Retrying if event.from == Some(TaskStatus::Running) => {
                self.lifetime.retries += 1
            }
            _ => {}
        }
        if event.from == Some(TaskStatus::Running)
            && event.failure_kind == Some(FailureKind::Timeout)
        {
            self.lifetime.timeouts += 1;
        }
    }
}

fn bump<K: Ord>(map: &mut BTreeMap<K, u64>, key: K) {
    *map.entry(key).or_insert(0) += 1;
}

fn drop_one<K: Ord>(map: &mut BTreeMap<K, u64>, key: K) {
    if let Some(n) = map.get_mut(&key) {
        *n = n.saturating_sub(1);
        if *n == 0 {
            map.remove(&key);
        }
    }
}
