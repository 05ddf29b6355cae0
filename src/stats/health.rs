// src/stats/health.rs

//! Advisory health score. Never feeds back into scheduling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::AggregateStatistics;
use crate::types::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthGrade {
    /// Score >= 90.
    Good,
    /// 50 <= score < 90.
    Fair,
    /// Score < 50.
    Poor,
}

impl HealthGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthGrade::Good
        } else if score >= 50.0 {
            HealthGrade::Fair
        } else {
            HealthGrade::Poor
        }
    }
}

/// Knobs for [`score`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Penalty when every finished attempt failed.
    pub max_failure_penalty: f64,
    /// A RUNNING task older than this counts as long-running.
    pub long_running_after: Duration,
    pub long_running_penalty: f64,
    pub max_long_running_penalty: f64,
    /// QUEUED tasks tolerated before the backlog penalty starts.
    pub backlog_allowance: u64,
    pub backlog_penalty_per_task: f64,
    pub max_backlog_penalty: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_failure_penalty: 50.0,
            long_running_after: Duration::from_secs(30 * 60),
            long_running_penalty: 10.0,
            max_long_running_penalty: 20.0,
            backlog_allowance: 10,
            backlog_penalty_per_task: 2.0,
            max_backlog_penalty: 30.0,
        }
    }
}

/// Health score in `[0, 100]`.
pub fn score(stats: &AggregateStatistics, now: DateTime<Utc>, t: &HealthThresholds) -> f64 {
    let mut score = 100.0;

    let finished = stats.lifetime.completed + stats.lifetime.failed;
    if finished > 0 {
        score -= t.max_failure_penalty * stats.lifetime.failed as f64 / finished as f64;
    }

    let long_running = stats
        .running_since
        .values()
        .filter(|started| {
            (now - **started)
                .to_std()
                .is_ok_and(|elapsed| elapsed > t.long_running_after)
        })
        .count();
    score -= (long_running as f64 * t.long_running_penalty).min(t.max_long_running_penalty);

    let backlog = stats
        .count_of(TaskStatus::Queued)
        .saturating_sub(t.backlog_allowance);
    score -= (backlog as f64 * t.backlog_penalty_per_task).min(t.max_backlog_penalty);

    score.clamp(0.0, 100.0)
}
