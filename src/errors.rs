// src/errors.rs

//! Crate-wide error type and aliases.

use std::time::Duration;

use thiserror::Error;

use crate::types::TaskStatus;

#[derive(Error, Debug)]
pub enum TaskschedError {
    #[error("Duplicate task id: {0}")]
    DuplicateId(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("TimeoutError: task {task_id} exceeded its timeout of {timeout:?}")]
    Timeout { task_id: String, timeout: Duration },

    #[error("Retry limit exceeded for task {task_id} ({retry_count}/{retry_limit})")]
    RetryLimitExceeded {
        task_id: String,
        retry_count: u32,
        retry_limit: u32,
    },

    #[error("Executor is already running")]
    ExecutorAlreadyRunning,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task store lock poisoned: {0}")]
    Poisoned(String),

    #[error("Executor loop failed: {0}")]
    Executor(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskschedError>;
