// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{parse_duration, ConfigFile, RawConfigFile};
use crate::errors::{Result, TaskschedError};
use crate::exec::ExecutorOptions;
use crate::task::TaskDefaults;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskschedError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_store(&raw)?;
        let retry_backoff = duration_field("executor.retry_backoff", &raw.executor.retry_backoff)?;
        let timeout = duration_field("defaults.timeout", &raw.defaults.timeout)?;
        if timeout.is_zero() {
            return Err(TaskschedError::ConfigError(
                "[defaults].timeout must be greater than zero".to_string(),
            ));
        }

        Ok(ConfigFile::new_unchecked(
            raw.store.dir,
            raw.store.event_log_limit,
            ExecutorOptions {
                stop_on_error: raw.executor.stop_on_error,
                exit_when_idle: raw.executor.exit_when_idle,
                retry_backoff,
            },
            TaskDefaults {
                retry_limit: raw.defaults.retry_limit,
                timeout,
            },
        ))
    }
}

fn validate_store(cfg: &RawConfigFile) -> Result<()> {
    if cfg.store.event_log_limit == 0 {
        return Err(TaskschedError::ConfigError(
            "[store].event_log_limit must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.store.dir.as_os_str().is_empty() {
        return Err(TaskschedError::ConfigError(
            "[store].dir must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn duration_field(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| TaskschedError::ConfigError(format!("{name}: {e}")))
}
