// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::ExecutorOptions;
use crate::store::StoreOptions;
use crate::task::TaskDefaults;

/// Configuration as read from `Tasksched.toml`, before validation.
///
/// ```toml
/// [store]
/// dir = ".tasksched"
/// event_log_limit = 1000
///
/// [executor]
/// stop_on_error = false
/// exit_when_idle = true
/// retry_backoff = "3s"
///
/// [defaults]
/// timeout = "5m"
/// retry_limit = 3
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub executor: ExecutorSection,

    #[serde(default)]
    pub defaults: DefaultsSection,
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Directory holding the `store.json` document.
    /// Relative paths are resolved against the config file's directory.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,

    /// Maximum number of execution events kept.
    #[serde(default = "default_event_log_limit")]
    pub event_log_limit: usize,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".tasksched")
}

fn default_event_log_limit() -> usize {
    1000
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            event_log_limit: default_event_log_limit(),
        }
    }
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    #[serde(default)]
    pub stop_on_error: bool,

    #[serde(default = "default_true")]
    pub exit_when_idle: bool,

    /// Duration string, e.g. `"3s"` or `"500ms"`.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: String,
}

fn default_true() -> bool {
    true
}

fn default_retry_backoff() -> String {
    "3s".to_string()
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            exit_when_idle: true,
            retry_backoff: default_retry_backoff(),
        }
    }
}

/// `[defaults]` section, applied to submissions that leave the field unset.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_timeout")]
    pub timeout: String,

    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

fn default_timeout() -> String {
    "5m".to_string()
}

fn default_retry_limit() -> u32 {
    3
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retry_limit: default_retry_limit(),
        }
    }
}

/// Validated configuration. Only constructed through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub store_dir: PathBuf,
    pub event_log_limit: usize,
    pub executor: ExecutorOptions,
    pub defaults: TaskDefaults,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        store_dir: PathBuf,
        event_log_limit: usize,
        executor: ExecutorOptions,
        defaults: TaskDefaults,
    ) -> Self {
        Self {
            store_dir,
            event_log_limit,
            executor,
            defaults,
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            dir: self.store_dir.clone(),
            event_log_limit: self.event_log_limit,
            defaults: self.defaults,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let store = StoreOptions::default();
        Self::new_unchecked(
            store.dir,
            store.event_log_limit,
            ExecutorOptions::default(),
            store.defaults,
        )
    }
}

/// Parse a duration string like `"500ms"`, `"3s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let secs = |mult: u64| {
        value
            .checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => secs(1),
        "m" => secs(60),
        "h" => secs(60 * 60),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
