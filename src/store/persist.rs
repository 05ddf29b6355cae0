// src/store/persist.rs

//! Durable layout of the store.
//!
//! ```text
//! <dir>/store.json   { "tasks": [Task], "events": [ExecutionEvent], "stats": AggregateStatistics }
//! ```
//!
//! The whole state is one document replaced with a single atomic write, so
//! the tasks, the log and the statistics on disk always come from the same
//! commit.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::stats::AggregateStatistics;
use crate::store::event_log::EventLog;
use crate::store::StoreState;
use crate::task::Task;

pub const STORE_FILE: &str = "store.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub dir: PathBuf,
    pub document: PathBuf,
}

impl StorePaths {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            document: dir.join(STORE_FILE),
            dir,
        }
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    tasks: &'a [Task],
    events: &'a EventLog,
    stats: &'a AggregateStatistics,
}

#[derive(Deserialize)]
struct Document {
    tasks: Vec<Task>,
    #[serde(default)]
    events: EventLog,
    #[serde(default)]
    stats: Option<AggregateStatistics>,
}

/// Load the durable state, or an empty one if nothing was written yet.
///
/// An unreadable document is an error: the store cannot be trusted.
/// Missing statistics, or statistics that disagree with the task
/// collection, are rebuilt from the tasks and the log.
pub(crate) fn load(
    fs: &dyn FileSystem,
    paths: &StorePaths,
    event_log_limit: usize,
    now: DateTime<Utc>,
) -> Result<StoreState> {
    if !fs.exists(&paths.document) {
        debug!(path = ?paths.document, "no store document yet; starting empty");
        return Ok(StoreState::default());
    }

    let raw = fs.read_to_string(&paths.document)?;
    let Document {
        mut tasks,
        mut events,
        stats,
    } = serde_json::from_str(&raw)?;

    tasks.sort_by(|a, b| a.schedule_key().cmp(&b.schedule_key()));
    events.truncate(event_log_limit);

    let rebuilt = AggregateStatistics::rebuild(&tasks, events.iter(), now);
    let stats = match stats {
        Some(mut stored)
            if stored.total_tasks == rebuilt.total_tasks && stored.by_status == rebuilt.by_status =>
        {
            stored.refresh(now);
            stored
        }
        Some(_) => {
            warn!("stored statistics disagree with task collection; rebuilding");
            rebuilt
        }
        None => {
            warn!("stored statistics missing; rebuilding");
            rebuilt
        }
    };

    debug!(tasks = tasks.len(), events = events.len(), "loaded task store");

    Ok(StoreState {
        tasks,
        events,
        stats,
    })
}

/// Persist the full state with one atomic replace.
pub(crate) fn save(fs: &dyn FileSystem, paths: &StorePaths, state: &StoreState) -> Result<()> {
    let doc = serde_json::to_vec_pretty(&DocumentRef {
        tasks: &state.tasks,
        events: &state.events,
        stats: &state.stats,
    })?;
    fs.write_atomic(&paths.document, &doc)?;
    Ok(())
}
