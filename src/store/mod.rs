// src/store/mod.rs

//! Durable, ordered task collection.
//!
//! - [`TaskStore`] owns the tasks, the execution log and the statistics
//!   behind one `RwLock`.
//! - [`persist`] knows the on-disk layout.
//! - [`event_log`] is the bounded execution log.
//!
//! Every mutation runs on a copy of the state. The copy is persisted and only
//! then swapped in, so a failed write leaves memory and disk at the last
//! successful state.

pub mod event_log;
pub mod persist;

use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskschedError};
use crate::fs::mock::MockFileSystem;
use crate::fs::{FileSystem, RealFileSystem};
use crate::lifecycle::{self, ExecutionEvent, Transition};
use crate::scheduling::selector::{next_retry_at, next_runnable_position};
use crate::scheduling::{blocked_report, BlockedReport};
use crate::stats::AggregateStatistics;
use crate::task::id::{suffix_of, IdGenerator};
use crate::task::{ListFilter, Task, TaskDefaults, TaskId, TaskSpec};
use crate::types::{FailureKind, TaskStatus};

pub use event_log::EventLog;
pub use persist::StorePaths;

/// Everything the store persists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// Always in store order (see [`Task::schedule_key`]).
    pub tasks: Vec<Task>,
    pub events: EventLog,
    pub stats: AggregateStatistics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    pub dir: PathBuf,
    pub event_log_limit: usize,
    pub defaults: TaskDefaults,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".tasksched"),
            event_log_limit: 1000,
            defaults: TaskDefaults::default(),
        }
    }
}

#[derive(Debug)]
pub struct TaskStore {
    fs: Arc<dyn FileSystem>,
    paths: StorePaths,
    options: StoreOptions,
    ids: IdGenerator,
    state: RwLock<StoreState>,
}

impl TaskStore {
    /// Open (or create) the store under `options.dir`.
    pub fn open(fs: Arc<dyn FileSystem>, options: StoreOptions) -> Result<Self> {
        let paths = StorePaths::new(&options.dir);
        fs.create_dir_all(&paths.dir)?;

        let state = persist::load(fs.as_ref(), &paths, options.event_log_limit, Utc::now())?;
        let last_seq = state
            .tasks
            .iter()
            .filter_map(|t| suffix_of(&t.id))
            .max()
            .unwrap_or(0);

        info!(
            dir = ?paths.dir,
            tasks = state.tasks.len(),
            "opened task store"
        );

        Ok(Self {
            fs,
            paths,
            options,
            ids: IdGenerator::starting_after(last_seq),
            state: RwLock::new(state),
        })
    }

    /// Open a store backed by the real filesystem.
    pub fn open_dir(options: StoreOptions) -> Result<Self> {
        Self::open(Arc::new(RealFileSystem), options)
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Result<Self> {
        Self::open(Arc::new(MockFileSystem::new()), StoreOptions::default())
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| TaskschedError::Poisoned("task store".to_string()))
    }

    /// Run `f` against a copy of the state under the write lock.
    ///
    /// When `f` reports a change, the copy is persisted and swapped in.
    /// Nothing is kept if `f` or the write fails.
    fn commit<R>(&self, f: impl FnOnce(&mut StoreState) -> Result<(R, bool)>) -> Result<R> {
        self.commit_then(f, |_| ()).map(|(out, ())| out)
    }

    /// [`commit`](Self::commit), running `after` once the copy is durable
    /// and before it is swapped in. Readers cannot observe the new state
    /// before `after` returns.
    fn commit_then<R, H>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<(R, bool)>,
        after: impl FnOnce(&R) -> H,
    ) -> Result<(R, H)> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| TaskschedError::Poisoned("task store".to_string()))?;

        let mut next = guard.clone();
        let (out, changed) = f(&mut next)?;
        if changed {
            persist::save(self.fs.as_ref(), &self.paths, &next)?;
        }
        let hooked = after(&out);
        if changed {
            *guard = next;
        }
        Ok((out, hooked))
    }

    fn apply_at(
        &self,
        state: &mut StoreState,
        pos: usize,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let event = lifecycle::apply(&mut state.tasks[pos], transition, now)?;
        self.record(state, pos, event, now);
        Ok(())
    }

    fn position(state: &StoreState, id: &str) -> Result<usize> {
        state
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TaskschedError::NotFound(id.to_string()))
    }

    fn record(&self, state: &mut StoreState, pos: usize, event: ExecutionEvent, now: DateTime<Utc>) {
        state.stats.record_transition(&state.tasks[pos], &event, now);
        state.events.push(event, self.options.event_log_limit);
    }

    /// Insert a new QUEUED task and return its id.
    pub fn add(&self, spec: TaskSpec) -> Result<TaskId> {
        let now = Utc::now();
        let defaults = self.options.defaults;

        self.commit(|state| {
            let id = match spec.id.clone() {
                Some(id) => {
                    if state.tasks.iter().any(|t| t.id == id) {
                        return Err(TaskschedError::DuplicateId(id));
                    }
                    id
                }
                None => loop {
                    let id = self.ids.next_id(now);
                    if !state.tasks.iter().any(|t| t.id == id) {
                        break id;
                    }
                },
            };

            let task = Task::from_spec(spec, id.clone(), now, defaults);
            let pos = state
                .tasks
                .partition_point(|t| t.schedule_key() < task.schedule_key());

            let event = ExecutionEvent::submitted(&task);
            state.stats.record_added(&task, now);
            state.events.push(event, self.options.event_log_limit);
            state.tasks.insert(pos, task);

            info!(task_id = %id, position = pos, "task submitted");
            Ok((id, true))
        })
    }

    pub fn get(&self, id: &str) -> Result<Task> {
        self.read()?
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| TaskschedError::NotFound(id.to_string()))
    }

    /// Tasks matching `filter`, in store order.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Task>> {
        let state = self.read()?;
        let matching = state.tasks.iter().filter(|t| filter.matches(t)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    /// A copy of the whole ordered collection.
    pub fn snapshot(&self) -> Result<Vec<Task>> {
        Ok(self.read()?.tasks.clone())
    }

    /// Apply one lifecycle transition and return the updated task.
    pub fn transition(&self, id: &str, transition: Transition) -> Result<Task> {
        let now = Utc::now();
        self.commit(|state| {
            let pos = Self::position(state, id)?;
            self.apply_at(state, pos, transition, now)?;
            Ok((state.tasks[pos].clone(), true))
        })
    }

    /// Record a failed attempt of the RUNNING task `id`.
    ///
    /// With retries left the task is re-queued, selectable again from
    /// `not_before`, in the same commit; otherwise it ends FAILED.
    pub fn fail_attempt(
        &self,
        id: &str,
        error: String,
        kind: FailureKind,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        let now = Utc::now();
        self.commit(|state| {
            let pos = Self::position(state, id)?;
            self.apply_at(state, pos, Transition::Fail { error, kind }, now)?;
            if state.tasks[pos].status == TaskStatus::Retrying {
                self.apply_at(state, pos, Transition::Requeue { not_before }, now)?;
            }
            Ok((state.tasks[pos].clone(), true))
        })
    }

    /// Put the FAILED task `id` straight back in the queue.
    pub fn retry_failed(&self, id: &str) -> Result<Task> {
        let now = Utc::now();
        self.commit(|state| {
            let pos = Self::position(state, id)?;
            self.apply_at(state, pos, Transition::ManualRetry, now)?;
            self.apply_at(state, pos, Transition::Requeue { not_before: None }, now)?;
            Ok((state.tasks[pos].clone(), true))
        })
    }

    /// Like [`transition`](Self::transition), but `false` for an unknown id.
    pub fn update(&self, id: &str, transition: Transition) -> Result<bool> {
        match self.transition(id, transition) {
            Ok(_) => Ok(true),
            Err(TaskschedError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Select the next eligible task and move it to RUNNING in one step.
    ///
    /// No other mutation can slip between selection and claim.
    pub fn claim_next(&self) -> Result<Option<Task>> {
        Ok(self.claim_next_with(|_| ())?.map(|(task, ())| task))
    }

    /// [`claim_next`](Self::claim_next), calling `on_claim` with the claimed
    /// task before any reader can see it RUNNING.
    pub fn claim_next_with<H>(&self, on_claim: impl FnOnce(&Task) -> H) -> Result<Option<(Task, H)>> {
        let now = Utc::now();
        let (claimed, hooked) = self.commit_then(
            |state| {
                let Some(pos) = next_runnable_position(&state.tasks, now) else {
                    return Ok((None, false));
                };
                self.apply_at(state, pos, Transition::Claim, now)?;
                Ok((Some(state.tasks[pos].clone()), true))
            },
            |claimed: &Option<Task>| claimed.as_ref().map(on_claim),
        )?;
        Ok(claimed.zip(hooked))
    }

    /// Fail every task left RUNNING by a previous process, re-queueing the
    /// ones with retries left, and re-queue any task left RETRYING. Returns
    /// the affected ids.
    pub fn recover_interrupted(&self) -> Result<Vec<TaskId>> {
        let now = Utc::now();
        self.commit(|state| {
            let mut recovered = Vec::new();
            for pos in 0..state.tasks.len() {
                match state.tasks[pos].status {
                    TaskStatus::Running => {
                        let fail = Transition::Fail {
                            error: "interrupted: scheduler stopped while the task was running"
                                .to_string(),
                            kind: FailureKind::Interrupted,
                        };
                        self.apply_at(state, pos, fail, now)?;
                    }
                    TaskStatus::Retrying => {}
                    _ => continue,
                }

                if state.tasks[pos].status == TaskStatus::Retrying {
                    self.apply_at(state, pos, Transition::Requeue { not_before: None }, now)?;
                }

                warn!(
                    task_id = %state.tasks[pos].id,
                    status = %state.tasks[pos].status,
                    "recovered task interrupted by previous run"
                );
                recovered.push(state.tasks[pos].id.clone());
            }
            let changed = !recovered.is_empty();
            Ok((recovered, changed))
        })
    }

    /// Remove terminal tasks that finished before `now - older_than`.
    pub fn prune(&self, older_than: Duration) -> Result<usize> {
        let now = Utc::now();
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return Ok(0);
        };

        self.commit(|state| {
            let (expired, kept): (Vec<Task>, Vec<Task>) =
                std::mem::take(&mut state.tasks).into_iter().partition(|t| {
                    t.status.is_terminal() && t.completed_at.is_some_and(|at| at < cutoff)
                });
            state.tasks = kept;

            for task in &expired {
                state.stats.record_removed(task, now);
            }

            debug!(removed = expired.len(), %cutoff, "pruned finished tasks");
            Ok((expired.len(), !expired.is_empty()))
        })
    }

    /// The most recent `limit` execution events, oldest first.
    pub fn events(&self, limit: usize) -> Result<Vec<ExecutionEvent>> {
        Ok(self.read()?.events.recent(limit))
    }

    pub fn events_for(&self, id: &str) -> Result<Vec<ExecutionEvent>> {
        Ok(self
            .read()?
            .events
            .iter()
            .filter(|e| e.task_id == id)
            .cloned()
            .collect())
    }

    /// Statistics with the derived fields recomputed as of now.
    pub fn statistics(&self) -> Result<AggregateStatistics> {
        let mut stats = self.read()?.stats.clone();
        stats.refresh(Utc::now());
        Ok(stats)
    }

    /// When the earliest backing-off task becomes selectable again.
    pub fn next_retry_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(next_retry_at(&self.read()?.tasks, Utc::now()))
    }

    pub fn blocked_report(&self) -> Result<BlockedReport> {
        Ok(blocked_report(&self.read()?.tasks))
    }
}
