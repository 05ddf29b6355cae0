// src/engine/mod.rs

//! Caller-facing facade.
//!
//! [`TaskEngine`] ties the store to a single supervised executor loop:
//! submitters and the loop share the store, and the loop is woken through a
//! `Notify` whenever new work may have become eligible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{Result, TaskschedError};
use crate::exec::{
    run_executor_loop, ExecutorContext, ExecutorExit, ExecutorOptions, InFlight, RunnerBackend,
};
use crate::lifecycle::{ExecutionEvent, Transition};
use crate::scheduling::BlockedReport;
use crate::stats::AggregateStatistics;
use crate::store::TaskStore;
use crate::task::{ListFilter, Task, TaskId, TaskSpec};
use crate::types::TaskStatus;

type LoopHandle = JoinHandle<Result<ExecutorExit>>;

/// Clears the running flag when the loop task ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct TaskEngine {
    store: Arc<TaskStore>,
    backend: Arc<dyn RunnerBackend>,
    options: ExecutorOptions,
    in_flight: Arc<InFlight>,
    wake: Arc<Notify>,
    running: Arc<AtomicBool>,
    /// Stop flag of the most recently started loop.
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<LoopHandle>>,
}

impl TaskEngine {
    pub fn new(
        store: Arc<TaskStore>,
        backend: Arc<dyn RunnerBackend>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            store,
            backend,
            options,
            in_flight: Arc::new(InFlight::new()),
            wake: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Open the on-disk store described by `config` and recover tasks left
    /// RUNNING by a previous process.
    pub fn open(config: &ConfigFile, backend: Arc<dyn RunnerBackend>) -> Result<Self> {
        let store = Arc::new(TaskStore::open_dir(config.store_options())?);
        let engine = Self::new(store, backend, config.executor);
        engine.recover()?;
        Ok(engine)
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Fail tasks interrupted by a previous process, re-queueing the ones
    /// with retries left. Must not run while the executor is active.
    pub fn recover(&self) -> Result<Vec<TaskId>> {
        if self.is_running() {
            return Err(TaskschedError::ExecutorAlreadyRunning);
        }
        let recovered = self.store.recover_interrupted()?;
        if !recovered.is_empty() {
            info!(count = recovered.len(), "recovered interrupted tasks");
        }
        Ok(recovered)
    }

    pub fn submit(&self, spec: TaskSpec) -> Result<TaskId> {
        let id = self.store.add(spec)?;
        self.wake.notify_one();
        Ok(id)
    }

    /// Cancel `id`.
    ///
    /// A QUEUED task is cancelled immediately. For the RUNNING task the
    /// in-flight invocation is signalled and the task reaches CANCELLED once
    /// it returns. Unknown ids, tasks in any other state, and RUNNING tasks
    /// with no live invocation in this process yield `false`.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        match self.store.transition(id, Transition::Cancel) {
            Ok(_) => {
                info!(task_id = id, "task cancelled");
                Ok(true)
            }
            Err(TaskschedError::NotFound(_)) => Ok(false),
            Err(TaskschedError::InvalidTransition {
                from: TaskStatus::Running,
                ..
            }) => Ok(self.in_flight.request_cancel(id)),
            Err(TaskschedError::InvalidTransition { from, .. }) => {
                debug!(task_id = id, status = %from, "cancel ignored");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Put a FAILED task back in the queue.
    ///
    /// `false` for unknown ids and tasks that are not FAILED;
    /// `RetryLimitExceeded` when the task has no retries left.
    pub fn retry(&self, id: &str) -> Result<bool> {
        match self.store.retry_failed(id) {
            Ok(_) => {}
            Err(TaskschedError::NotFound(_)) => return Ok(false),
            Err(TaskschedError::InvalidTransition { from, .. }) => {
                debug!(task_id = id, status = %from, "retry ignored");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        info!(task_id = id, "task re-queued on request");
        self.wake.notify_one();
        Ok(true)
    }

    pub fn status(&self, id: &str) -> Result<Task> {
        self.store.get(id)
    }

    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Task>> {
        self.store.list(filter)
    }

    pub fn prune(&self, older_than: Duration) -> Result<usize> {
        self.store.prune(older_than)
    }

    pub fn statistics(&self) -> Result<AggregateStatistics> {
        self.store.statistics()
    }

    pub fn events(&self, limit: usize) -> Result<Vec<ExecutionEvent>> {
        self.store.events(limit)
    }

    pub fn blocked_report(&self) -> Result<BlockedReport> {
        self.store.blocked_report()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
        m.lock()
            .map_err(|_| TaskschedError::Poisoned(format!("executor {what}")))
    }

    /// Spawn the executor loop. Must be called within a tokio runtime.
    ///
    /// A second call while a loop is active fails with
    /// `ExecutorAlreadyRunning` and leaves that loop untouched.
    pub fn start_executor(&self, stop_on_error: bool) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("executor start requested while already running");
            return Err(TaskschedError::ExecutorAlreadyRunning);
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        let mut stop_slot = Self::lock(&self.stop_tx, "stop flag")?;
        let mut handle_slot = Self::lock(&self.handle, "handle")?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let ctx = ExecutorContext {
            store: Arc::clone(&self.store),
            backend: Arc::clone(&self.backend),
            in_flight: Arc::clone(&self.in_flight),
            wake: Arc::clone(&self.wake),
            stop_rx,
            options: ExecutorOptions {
                stop_on_error,
                ..self.options
            },
        };

        let handle = tokio::spawn(async move {
            let _guard = guard;
            run_executor_loop(ctx).await
        });

        *stop_slot = Some(stop_tx);
        *handle_slot = Some(handle);
        Ok(())
    }

    /// Ask the loop to stop after the in-flight task, if any.
    ///
    /// With `wait`, waits up to that long for the loop to end. Returns
    /// whether the loop has ended. A loop that ended with a store error
    /// surfaces that error here.
    pub async fn stop_executor(&self, wait: Option<Duration>) -> Result<bool> {
        if let Some(stop_tx) = Self::lock(&self.stop_tx, "stop flag")?.as_ref() {
            let _ = stop_tx.send(true);
        }

        let Some(wait) = wait else {
            return Ok(!self.is_running());
        };
        let handle = Self::lock(&self.handle, "handle")?.take();
        let Some(mut handle) = handle else {
            return Ok(!self.is_running());
        };

        match tokio::time::timeout(wait, &mut handle).await {
            Ok(joined) => {
                let exit = joined.map_err(|e| TaskschedError::Executor(e.to_string()))??;
                info!(?exit, "executor loop stopped");
                Ok(true)
            }
            Err(_) => {
                warn!(?wait, "executor loop still busy after stop request");
                *Self::lock(&self.handle, "handle")? = Some(handle);
                Ok(false)
            }
        }
    }

    /// Wait for the loop to end on its own (or after `stop_executor`).
    ///
    /// `None` when no loop was started, or it was already joined.
    pub async fn join_executor(&self) -> Result<Option<ExecutorExit>> {
        let handle = Self::lock(&self.handle, "handle")?.take();
        let Some(handle) = handle else {
            return Ok(None);
        };
        let exit = handle
            .await
            .map_err(|e| TaskschedError::Executor(e.to_string()))??;
        debug!(?exit, "executor loop joined");
        Ok(Some(exit))
    }
}
