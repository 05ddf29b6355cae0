// src/exec/executor_loop.rs

//! The supervisor loop: claim, run, record, repeat.
//!
//! Exactly one loop runs per engine, so at most one task is ever RUNNING.
//! The loop never busy-polls: when nothing is eligible it sleeps on the
//! wake signal, the stop flag, or the earliest retry backoff.
//!
//! Store calls go through `spawn_blocking`: a commit does synchronous file
//! I/O under the store's write lock and must not stall a runtime worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::{oneshot, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, TaskschedError};
use crate::exec::backend::RunnerBackend;
use crate::exec::in_flight::InFlight;
use crate::exec::task_runner::{run_attempt, AttemptOutcome};
use crate::lifecycle::Transition;
use crate::store::TaskStore;
use crate::task::Task;
use crate::types::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Halt after the first task that ends FAILED.
    pub stop_on_error: bool,
    /// Exit once nothing is eligible and nothing is backing off.
    pub exit_when_idle: bool,
    /// Delay before a re-queued task may be selected again.
    pub retry_backoff: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            exit_when_idle: true,
            retry_backoff: Duration::from_secs(3),
        }
    }
}

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorExit {
    /// No eligible work left.
    Idle,
    /// The stop flag was raised.
    Stopped,
    /// A task ended FAILED with `stop_on_error` set.
    StoppedOnError,
}

/// Shared handles the loop runs against.
#[derive(Clone)]
pub struct ExecutorContext {
    pub store: Arc<TaskStore>,
    pub backend: Arc<dyn RunnerBackend>,
    pub in_flight: Arc<InFlight>,
    pub wake: Arc<Notify>,
    pub stop_rx: watch::Receiver<bool>,
    pub options: ExecutorOptions,
}

enum Step {
    Continue,
    Halt,
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TaskschedError::Executor(format!("store call panicked or was cancelled: {e}")))?
}

/// Run until idle, stopped, or halted on error.
///
/// Store errors end the loop with that error.
pub async fn run_executor_loop(mut ctx: ExecutorContext) -> Result<ExecutorExit> {
    info!(
        stop_on_error = ctx.options.stop_on_error,
        exit_when_idle = ctx.options.exit_when_idle,
        "executor loop started"
    );

    loop {
        if *ctx.stop_rx.borrow() {
            info!("executor loop stopped on request");
            return Ok(ExecutorExit::Stopped);
        }

        let claimed = {
            let store = Arc::clone(&ctx.store);
            let in_flight = Arc::clone(&ctx.in_flight);
            blocking(move || store.claim_next_with(|task| in_flight.begin(&task.id))).await?
        };

        if let Some((task, cancel_rx)) = claimed {
            if let Step::Halt = execute(&ctx, task, cancel_rx).await? {
                info!("executor loop halted after task failure (stop_on_error)");
                return Ok(ExecutorExit::StoppedOnError);
            }
            continue;
        }

        let store = Arc::clone(&ctx.store);
        let deadline = blocking(move || store.next_retry_at()).await?.map(|at| {
            let delay = (at - Utc::now()).to_std().unwrap_or_default();
            Instant::now() + delay
        });

        if deadline.is_none() && ctx.options.exit_when_idle {
            let store = Arc::clone(&ctx.store);
            let report = blocking(move || store.blocked_report()).await?;
            if !report.is_empty() {
                for b in &report.blocked {
                    warn!(task_id = %b.task_id, waiting_on = ?b.waiting_on, "task left blocked on dependencies");
                }
                for cycle in &report.cycles {
                    warn!(?cycle, "dependency cycle; tasks will never become eligible");
                }
            }
            info!("no eligible tasks; executor loop finished");
            return Ok(ExecutorExit::Idle);
        }

        if wait_for_work(&mut ctx, deadline).await {
            info!("executor loop stopped on request");
            return Ok(ExecutorExit::Stopped);
        }
    }
}

/// Sleep until woken, stopped, or `deadline`. Returns `true` on stop.
async fn wait_for_work(ctx: &mut ExecutorContext, deadline: Option<Instant>) -> bool {
    debug!(?deadline, "executor waiting for work");

    let sleep = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };

    let stop_changed = tokio::select! {
        _ = ctx.wake.notified() => None,
        _ = sleep => None,
        changed = ctx.stop_rx.changed() => Some(changed.is_err()),
    };

    match stop_changed {
        // A dropped sender counts as a stop request.
        Some(closed) => closed || *ctx.stop_rx.borrow(),
        None => false,
    }
}

/// Run one claimed task and write the outcome back.
async fn execute(ctx: &ExecutorContext, task: Task, cancel_rx: oneshot::Receiver<()>) -> Result<Step> {
    info!(
        task_id = %task.id,
        name = %task.name,
        priority = %task.priority,
        attempt = task.retry_count + 1,
        "task claimed"
    );

    let outcome = run_attempt(ctx.backend.as_ref(), &task, cancel_rx).await;
    let step = record_outcome(ctx, &task, outcome).await;
    ctx.in_flight.finish(&task.id);
    step
}

async fn record_outcome(ctx: &ExecutorContext, task: &Task, outcome: AttemptOutcome) -> Result<Step> {
    let store = Arc::clone(&ctx.store);
    let id = task.id.clone();

    match outcome {
        AttemptOutcome::Success { result } => {
            let done = blocking(move || store.transition(&id, Transition::Complete { result })).await?;
            info!(
                task_id = %done.id,
                execution_time = ?done.execution_time,
                "task completed"
            );
            Ok(Step::Continue)
        }
        AttemptOutcome::Cancelled => {
            blocking(move || store.transition(&id, Transition::Abort)).await?;
            info!(task_id = %task.id, "task cancelled while running");
            Ok(Step::Continue)
        }
        AttemptOutcome::Failed { error, kind } => {
            let backoff = TimeDelta::from_std(ctx.options.retry_backoff).unwrap_or_default();
            let not_before = Utc::now() + backoff;
            let failed =
                blocking(move || store.fail_attempt(&id, error, kind, Some(not_before))).await?;

            if failed.status == TaskStatus::Queued {
                warn!(
                    task_id = %task.id,
                    kind = %kind,
                    retry_count = failed.retry_count,
                    retry_limit = failed.retry_limit,
                    %not_before,
                    "task attempt failed; retry scheduled"
                );
                return Ok(Step::Continue);
            }

            error!(
                task_id = %task.id,
                kind = %kind,
                error = failed.error.as_deref().unwrap_or_default(),
                retry_count = failed.retry_count,
                "task failed"
            );
            if ctx.options.stop_on_error {
                Ok(Step::Halt)
            } else {
                Ok(Step::Continue)
            }
        }
    }
}
