// src/exec/task_runner.rs

//! One attempt of one task.

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::errors::TaskschedError;
use crate::exec::backend::RunnerBackend;
use crate::task::Task;
use crate::types::FailureKind;

/// How an attempt ended, before it is written back to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { result: Option<String> },
    Failed { error: String, kind: FailureKind },
    /// A cancellation request interrupted the invocation.
    Cancelled,
}

/// Invoke `task`'s runnable under its timeout and `cancel_rx`.
///
/// Marker tasks succeed without touching the backend. Backend errors become
/// failure data; this function itself never fails.
pub async fn run_attempt(
    backend: &dyn RunnerBackend,
    task: &Task,
    cancel_rx: oneshot::Receiver<()>,
) -> AttemptOutcome {
    let Some(runnable) = &task.runnable else {
        info!(task_id = %task.id, "marker task; completing without invocation");
        return AttemptOutcome::Success { result: None };
    };

    // A dropped sender is not a cancellation request.
    let cancelled = async move {
        if cancel_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        res = tokio::time::timeout(task.timeout, backend.run(&task.id, runnable)) => {
            match res {
                Ok(Ok(output)) if output.success() => {
                    let stdout = output.stdout.trim_end();
                    AttemptOutcome::Success {
                        result: (!stdout.is_empty()).then(|| stdout.to_string()),
                    }
                }
                Ok(Ok(output)) => AttemptOutcome::Failed {
                    error: output.failure_message(),
                    kind: FailureKind::Exit,
                },
                Ok(Err(e)) => {
                    warn!(task_id = %task.id, error = %e, "task invocation error");
                    AttemptOutcome::Failed {
                        error: format!("{e:#}"),
                        kind: FailureKind::Error,
                    }
                }
                Err(_) => {
                    let err = TaskschedError::Timeout {
                        task_id: task.id.clone(),
                        timeout: task.timeout,
                    };
                    warn!(task_id = %task.id, timeout = ?task.timeout, "task timed out; invocation killed");
                    AttemptOutcome::Failed {
                        error: err.to_string(),
                        kind: FailureKind::Timeout,
                    }
                }
            }
        }

        _ = cancelled => {
            info!(task_id = %task.id, "cancellation requested for running task; invocation stopped");
            AttemptOutcome::Cancelled
        }
    }
}
