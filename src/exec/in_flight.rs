// src/exec/in_flight.rs

//! Cancellation handle for the task currently being executed.

use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

use crate::task::TaskId;

/// At most one entry, since at most one task is RUNNING.
///
/// The executor registers a task with [`begin`](InFlight::begin) while the
/// store still holds its claim lock, so any caller that sees the task
/// RUNNING finds it registered here until [`finish`](InFlight::finish).
#[derive(Debug, Default)]
pub struct InFlight {
    current: Mutex<Option<(TaskId, oneshot::Sender<()>)>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as the in-flight task and return its cancel receiver.
    pub fn begin(&self, id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut current) = self.current.lock() {
            *current = Some((id.to_string(), tx));
        }
        rx
    }

    pub fn finish(&self, id: &str) {
        if let Ok(mut current) = self.current.lock() {
            if current.as_ref().is_some_and(|(cur, _)| cur == id) {
                *current = None;
            }
        }
    }

    /// Signal the invocation of `id` to stop. Best-effort: the task only
    /// reaches CANCELLED once the invocation returns.
    ///
    /// `false` when `id` is not the registered task, or its invocation has
    /// already returned.
    pub fn request_cancel(&self, id: &str) -> bool {
        let Ok(mut current) = self.current.lock() else {
            return false;
        };

        match current.take() {
            Some((cur, tx)) if cur == id => {
                debug!(task_id = id, "signalling in-flight invocation to stop");
                tx.send(()).is_ok()
            }
            other => {
                *current = other;
                debug!(task_id = id, "no in-flight invocation to signal");
                false
            }
        }
    }
}
