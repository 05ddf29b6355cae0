use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tasksched::exec::{RunOutput, RunnerBackend};
use tasksched::task::Runnable;

/// What one scripted invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Exit 0 with this stdout.
    Succeed(String),
    /// Exit non-zero with this stderr.
    Exit { code: i32, stderr: String },
    /// The backend itself errors (spawn failure and the like).
    Error(String),
    /// Sleep, then exit 0 with empty stdout.
    Sleep(Duration),
    /// Never return.
    Hang,
}

impl Step {
    pub fn fail(stderr: &str) -> Self {
        Step::Exit {
            code: 1,
            stderr: stderr.to_string(),
        }
    }
}

#[derive(Default)]
struct Script {
    /// Consumed first, in order.
    queued: HashMap<String, VecDeque<Step>>,
    /// Used once the queue for a command is empty.
    fallback: HashMap<String, Step>,
}

/// A fake runner backend that:
/// - plays scripted behaviour per command line (default: succeed, echoing
///   the command)
/// - records every invocation in order
/// - tracks the highest number of overlapping invocations
#[derive(Clone, Default)]
pub struct FakeBackend {
    script: Arc<Mutex<Script>>,
    invocations: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

/// Decrements the active counter even when the invocation is dropped.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every invocation of `command` behaves like `step` (after any queued
    /// steps are used up).
    pub fn always(self, command: &str, step: Step) -> Self {
        self.script
            .lock()
            .unwrap()
            .fallback
            .insert(command.to_string(), step);
        self
    }

    /// The next invocations of `command` play `steps` in order.
    pub fn then(self, command: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(command.to_string())
            .or_default()
            .extend(steps);
        self
    }

    /// Commands invoked so far, in order.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self, command: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    /// Highest number of invocations that were in progress at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_step(&self, command: &str) -> Step {
        let mut script = self.script.lock().unwrap();
        if let Some(step) = script.queued.get_mut(command).and_then(VecDeque::pop_front) {
            return step;
        }
        script
            .fallback
            .get(command)
            .cloned()
            .unwrap_or_else(|| Step::Succeed(command.to_string()))
    }
}

impl RunnerBackend for FakeBackend {
    fn run<'a>(
        &'a self,
        _task_id: &'a str,
        runnable: &'a Runnable,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RunOutput>> + Send + 'a>> {
        Box::pin(async move {
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = ActiveGuard(Arc::clone(&self.active));
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            self.invocations
                .lock()
                .unwrap()
                .push(runnable.command.clone());

            match self.next_step(&runnable.command) {
                Step::Succeed(stdout) => Ok(RunOutput::ok(stdout)),
                Step::Exit { code, stderr } => Ok(RunOutput::exited(code, stderr)),
                Step::Error(message) => Err(anyhow::anyhow!(message)),
                Step::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(RunOutput::ok(""))
                }
                Step::Hang => {
                    std::future::pending::<()>().await;
                    Ok(RunOutput::ok(""))
                }
            }
        })
    }
}
