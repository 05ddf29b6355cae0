// src/exec/backend.rs

//! Pluggable runner backend.
//!
//! The executor never spawns processes itself; it hands a task's
//! [`Runnable`] to a `RunnerBackend`. Production uses [`ShellBackend`].
//! Tests provide a scripted backend that records invocations instead of
//! spawning anything.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::task::Runnable;

/// What one invocation of a runnable produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn exited(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Text recorded as the task error for an unsuccessful run.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("process exited with status {code}"),
            None => "process terminated by signal".to_string(),
        }
    }
}

/// Trait abstracting how a runnable is invoked.
///
/// The returned future may be dropped before it completes (timeout or
/// cancellation); implementations must stop the invocation when that
/// happens.
pub trait RunnerBackend: Send + Sync {
    fn run<'a>(
        &'a self,
        task_id: &'a str,
        runnable: &'a Runnable,
    ) -> Pin<Box<dyn Future<Output = Result<RunOutput>> + Send + 'a>>;
}

/// Runs the command line through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct ShellBackend;

impl ShellBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RunnerBackend for ShellBackend {
    fn run<'a>(
        &'a self,
        task_id: &'a str,
        runnable: &'a Runnable,
    ) -> Pin<Box<dyn Future<Output = Result<RunOutput>> + Send + 'a>> {
        Box::pin(async move {
            info!(task_id, cmd = %runnable.command, "starting task process");

            let mut cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(&runnable.command);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(&runnable.command);
                c
            };

            if let Some(dir) = &runnable.working_dir {
                cmd.current_dir(dir);
            }
            cmd.envs(&runnable.env)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                // Dropping the future (timeout, cancel) must kill the child.
                .kill_on_drop(true);

            let child = cmd
                .spawn()
                .with_context(|| format!("spawning process for task '{task_id}'"))?;

            let output = child
                .wait_with_output()
                .await
                .with_context(|| format!("waiting for process of task '{task_id}'"))?;

            let run = RunOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };

            debug!(
                task_id,
                exit_code = ?run.exit_code,
                stdout_bytes = output.stdout.len(),
                stderr_bytes = output.stderr.len(),
                "task process exited"
            );
            Ok(run)
        })
    }
}
