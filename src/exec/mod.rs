// src/exec/mod.rs

//! Execution layer.
//!
//! - [`backend`] provides the `RunnerBackend` trait and the production
//!   `ShellBackend`; tests swap in a scripted fake.
//! - [`task_runner`] runs one attempt under its timeout and cancel channel.
//! - [`in_flight`] lets callers signal the task currently being executed.
//! - [`executor_loop`] owns the single supervisor loop.

pub mod backend;
pub mod executor_loop;
pub mod in_flight;
pub mod task_runner;

pub use backend::{RunOutput, RunnerBackend, ShellBackend};
pub use executor_loop::{run_executor_loop, ExecutorContext, ExecutorExit, ExecutorOptions};
pub use in_flight::InFlight;
pub use task_runner::{run_attempt, AttemptOutcome};
