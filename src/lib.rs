// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod lifecycle;
pub mod logging;
pub mod scheduling;
pub mod stats;
pub mod store;
pub mod task;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_or_default;
use crate::config::model::ConfigFile;
use crate::exec::{ExecutorExit, ShellBackend};
use crate::store::TaskStore;
use crate::task::ListFilter;

pub use crate::engine::TaskEngine;
pub use crate::errors::TaskschedError;
pub use crate::task::{Runnable, Task, TaskSpec};
pub use crate::types::{Priority, TaskStatus, TaskType};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the on-disk store (with recovery of interrupted tasks)
/// - the executor loop over the shell backend
/// - Ctrl-C handling (stop after the in-flight task)
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_or_default(&config_path)?;
    if args.stay_alive {
        cfg.executor.exit_when_idle = false;
    }
    debug!(?cfg, "loaded configuration");

    let store = Arc::new(TaskStore::open_dir(cfg.store_options())?);
    let engine = Arc::new(TaskEngine::new(
        store,
        Arc::new(ShellBackend::new()),
        cfg.executor,
    ));

    if args.dry_run {
        print_dry_run(&cfg, &engine)?;
        return Ok(());
    }

    engine.recover()?;

    let stop_on_error = args.stop_on_error || cfg.executor.stop_on_error;
    engine.start_executor(stop_on_error)?;

    // Ctrl-C → stop after the in-flight task.
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; stopping after the current task");
            if let Err(e) = engine.stop_executor(None).await {
                warn!(error = %e, "failed to signal executor stop");
            }
        });
    }

    let exit = engine.join_executor().await?;
    let stats = engine.statistics()?;
    info!(
        ?exit,
        total = stats.total_tasks,
        completed = stats.lifetime.completed,
        failed = stats.lifetime.failed,
        cancelled = stats.lifetime.cancelled,
        health = stats.health_score,
        "executor finished"
    );

    if exit == Some(ExecutorExit::StoppedOnError) {
        bail!("stopped after a task failed (stop_on_error)");
    }
    Ok(())
}

/// Dry-run output: print the store, execution order and blocked tasks.
fn print_dry_run(cfg: &ConfigFile, engine: &TaskEngine) -> Result<()> {
    println!("tasksched dry-run");
    println!("  store.dir = {}", cfg.store_dir.display());
    println!("  store.event_log_limit = {}", cfg.event_log_limit);
    println!("  executor.stop_on_error = {}", cfg.executor.stop_on_error);
    println!("  executor.retry_backoff = {:?}", cfg.executor.retry_backoff);
    println!(
        "  defaults = retry_limit {}, timeout {:?}",
        cfg.defaults.retry_limit, cfg.defaults.timeout
    );
    println!();

    let queued = engine.list(&ListFilter::status(TaskStatus::Queued))?;
    println!("queued tasks in store order ({}):", queued.len());
    for task in &queued {
        println!("  - {} [{}] {}", task.id, task.priority, task.name);
        match &task.runnable {
            Some(r) => println!("      cmd: {}", r.command),
            None => println!("      marker (no command)"),
        }
        if !task.dependencies.is_empty() {
            println!("      after: {:?}", task.dependencies);
        }
        if let Some(at) = task.retry_after {
            println!("      retry_after: {at}");
        }
    }

    let report = engine.blocked_report()?;
    if !report.is_empty() {
        println!();
        println!("blocked:");
        for b in &report.blocked {
            println!("  - {} waits on {:?}", b.task_id, b.waiting_on);
        }
        for cycle in &report.cycles {
            println!("  cycle: {}", cycle.join(" -> "));
        }
    }

    let stats = engine.statistics()?;
    println!();
    println!(
        "health: {:.1} ({:?}), completion rate {:.1}%",
        stats.health_score, stats.health_grade, stats.completion_rate
    );

    debug!("dry-run complete (no execution)");
    Ok(())
}
