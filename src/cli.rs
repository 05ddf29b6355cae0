// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `tasksched`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tasksched",
    version,
    about = "Run queued tasks one at a time, by priority and dependency.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML). Built-in defaults apply when the
    /// file does not exist.
    #[arg(long, value_name = "PATH", default_value = "Tasksched.toml")]
    pub config: String,

    /// Halt after the first task that ends FAILED.
    #[arg(long)]
    pub stop_on_error: bool,

    /// Keep waiting for new work instead of exiting once the queue drains.
    #[arg(long)]
    pub stay_alive: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKSCHED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the queue in execution order and any blocked tasks, but don't
    /// execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
