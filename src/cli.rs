// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `pipegraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipegraph",
    version,
    about = "Run a pipeline of file-producing commands, re-running only what is out of date.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Maximum number of threads used by running nodes; overrides
    /// `[config].max_threads`.
    #[arg(long, value_name = "N")]
    pub max_threads: Option<usize>,

    /// Parse + validate, print initial node states, but don't execute
    /// any commands.
    #[arg(long)]
    pub dry_run: bool,

    /// Stop starting new nodes after the first failure.
    #[arg(long)]
    pub fail_fast: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
