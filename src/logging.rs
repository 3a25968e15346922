// src/logging.rs

//! `tracing` subscriber setup.
//!
//! `--log-level` wins over `PIPEGRAPH_LOG`, which takes full `EnvFilter`
//! directives (e.g. `pipegraph::exec=debug,info`). Without either, this
//! crate logs at `info` and dependencies at `warn`.
//!
//! Logs go to stderr; the run summary and dry-run listing go to stdout.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "PIPEGRAPH_LOG";

const DEFAULT_DIRECTIVES: &str = "pipegraph=info,warn";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(level.as_directive()));
    }
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid {LOG_ENV} value {directives:?}")),
        None => Ok(EnvFilter::new(DEFAULT_DIRECTIVES)),
    }
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_overrides_environment() {
        let filter = build_filter(Some(LogLevel::Debug), Some("error")).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn environment_directives_are_used_verbatim() {
        let filter = build_filter(None, Some("pipegraph::exec=trace")).unwrap();
        assert_eq!(filter.to_string(), "pipegraph::exec=trace");
    }

    #[test]
    fn blank_environment_falls_back_to_default() {
        let filter = build_filter(None, Some("  ")).unwrap();
        assert!(filter.to_string().contains("pipegraph=info"));
    }

    #[test]
    fn malformed_directives_are_rejected() {
        assert!(build_filter(None, Some("pipegraph=loud")).is_err());
    }
}
