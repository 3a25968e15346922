// src/errors.rs

//! Crate-wide error types.
//!
//! [`PipelineError`] covers everything that can abort a run as a whole
//! (bad configuration, a broken graph, unreadable filesystem metadata).
//! [`NodeError`] is what a single node's action reports; the scheduler turns
//! it into an `Error` state for that node only.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in node graph: {}", .nodes.join(" -> "))]
    Cycle { nodes: Vec<String> },

    #[error("Multiple nodes create the same output file {path:?}: '{first}' and '{second}'")]
    ConflictingOutputs {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("Could not stat {path:?}: {source}")]
    CacheStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Nodes depend on dynamically created files, but not on the nodes creating them:\n{0}")]
    UndeclaredDependency(String),

    #[error("Required files do not exist, and are not created by any node:\n{0}")]
    MissingInputs(String),

    #[error("Required executables are missing:\n{0}")]
    MissingExecutables(String),

    #[error("Version requirements are not met:\n{0}")]
    VersionRequirement(String),

    #[error("Node '{node}' requires {required} threads, but at most {max} are allowed")]
    TooManyThreads {
        node: String,
        required: usize,
        max: usize,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure of a single node's work.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("command `{command}` {status}")]
    CommandFailed {
        command: String,
        status: String,
        /// Tail of the process' stderr.
        diagnostics: Vec<String>,
    },

    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("expected output file {0:?} was not produced")]
    MissingOutput(PathBuf),

    #[error("could not move {from:?} to {to:?}: {source}")]
    Commit {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NodeError {
    /// Captured process output that explains the failure, if any.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            NodeError::CommandFailed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}
