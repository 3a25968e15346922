// src/exec/mod.rs

//! Node execution layer.
//!
//! This module is responsible for actually running dispatched nodes, using
//! `tokio::process::Command` for shell commands, and reporting back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`atomic`] provides scratch directories and the output commit.
//! - [`command`] wraps shell command lines ([`AtomicCommand`]).
//! - [`executor_loop`] owns the main executor loop which spawns node runners.
//! - [`node_runner`] runs one node inside its scratch directory.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod atomic;
pub mod backend;
pub mod command;
pub mod executor_loop;
pub mod node_runner;

pub use atomic::ScratchDir;
pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use command::{AtomicCommand, CommandAction};
pub use executor_loop::spawn_executor;
pub use node_runner::execute_node;
