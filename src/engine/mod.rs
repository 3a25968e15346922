// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the graph scheduler
//! - the main runtime event loop that reacts to:
//!   - node completion events
//!   - stop requests (e.g. Ctrl-C)
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use tokio::sync::mpsc;

use crate::errors::NodeError;
use crate::node::NodeId;

/// Outcome of a node's execution for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Success,
    Failed {
        message: String,
        /// Captured process output explaining the failure.
        diagnostics: Vec<String>,
    },
    /// The node was stopped before it could finish; nothing was committed.
    Cancelled,
}

impl NodeOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeOutcome::Failed {
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Success)
    }
}

impl From<std::result::Result<(), NodeError>> for NodeOutcome {
    fn from(result: std::result::Result<(), NodeError>) -> Self {
        match result {
            Ok(()) => NodeOutcome::Success,
            Err(NodeError::Cancelled) => NodeOutcome::Cancelled,
            Err(err) => NodeOutcome::Failed {
                message: format!("{err:#}"),
                diagnostics: err.diagnostics().to_vec(),
            },
        }
    }
}

/// Events flowing into the runtime from executors and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched node finished, successfully or not.
    NodeCompleted { node: NodeId, outcome: NodeOutcome },
    /// Graceful stop requested (e.g. Ctrl-C).
    StopRequested,
}

/// Asks a running pipeline to stop.
///
/// Nodes that have not started yet are skipped; running processes are
/// killed and their scratch directories removed before the run returns.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl StopHandle {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { tx }
    }

    /// Returns `false` if the run has already ended.
    pub async fn stop(&self) -> bool {
        self.tx.send(RuntimeEvent::StopRequested).await.is_ok()
    }

    /// Non-async variant; also fails if the event channel is full.
    pub fn try_stop(&self) -> bool {
        self.tx.try_send(RuntimeEvent::StopRequested).is_ok()
    }
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
