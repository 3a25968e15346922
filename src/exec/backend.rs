// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`super::executor_loop`].
//!
//! - `RealExecutorBackend` is the default implementation. It wraps the
//!   `spawn_executor` loop and forwards scheduled nodes over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which nodes were scheduled and directly emits `NodeCompleted` events.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};

use crate::dag::ScheduledNode;
use crate::engine::RuntimeEvent;
use crate::errors::Result;

use super::executor_loop::spawn_executor;

/// Trait abstracting how scheduled nodes are executed.
///
/// Production code uses [`RealExecutorBackend`]; tests can provide their own
/// implementation that doesn't run real nodes.
pub trait ExecutorBackend: Send {
    /// Dispatch the given nodes for execution.
    ///
    /// Every dispatched node must eventually produce exactly one
    /// `RuntimeEvent::NodeCompleted`.
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<ScheduledNode>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask every running node to stop. Cancelled nodes still report a
    /// completion (`NodeOutcome::Cancelled`) once they have cleaned up.
    fn cancel_running(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
///
/// The runtime calls `spawn_ready_nodes`, which forwards the nodes to the
/// background executor via an mpsc channel. Cancellation is broadcast to
/// every node runner through a `watch` channel.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ScheduledNode>,
    cancel: watch::Sender<bool>,
}

impl RealExecutorBackend {
    /// Create a new real executor backend, wiring it to the given runtime
    /// event sender. Scratch directories are created below `temp_root`.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, temp_root: impl Into<PathBuf>) -> Self {
        let (cancel, cancel_rx) = watch::channel(false);
        let tx = spawn_executor(runtime_tx, temp_root.into(), cancel_rx);
        Self { tx, cancel }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<ScheduledNode>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for node in nodes {
                tx.send(node)
                    .await
                    .map_err(|e| anyhow!("executor loop is gone: {e}"))?;
            }
            Ok(())
        })
    }

    fn cancel_running(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.cancel.send_replace(true);
        Box::pin(async { Ok(()) })
    }
}
