// src/exec/node_runner.rs

//! Runs one dispatched node.

use std::path::Path;
use std::time::Instant;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::dag::ScheduledNode;
use crate::engine::{NodeOutcome, RuntimeEvent};
use crate::errors::NodeError;
use crate::exec::atomic::ScratchDir;
use crate::node::{Node, NodeContext};

/// Run a node and report its outcome to the runtime.
///
/// Exactly one `NodeCompleted` event is sent per call, also when the node's
/// action panics or the run is cancelled.
pub async fn run_node(
    scheduled: ScheduledNode,
    temp_root: &Path,
    cancel: watch::Receiver<bool>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let ScheduledNode { id, node, previous } = scheduled;
    let started = Instant::now();

    info!(node = %node, previous = %previous, "running node");

    let task = tokio::spawn({
        let node = node.clone();
        let temp_root = temp_root.to_path_buf();
        async move { execute_node(&node, &temp_root, cancel).await }
    });

    let result = match task.await {
        Ok(result) => result,
        Err(join_err) => Err(NodeError::Other(anyhow!("node task panicked: {join_err}"))),
    };

    match &result {
        Ok(()) => info!(
            node = %node,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "node finished"
        ),
        Err(NodeError::Cancelled) => info!(node = %node, "node cancelled"),
        Err(err) => error!(node = %node, error = %err, "node failed"),
    }

    if runtime_tx
        .send(RuntimeEvent::NodeCompleted {
            node: id,
            outcome: NodeOutcome::from(result),
        })
        .await
        .is_err()
    {
        warn!(node = %node, "runtime is gone; dropping completion event");
    }
}

/// Run `node` inside a fresh scratch directory below `temp_root` and commit
/// its outputs if it succeeds.
///
/// On any failure, including cancellation, the scratch directory is removed
/// and no final output path is created or modified.
pub async fn execute_node(
    node: &Node,
    temp_root: &Path,
    cancel: watch::Receiver<bool>,
) -> Result<(), NodeError> {
    if *cancel.borrow() {
        return Err(NodeError::Cancelled);
    }

    let scratch = ScratchDir::create(temp_root)?;
    let outputs: Vec<_> = node.output_files().iter().cloned().collect();
    let ctx = NodeContext::new(
        node.description(),
        scratch.path(),
        node.input_files().iter().cloned().collect(),
        outputs.clone(),
        cancel,
    );

    match node.run(&ctx).await {
        Ok(()) if ctx.is_cancelled() => {
            scratch.discard();
            Err(NodeError::Cancelled)
        }
        Ok(()) => scratch.commit(&outputs),
        Err(err) => {
            scratch.discard();
            Err(err)
        }
    }
}
