// src/exec/executor_loop.rs

//! Main executor loop that spawns node runners.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::ScheduledNode;
use crate::engine::RuntimeEvent;
use crate::exec::node_runner::run_node;
use crate::node::NodeId;

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<ScheduledNode>` is what `RealExecutorBackend`
/// uses to hand over dispatched nodes. Each node runs in its own Tokio task;
/// how many run at once is decided by the scheduler, not here.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    temp_root: PathBuf,
    cancel_rx: watch::Receiver<bool>,
) -> mpsc::Sender<ScheduledNode> {
    let (tx, mut rx) = mpsc::channel::<ScheduledNode>(32);
    let temp_root = Arc::new(temp_root);

    tokio::spawn(async move {
        info!(temp_root = ?temp_root, "executor loop started");

        let mut active: HashMap<NodeId, JoinHandle<()>> = HashMap::new();

        while let Some(scheduled) = rx.recv().await {
            active.retain(|_, handle| !handle.is_finished());

            if active.contains_key(&scheduled.id) {
                warn!(
                    node = %scheduled.description(),
                    "node dispatched while a previous instance is still running; ignoring"
                );
                continue;
            }

            let id = scheduled.id;
            let rt_tx = runtime_tx.clone();
            let root = Arc::clone(&temp_root);
            let cancel = cancel_rx.clone();
            let name = scheduled.description().to_string();

            let handle = tokio::spawn(async move {
                run_node(scheduled, &root, cancel, rt_tx).await;
                debug!(node = %name, "node runner finished");
            });
            active.insert(id, handle);
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}
