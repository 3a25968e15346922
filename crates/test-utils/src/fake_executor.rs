use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use pipegraph::dag::ScheduledNode;
use pipegraph::engine::{NodeOutcome, RuntimeEvent};
use pipegraph::errors::Result;
use pipegraph::exec::ExecutorBackend;
use pipegraph::node::NodeId;

/// A fake executor that:
/// - records which nodes were "run" (by description, in dispatch order)
/// - immediately reports `NodeCompleted` for each scheduled node, with
///   `Success` unless another outcome was scripted for it
/// - keeps "held" nodes running until `cancel_running`, which completes
///   them as `Cancelled`.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    outcomes: HashMap<String, NodeOutcome>,
    hold: HashSet<String>,
    held: Vec<NodeId>,
    on_hold: Option<mpsc::UnboundedSender<String>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            outcomes: HashMap::new(),
            hold: HashSet::new(),
            held: Vec::new(),
            on_hold: None,
        }
    }

    /// Complete the node described as `desc` with `outcome`.
    pub fn with_outcome(mut self, desc: &str, outcome: NodeOutcome) -> Self {
        self.outcomes.insert(desc.to_string(), outcome);
        self
    }

    /// Fail the node described as `desc`.
    pub fn failing(self, desc: &str) -> Self {
        self.with_outcome(
            desc,
            NodeOutcome::Failed {
                message: format!("{desc} failed"),
                diagnostics: vec![format!("{desc}: something went wrong")],
            },
        )
    }

    /// Never complete `desc` on its own; the description is sent on `notify`
    /// once it has been dispatched.
    pub fn holding(mut self, desc: &str, notify: mpsc::UnboundedSender<String>) -> Self {
        self.hold.insert(desc.to_string());
        self.on_hold = Some(notify);
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<ScheduledNode>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for n in nodes {
                let desc = n.description().to_string();
                {
                    let mut guard = self.executed.lock().unwrap();
                    guard.push(desc.clone());
                }

                if self.hold.contains(&desc) {
                    self.held.push(n.id);
                    if let Some(notify) = &self.on_hold {
                        let _ = notify.send(desc);
                    }
                    continue;
                }

                let outcome = self
                    .outcomes
                    .get(&desc)
                    .cloned()
                    .unwrap_or(NodeOutcome::Success);

                self.runtime_tx
                    .send(RuntimeEvent::NodeCompleted { node: n.id, outcome })
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_running(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for id in std::mem::take(&mut self.held) {
                self.runtime_tx
                    .send(RuntimeEvent::NodeCompleted {
                        node: id,
                        outcome: NodeOutcome::Cancelled,
                    })
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
