// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, info};

use crate::dag::{ScheduledNode, Scheduler, SchedulerStep};
use crate::engine::NodeOutcome;
use crate::node::NodeId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these nodes to the executor.
    DispatchNodes(Vec<ScheduledNode>),
    /// Ask every running node to stop.
    CancelRunning,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn from_scheduler_step(step: SchedulerStep) -> Self {
        let mut commands = Vec::new();
        if !step.newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchNodes(step.newly_scheduled));
        }
        CoreStep {
            commands,
            keep_running: !step.run_finished,
        }
    }

    /// Nodes dispatched by this step.
    pub fn dispatched(&self) -> Vec<NodeId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchNodes(nodes) => Some(nodes.iter().map(|n| n.id)),
                CoreCommand::CancelRunning => None,
            })
            .flatten()
            .collect()
    }
}

/// Dispatch the initial ready set.
pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.step_dispatch();
    info!(
        dispatched = step.newly_scheduled.len(),
        finished = step.run_finished,
        "run started"
    );
    CoreStep::from_scheduler_step(step)
}

/// Handle a node completion event.
pub fn handle_node_completion(
    scheduler: &mut Scheduler,
    node: NodeId,
    outcome: NodeOutcome,
) -> CoreStep {
    let step = scheduler.step_completion(node, outcome);
    if !step.newly_skipped.is_empty() {
        debug!(
            node = %node,
            skipped = step.newly_skipped.len(),
            "dependents skipped after failure"
        );
    }
    CoreStep::from_scheduler_step(step)
}

/// Handle a stop request: skip everything not yet started and cancel
/// whatever is running. The loop keeps going until the running nodes have
/// reported back, so their cleanup completes before the run ends.
pub fn handle_stop_request(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.request_stop();
    let mut commands = Vec::new();
    if scheduler.running_count() > 0 {
        commands.push(CoreCommand::CancelRunning);
    }
    CoreStep {
        commands,
        keep_running: !step.run_finished,
    }
}
