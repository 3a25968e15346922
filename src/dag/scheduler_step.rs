// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::node_info::ScheduledNode;
use crate::node::NodeId;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the graph and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Nodes that became `Running` in this step and must be executed.
    pub newly_scheduled: Vec<ScheduledNode>,
    /// Nodes whose own work failed in this step.
    pub newly_failed: Vec<NodeId>,
    /// Nodes skipped in this step, because of an upstream failure, a
    /// fail-fast halt or a stop request.
    pub newly_skipped: Vec<NodeId>,
    /// Whether every node is now in a terminal state.
    pub run_finished: bool,
}

impl SchedulerStep {
    pub fn scheduled_ids(&self) -> Vec<NodeId> {
        self.newly_scheduled.iter().map(|s| s.id).collect()
    }
}
