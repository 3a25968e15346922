// src/dag/node_info.rs

//! Per-node state and the dispatch handle handed to executors.

use std::fmt;

use crate::node::{Node, NodeId};

/// Scheduling state of a node within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Will run once all of its dependencies are `Done`.
    Runnable,
    /// Dispatched to an executor.
    Running,
    /// Outputs exist and are up to date (or were just produced).
    Done,
    /// Outputs exist but are stale; schedules exactly like `Runnable`.
    Outdated,
    /// The node's own work failed.
    Error,
    /// Never dispatched because an upstream node failed or the run stopped.
    Skipped,
}

impl NodeState {
    /// `Runnable` and `Outdated` are both waiting to be executed.
    pub fn is_pending(self) -> bool {
        matches!(self, NodeState::Runnable | NodeState::Outdated)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Done | NodeState::Error | NodeState::Skipped)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Runnable => "runnable",
            NodeState::Running => "running",
            NodeState::Done => "done",
            NodeState::Outdated => "outdated",
            NodeState::Error => "error",
            NodeState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A node the scheduler wants an executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledNode {
    pub id: NodeId,
    pub node: Node,
    /// State the node was in before dispatch (`Runnable` or `Outdated`).
    pub previous: NodeState,
}

impl ScheduledNode {
    pub fn description(&self) -> &str {
        self.node.description()
    }
}
