// src/observer.rs

//! State-transition observers.
//!
//! The scheduler owns one [`StateObserver`] for the duration of a run and
//! calls it synchronously on every transition, before any dependent of the
//! changed node is dispatched. Rendering layers (progress trees, counters)
//! plug in here; nothing about output formatting lives in the scheduler.

use std::collections::HashMap;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::dag::{NodeGraph, NodeState};
use crate::node::{Node, NodeId};
use crate::report::StateCounts;

/// One state transition of one node.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub node: Node,
    pub old_state: NodeState,
    pub new_state: NodeState,
    pub timestamp: SystemTime,
    /// `false` when the change is a consequence of another node's
    /// transition (e.g. a dependent skipped because its dependency failed).
    pub is_primary: bool,
}

/// Read-only view of the whole graph and its current states.
#[derive(Debug, Clone, Copy)]
pub struct GraphSnapshot<'a> {
    pub graph: &'a NodeGraph,
    pub states: &'a HashMap<NodeId, NodeState>,
}

impl GraphSnapshot<'_> {
    pub fn state_of(&self, id: NodeId) -> Option<NodeState> {
        self.states.get(&id).copied()
    }

    pub fn counts(&self) -> StateCounts {
        StateCounts::from_states(self.states.values().copied())
    }

    /// (running, done, total) over a composite's flattened sub-nodes.
    pub fn subnode_summary(&self, id: NodeId) -> (usize, usize, usize) {
        self.graph.subnode_summary(id, self.states)
    }
}

pub trait StateObserver: Send {
    /// Called once initial states are known.
    fn refresh(&mut self, _snapshot: &GraphSnapshot<'_>) {}

    fn state_changed(&mut self, change: &StateChange);
}

/// Fan out to several observers, in order.
impl StateObserver for Vec<Box<dyn StateObserver>> {
    fn refresh(&mut self, snapshot: &GraphSnapshot<'_>) {
        for observer in self.iter_mut() {
            observer.refresh(snapshot);
        }
    }

    fn state_changed(&mut self, change: &StateChange) {
        for observer in self.iter_mut() {
            observer.state_changed(change);
        }
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl StateObserver for NullObserver {
    fn state_changed(&mut self, _change: &StateChange) {}
}

/// Reports transitions as `tracing` events.
#[derive(Debug, Default)]
pub struct LoggingObserver {
    counts: StateCounts,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateObserver for LoggingObserver {
    fn refresh(&mut self, snapshot: &GraphSnapshot<'_>) {
        self.counts = snapshot.counts();
        info!(
            total = self.counts.total(),
            done = self.counts.done,
            runnable = self.counts.runnable,
            outdated = self.counts.outdated,
            "initial node states determined"
        );
    }

    fn state_changed(&mut self, change: &StateChange) {
        self.counts.remove(change.old_state);
        self.counts.add(change.new_state);

        match (change.new_state, change.is_primary) {
            (NodeState::Error, _) => warn!(
                node = %change.node,
                from = %change.old_state,
                "node failed"
            ),
            (NodeState::Skipped, _) => debug!(
                node = %change.node,
                from = %change.old_state,
                "node skipped"
            ),
            (new_state, true) => info!(
                node = %change.node,
                from = %change.old_state,
                to = %new_state,
                running = self.counts.running,
                done = self.counts.done,
                total = self.counts.total(),
                "node state changed"
            ),
            (new_state, false) => debug!(
                node = %change.node,
                from = %change.old_state,
                to = %new_state,
                "node state changed"
            ),
        }
    }
}
