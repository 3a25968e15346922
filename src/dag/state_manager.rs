// src/dag/state_manager.rs

//! Per-run state transitions for nodes in the scheduler.
//!
//! Every state change goes through [`StateManager::transition`], which
//! notifies the observer before returning. Callers therefore see a node's
//! transition reported before anything that depends on it is dispatched.

use std::collections::HashMap;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::dag::NodeGraph;
use crate::dag::node_info::{NodeState, ScheduledNode};
use crate::node::NodeId;
use crate::observer::{StateChange, StateObserver};

/// Manages per-run state transitions for nodes.
pub struct StateManager<'a> {
    graph: &'a NodeGraph,
    states: &'a mut HashMap<NodeId, NodeState>,
    observer: &'a mut dyn StateObserver,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a NodeGraph,
        states: &'a mut HashMap<NodeId, NodeState>,
        observer: &'a mut dyn StateObserver,
    ) -> Self {
        Self {
            graph,
            states,
            observer,
        }
    }

    /// Set the state of `id` and report it. No-op if the state is unchanged.
    pub fn transition(&mut self, id: NodeId, new_state: NodeState, is_primary: bool) {
        let graph = self.graph;
        let Some(node) = graph.node(id) else {
            warn!(node = %id, "state change for node not in graph; ignoring");
            return;
        };
        let Some(slot) = self.states.get_mut(&id) else {
            warn!(node = %node, "node in graph has no state; ignoring");
            return;
        };

        let old_state = *slot;
        if old_state == new_state {
            return;
        }
        *slot = new_state;

        self.observer.state_changed(&StateChange {
            node: node.clone(),
            old_state,
            new_state,
            timestamp: SystemTime::now(),
            is_primary,
        });
    }

    pub fn deps_satisfied(&self, id: NodeId) -> bool {
        deps_satisfied(self.graph, self.states, id)
    }

    /// Mark every pending transitive dependent of a failed node as `Skipped`.
    ///
    /// Returns the newly skipped nodes in topological order.
    pub fn mark_dependents_skipped(&mut self, failed: NodeId) -> Vec<NodeId> {
        let graph = self.graph;
        let dependents = graph.transitive_dependents(failed);
        let mut skipped = Vec::new();

        for &id in graph.order() {
            if dependents.binary_search(&id).is_err() {
                continue;
            }
            if self.states.get(&id).is_some_and(|s| s.is_pending()) {
                debug!(node = %id, upstream = %failed, "skipping dependent of failed node");
                self.transition(id, NodeState::Skipped, false);
                skipped.push(id);
            }
        }

        skipped
    }

    /// Mark every node that has not been dispatched yet as `Skipped`.
    pub fn skip_all_pending(&mut self) -> Vec<NodeId> {
        let pending: Vec<NodeId> = self
            .graph
            .order()
            .iter()
            .copied()
            .filter(|id| self.states.get(id).is_some_and(|s| s.is_pending()))
            .collect();

        for &id in &pending {
            self.transition(id, NodeState::Skipped, false);
        }
        pending
    }

    /// Collect pending nodes whose dependencies are all `Done` and that fit
    /// in `available_threads`, mark them `Running` and return them.
    ///
    /// Candidates are visited in topological order; a node too large for
    /// the remaining budget does not block smaller ones behind it.
    pub fn collect_ready(&mut self, available_threads: &mut usize) -> Vec<ScheduledNode> {
        let graph = self.graph;
        let candidates: Vec<(NodeId, NodeState)> = graph
            .order()
            .iter()
            .filter_map(|id| {
                let state = *self.states.get(id)?;
                (state.is_pending() && self.deps_satisfied(*id)).then_some((*id, state))
            })
            .collect();

        let mut ready = Vec::new();
        for (id, previous) in candidates {
            if *available_threads == 0 {
                break;
            }
            let Some(node) = graph.node(id) else {
                continue;
            };
            if node.threads() > *available_threads {
                continue;
            }

            *available_threads -= node.threads();
            debug!(
                node = %node,
                threads = node.threads(),
                previous = %previous,
                "dependencies satisfied; marking Running"
            );
            self.transition(id, NodeState::Running, true);
            ready.push(ScheduledNode {
                id,
                node: node.clone(),
                previous,
            });
        }

        ready
    }
}

/// True iff every resolved predecessor of `id` is `Done`.
pub fn deps_satisfied(graph: &NodeGraph, states: &HashMap<NodeId, NodeState>, id: NodeId) -> bool {
    graph
        .dependencies_of(id)
        .iter()
        .all(|dep| states.get(dep) == Some(&NodeState::Done))
}

/// True iff no node is pending or running.
pub fn all_terminal(states: &HashMap<NodeId, NodeState>) -> bool {
    states.values().all(|s| s.is_terminal())
}
