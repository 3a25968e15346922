use std::sync::{Arc, Mutex};

use pipegraph::dag::NodeState;
use pipegraph::observer::{GraphSnapshot, StateChange, StateObserver};
use pipegraph::report::StateCounts;

/// One observed transition, by node description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub node: String,
    pub old_state: NodeState,
    pub new_state: NodeState,
    pub is_primary: bool,
}

#[derive(Debug, Default)]
struct Log {
    refreshes: Vec<StateCounts>,
    transitions: Vec<Transition>,
}

/// Observer that records everything it sees. Clones share the same log, so
/// keep one clone and hand the other to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    log: Arc<Mutex<Log>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn StateObserver> {
        Box::new(self.clone())
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.log.lock().unwrap().transitions.clone()
    }

    /// State counts passed to each `refresh` call.
    pub fn refreshes(&self) -> Vec<StateCounts> {
        self.log.lock().unwrap().refreshes.clone()
    }

    /// Index of the first transition of `node` into `state`.
    pub fn position(&self, node: &str, state: NodeState) -> Option<usize> {
        self.transitions()
            .iter()
            .position(|t| t.node == node && t.new_state == state)
    }

    /// Descriptions of nodes that entered `state`, in order.
    pub fn entered(&self, state: NodeState) -> Vec<String> {
        self.transitions()
            .into_iter()
            .filter(|t| t.new_state == state)
            .map(|t| t.node)
            .collect()
    }
}

impl StateObserver for RecordingObserver {
    fn refresh(&mut self, snapshot: &GraphSnapshot<'_>) {
        self.log.lock().unwrap().refreshes.push(snapshot.counts());
    }

    fn state_changed(&mut self, change: &StateChange) {
        self.log.lock().unwrap().transitions.push(Transition {
            node: change.node.description().to_string(),
            old_state: change.old_state,
            new_state: change.new_state,
            is_primary: change.is_primary,
        });
    }
}
