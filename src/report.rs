// src/report.rs

//! End-of-run summary.

use std::fmt;

use crate::dag::NodeState;

/// Number of nodes per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub runnable: usize,
    pub running: usize,
    pub done: usize,
    pub outdated: usize,
    pub error: usize,
    pub skipped: usize,
}

impl StateCounts {
    pub fn from_states(states: impl IntoIterator<Item = NodeState>) -> Self {
        let mut counts = Self::default();
        for state in states {
            counts.add(state);
        }
        counts
    }

    pub fn add(&mut self, state: NodeState) {
        *self.slot(state) += 1;
    }

    pub fn remove(&mut self, state: NodeState) {
        let slot = self.slot(state);
        *slot = slot.saturating_sub(1);
    }

    pub fn total(&self) -> usize {
        self.runnable + self.running + self.done + self.outdated + self.error + self.skipped
    }

    fn slot(&mut self, state: NodeState) -> &mut usize {
        match state {
            NodeState::Runnable => &mut self.runnable,
            NodeState::Running => &mut self.running,
            NodeState::Done => &mut self.done,
            NodeState::Outdated => &mut self.outdated,
            NodeState::Error => &mut self.error,
            NodeState::Skipped => &mut self.skipped,
        }
    }
}

/// A node that ended in `Error`.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub node: String,
    pub message: String,
    /// Captured process output explaining the failure.
    pub diagnostics: Vec<String>,
    /// Dependents that were skipped because of this failure.
    pub skipped_dependents: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub total: usize,
    /// Nodes that were already up to date and never dispatched.
    pub already_done: usize,
    /// Nodes dispatched to an executor during this run.
    pub executed: usize,
    /// Nodes that ended `Done` (including `already_done`).
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<FailureReport>,
    /// The run ended because a stop was requested.
    pub stopped: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && !self.stopped
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pipeline {}: {} nodes, {} succeeded ({} already done, {} executed), {} failed, {} skipped",
            if self.stopped {
                "stopped"
            } else if self.is_success() {
                "finished"
            } else {
                "failed"
            },
            self.total,
            self.succeeded,
            self.already_done,
            self.executed,
            self.failed,
            self.skipped
        )?;

        for failure in &self.failures {
            writeln!(f, "  error in '{}': {}", failure.node, failure.message)?;
            for line in &failure.diagnostics {
                writeln!(f, "    | {line}")?;
            }
            if !failure.skipped_dependents.is_empty() {
                writeln!(
                    f,
                    "    skipped dependents: {}",
                    failure.skipped_dependents.join(", ")
                )?;
            }
        }
        Ok(())
    }
}
