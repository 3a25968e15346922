// src/dag/scheduler.rs

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::dag::graph::NodeGraph;
use crate::dag::node_info::NodeState;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::staleness;
use crate::dag::state_manager::{self, StateManager};
use crate::engine::NodeOutcome;
use crate::errors::{PipelineError, Result};
use crate::fs::FileStatusCache;
use crate::node::NodeId;
use crate::observer::{GraphSnapshot, StateObserver};
use crate::report::{FailureReport, RunReport, StateCounts};
use crate::types::FailurePolicy;

/// Knobs for one scheduling run.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Upper bound on the summed `threads` of all `Running` nodes.
    pub max_threads: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct FailureRecord {
    node: NodeId,
    message: String,
    diagnostics: Vec<String>,
    skipped: Vec<NodeId>,
}

/// Scheduler holds the immutable graph plus mutable per-run state.
///
/// It is responsible for:
/// - computing every node's initial state from the filesystem, once
/// - deciding which pending nodes are ready (all predecessors `Done`) and
///   fit in the thread budget
/// - marking nodes as done or failed when their executor reports back
/// - skipping the dependents of failed nodes
///
/// It performs no IO after construction and knows nothing about processes.
pub struct Scheduler {
    graph: NodeGraph,
    states: HashMap<NodeId, NodeState>,
    options: SchedulerOptions,
    observer: Box<dyn StateObserver>,
    running_threads: usize,
    already_done: usize,
    executed: usize,
    failures: Vec<FailureRecord>,
    /// Set after the first failure under `FailurePolicy::FailFast`.
    halted: bool,
    stopped: bool,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("nodes", &self.graph.len())
            .field("options", &self.options)
            .field("running_threads", &self.running_threads)
            .field("halted", &self.halted)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Compute initial states for every node and hand them to `observer`.
    ///
    /// Nodes are visited in topological order. A node whose predecessors are
    /// all `Done` is `Done` when its outputs exist and are current,
    /// `Outdated` when they exist but are stale, `Runnable` otherwise. A
    /// node with a predecessor that will run is itself re-run. A node whose
    /// files cannot be stat'ed starts in `Error` and its dependents are
    /// skipped.
    pub fn new(
        graph: NodeGraph,
        cache: &mut FileStatusCache,
        options: SchedulerOptions,
        mut observer: Box<dyn StateObserver>,
    ) -> Result<Self> {
        if options.max_threads == 0 {
            return Err(PipelineError::ConfigError(
                "max_threads must be at least 1".to_string(),
            ));
        }
        for node in graph.iter_topological() {
            if node.threads() > options.max_threads {
                return Err(PipelineError::TooManyThreads {
                    node: node.description().to_string(),
                    required: node.threads(),
                    max: options.max_threads,
                });
            }
        }

        let mut states: HashMap<NodeId, NodeState> = HashMap::with_capacity(graph.len());
        let mut failures = Vec::new();

        for node in graph.iter_topological() {
            let preds: Vec<NodeState> = graph
                .dependencies_of(node.id())
                .iter()
                .filter_map(|p| states.get(p).copied())
                .collect();

            let state = if preds
                .iter()
                .any(|s| matches!(s, NodeState::Error | NodeState::Skipped))
            {
                NodeState::Skipped
            } else {
                match staleness::evaluate(node, cache) {
                    Ok(st) => {
                        let upstream_pending = preds.iter().any(|s| *s != NodeState::Done);
                        match (st.done, st.outdated || upstream_pending) {
                            (true, false) => NodeState::Done,
                            (true, true) if !node.output_files().is_empty() => {
                                NodeState::Outdated
                            }
                            _ => NodeState::Runnable,
                        }
                    }
                    Err(err) => {
                        warn!(node = %node, error = %err, "cannot determine node state");
                        failures.push(FailureRecord {
                            node: node.id(),
                            message: err.to_string(),
                            diagnostics: Vec::new(),
                            skipped: Vec::new(),
                        });
                        NodeState::Error
                    }
                }
            };

            debug!(node = %node, state = %state, "initial state");
            states.insert(node.id(), state);
        }

        for record in &mut failures {
            record.skipped = graph
                .transitive_dependents(record.node)
                .into_iter()
                .filter(|id| states.get(id) == Some(&NodeState::Skipped))
                .collect();
        }

        let already_done = states.values().filter(|s| **s == NodeState::Done).count();
        let halted = !failures.is_empty() && options.failure_policy == FailurePolicy::FailFast;

        info!(
            nodes = graph.len(),
            already_done,
            max_threads = options.max_threads,
            policy = ?options.failure_policy,
            "scheduler initialised"
        );

        observer.refresh(&GraphSnapshot {
            graph: &graph,
            states: &states,
        });

        let mut scheduler = Self {
            graph,
            states,
            options,
            observer,
            running_threads: 0,
            already_done,
            executed: 0,
            failures,
            halted,
            stopped: false,
        };

        if scheduler.halted {
            scheduler.manager().skip_all_pending();
        }

        Ok(scheduler)
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn options(&self) -> SchedulerOptions {
        self.options
    }

    pub fn state_of(&self, id: NodeId) -> Option<NodeState> {
        self.states.get(&id).copied()
    }

    pub fn snapshot(&self) -> GraphSnapshot<'_> {
        GraphSnapshot {
            graph: &self.graph,
            states: &self.states,
        }
    }

    pub fn counts(&self) -> StateCounts {
        StateCounts::from_states(self.states.values().copied())
    }

    pub fn running_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == NodeState::Running)
            .count()
    }

    /// Summed `threads` of all running nodes.
    pub fn running_threads(&self) -> usize {
        self.running_threads
    }

    /// Whether every dependency of `id` is `Done`.
    ///
    /// Returns `None` if the node is unknown.
    pub fn deps_satisfied(&self, id: NodeId) -> Option<bool> {
        self.graph.contains(id).then(|| {
            state_manager::deps_satisfied(&self.graph, &self.states, id)
        })
    }

    /// No node is pending or running.
    pub fn is_finished(&self) -> bool {
        state_manager::all_terminal(&self.states)
    }

    /// Dispatch whatever is ready and fits in the thread budget.
    pub fn step_dispatch(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        self.dispatch_into(&mut step);
        step.run_finished = self.is_finished();
        step
    }

    /// Record the outcome of a running node, then dispatch what became ready.
    pub fn step_completion(&mut self, id: NodeId, outcome: NodeOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if self.state_of(id) != Some(NodeState::Running) {
            warn!(node = %id, state = ?self.state_of(id), "completion for node that is not running; ignoring");
            step.run_finished = self.is_finished();
            return step;
        }

        let threads = self.graph.node(id).map_or(1, |n| n.threads());
        self.running_threads = self.running_threads.saturating_sub(threads);

        match outcome {
            NodeOutcome::Success => {
                debug!(node = %id, "node completed successfully");
                self.manager().transition(id, NodeState::Done, true);
            }
            NodeOutcome::Failed {
                message,
                diagnostics,
            } => self.fail(id, message, diagnostics, &mut step),
            NodeOutcome::Cancelled => {
                self.fail(id, "cancelled".to_string(), Vec::new(), &mut step)
            }
        }

        self.dispatch_into(&mut step);
        step.run_finished = self.is_finished();
        step
    }

    /// Stop dispatching. Every node not yet started is skipped; running nodes
    /// are left to the caller to cancel and complete.
    pub fn request_stop(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if !self.stopped {
            info!(running = self.running_count(), "stop requested; no further nodes will start");
            self.stopped = true;
            step.newly_skipped = self.manager().skip_all_pending();
        }
        step.run_finished = self.is_finished();
        step
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Summary of the run so far.
    pub fn report(&self) -> RunReport {
        let counts = self.counts();
        let describe = |id: &NodeId| {
            self.graph
                .node(*id)
                .map_or_else(|| id.to_string(), |n| n.description().to_string())
        };

        RunReport {
            total: counts.total(),
            already_done: self.already_done,
            executed: self.executed,
            succeeded: counts.done,
            failed: counts.error,
            skipped: counts.skipped,
            failures: self
                .failures
                .iter()
                .map(|f| FailureReport {
                    node: describe(&f.node),
                    message: f.message.clone(),
                    diagnostics: f.diagnostics.clone(),
                    skipped_dependents: f.skipped.iter().map(describe).collect(),
                })
                .collect(),
            stopped: self.stopped,
        }
    }

    fn manager(&mut self) -> StateManager<'_> {
        StateManager::new(&self.graph, &mut self.states, self.observer.as_mut())
    }

    fn fail(
        &mut self,
        id: NodeId,
        message: String,
        diagnostics: Vec<String>,
        step: &mut SchedulerStep,
    ) {
        warn!(node = %id, message = %message, "node failed; skipping dependents");
        let mut manager = self.manager();
        manager.transition(id, NodeState::Error, true);
        let skipped = manager.mark_dependents_skipped(id);

        step.newly_failed.push(id);
        step.newly_skipped.extend(skipped.iter().copied());
        self.failures.push(FailureRecord {
            node: id,
            message,
            diagnostics,
            skipped,
        });

        if self.options.failure_policy == FailurePolicy::FailFast && !self.halted {
            info!("fail-fast: no further nodes will start");
            self.halted = true;
            step.newly_skipped.extend(self.manager().skip_all_pending());
        }
    }

    fn dispatch_into(&mut self, step: &mut SchedulerStep) {
        if self.halted || self.stopped {
            return;
        }

        let mut available = self.options.max_threads.saturating_sub(self.running_threads);
        let ready = self.manager().collect_ready(&mut available);
        self.running_threads = self.options.max_threads - available;
        self.executed += ready.len();

        if ready.is_empty() && self.running_threads == 0 {
            let stuck = self.manager().skip_all_pending();
            if !stuck.is_empty() {
                warn!(count = stuck.len(), "pending nodes can never become ready; skipping");
                step.newly_skipped.extend(stuck);
            }
        }

        step.newly_scheduled.extend(ready);
    }
}
