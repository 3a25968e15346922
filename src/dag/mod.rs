// src/dag/mod.rs

//! Graph representation, staleness and scheduling.
//!
//! - [`graph`] builds and validates the dependency graph of nodes.
//! - [`staleness`] decides whether a node's outputs are done / outdated.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   nodes are ready to run, and what happens when they finish.
//! - [`node_info`] provides node states and the dispatch handle.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod node_info;
pub mod scheduler;
pub mod scheduler_step;
pub mod staleness;
pub mod state_manager;
mod validate;

pub use graph::NodeGraph;
pub use node_info::{NodeState, ScheduledNode};
pub use scheduler::{Scheduler, SchedulerOptions};
pub use scheduler_step::SchedulerStep;
pub use staleness::Staleness;
