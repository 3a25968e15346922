#![allow(dead_code)]

use std::sync::Arc;

use pipegraph::dag::{NodeGraph, Scheduler, SchedulerOptions};
use pipegraph::fs::FileStatusCache;
use pipegraph::fs::mock::MockFileSystem;
use pipegraph::node::Node;
use pipegraph::observer::StateObserver;
use pipegraph::types::FailurePolicy;

pub use pipegraph_test_utils::{init_tracing, with_timeout};

/// Build a graph over `nodes` with file checks done against `fs`.
pub fn graph(fs: &MockFileSystem, nodes: &[&Node]) -> NodeGraph {
    NodeGraph::build_with_fs(nodes.iter().map(|n| (*n).clone()), fs).expect("valid graph")
}

pub fn options(max_threads: usize, failure_policy: FailurePolicy) -> SchedulerOptions {
    SchedulerOptions {
        max_threads,
        failure_policy,
    }
}

/// Scheduler over `nodes`, with initial states taken from `fs`.
pub fn scheduler(
    fs: &MockFileSystem,
    nodes: &[&Node],
    opts: SchedulerOptions,
    observer: Box<dyn StateObserver>,
) -> Scheduler {
    let graph = graph(fs, nodes);
    let mut cache = FileStatusCache::new(Arc::new(fs.clone()));
    Scheduler::new(graph, &mut cache, opts, observer).expect("scheduler")
}
