// src/pipeline.rs

//! High-level entry point: collect nodes, validate, run.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::dag::{NodeGraph, NodeState, Scheduler, SchedulerOptions};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, StopHandle};
use crate::errors::Result;
use crate::exec::{ExecutorBackend, RealExecutorBackend};
use crate::fs::{FileStatusCache, FileSystem, RealFileSystem};
use crate::node::{Node, SystemVersionQuery, VersionQuery};
use crate::observer::{NullObserver, StateObserver};
use crate::report::RunReport;
use crate::types::FailurePolicy;

/// Capacity of the runtime event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_threads: usize,
    pub failure_policy: FailurePolicy,
    /// Parent directory of the per-node scratch directories.
    pub temp_root: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        let scheduler = SchedulerOptions::default();
        Self {
            max_threads: scheduler.max_threads,
            failure_policy: scheduler.failure_policy,
            temp_root: std::env::temp_dir(),
        }
    }
}

impl RunOptions {
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            max_threads: self.max_threads,
            failure_policy: self.failure_policy,
        }
    }
}

/// A set of nodes plus the options to run them with.
#[derive(Debug)]
pub struct Pipeline {
    nodes: Vec<Node>,
    options: RunOptions,
    fs: Arc<dyn FileSystem>,
    versions: Arc<dyn VersionQuery>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
}

impl Pipeline {
    pub fn new(options: RunOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            nodes: Vec::new(),
            options,
            fs: Arc::new(RealFileSystem),
            versions: Arc::new(SystemVersionQuery),
            event_tx,
            event_rx,
        }
    }

    /// Check file state through `fs` instead of the real filesystem.
    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Query program versions through `versions` instead of running them.
    pub fn with_version_query(mut self, versions: Arc<dyn VersionQuery>) -> Self {
        self.versions = versions;
        self
    }

    /// Add a node. Its dependencies and sub-nodes are pulled in as well.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) {
        self.nodes.extend(nodes);
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Handle that stops a subsequent [`Pipeline::run`].
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.event_tx.clone())
    }

    pub fn build_graph(&self) -> Result<NodeGraph> {
        NodeGraph::build_with(
            self.nodes.iter().cloned(),
            self.fs.as_ref(),
            self.versions.as_ref(),
        )
    }

    /// Validate the graph and compute initial states, with a fresh stat cache.
    pub fn prepare(&self, observer: Box<dyn StateObserver>) -> Result<Scheduler> {
        let graph = self.build_graph()?;
        let mut cache = FileStatusCache::new(Arc::clone(&self.fs));
        let scheduler = Scheduler::new(graph, &mut cache, self.options.scheduler_options(), observer)?;
        info!(stat_calls = cache.len(), "initial states computed");
        Ok(scheduler)
    }

    /// Initial state of every node in topological order, without running
    /// anything.
    pub fn dry_run(&self) -> Result<Vec<(Node, NodeState)>> {
        let scheduler = self.prepare(Box::new(NullObserver))?;
        Ok(scheduler
            .graph()
            .iter_topological()
            .map(|node| {
                let state = scheduler.state_of(node.id()).unwrap_or(NodeState::Runnable);
                (node.clone(), state)
            })
            .collect())
    }

    /// Run every node that is not up to date, reporting transitions to
    /// `observer`.
    pub async fn run(self, observer: Box<dyn StateObserver>) -> Result<RunReport> {
        let backend = RealExecutorBackend::new(self.event_tx.clone(), self.options.temp_root.clone());
        self.run_with_backend(observer, backend).await
    }

    /// Like [`Pipeline::run`] with a custom executor. The backend reports
    /// completions through the sender returned by [`Pipeline::event_sender`].
    pub async fn run_with_backend<E: ExecutorBackend>(
        self,
        observer: Box<dyn StateObserver>,
        backend: E,
    ) -> Result<RunReport> {
        let scheduler = self.prepare(observer)?;
        let Pipeline { event_rx, .. } = self;
        Runtime::new(CoreRuntime::new(scheduler), event_rx, backend)
            .run()
            .await
    }

    pub fn event_sender(&self) -> mpsc::Sender<RuntimeEvent> {
        self.event_tx.clone()
    }
}
