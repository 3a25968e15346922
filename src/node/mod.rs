// src/node/mod.rs

//! Units of schedulable work.
//!
//! A [`Node`] is a cheap, clonable handle. Identity is the handle itself
//! ([`NodeId`] is handed out from a global counter at construction), never the
//! node's contents: two nodes with identical files are still two nodes.
//!
//! - [`action`] defines the run hook ([`NodeAction`]) and the
//!   [`NodeContext`] it is invoked with.
//! - [`requirement`] declares minimum versions of external programs.

pub mod action;
pub mod requirement;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{NodeError, PipelineError, Result};
use crate::exec::{AtomicCommand, CommandAction};

pub use action::{FnAction, NodeAction, NodeContext};
pub use requirement::{Requirement, SystemVersionQuery, Version, VersionQuery};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque node identity; ordered by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which kind of node this is.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A plain node that does its own work.
    Simple,
    /// A node grouping independently schedulable sub-nodes. It completes
    /// after all of them, and is reported as one logical unit.
    Composite { subnodes: Vec<Node> },
}

struct NodeInner {
    id: NodeId,
    description: String,
    kind: NodeKind,
    input_files: BTreeSet<PathBuf>,
    output_files: BTreeSet<PathBuf>,
    auxiliary_files: BTreeSet<PathBuf>,
    executables: BTreeSet<String>,
    requirements: Vec<Requirement>,
    dependencies: Vec<Node>,
    threads: usize,
    action: Option<Arc<dyn NodeAction>>,
}

#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Start building a simple node.
    pub fn builder(description: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(description)
    }

    /// Start building a composite node over `subnodes`.
    pub fn composite(
        description: impl Into<String>,
        subnodes: impl IntoIterator<Item = Node>,
    ) -> NodeBuilder {
        let mut builder = NodeBuilder::new(description);
        builder.subnodes = Some(subnodes.into_iter().collect());
        builder
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn kind(&self) -> &NodeKind {
        &self.inner.kind
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Composite { .. })
    }

    pub fn input_files(&self) -> &BTreeSet<PathBuf> {
        &self.inner.input_files
    }

    pub fn output_files(&self) -> &BTreeSet<PathBuf> {
        &self.inner.output_files
    }

    pub fn auxiliary_files(&self) -> &BTreeSet<PathBuf> {
        &self.inner.auxiliary_files
    }

    pub fn executables(&self) -> &BTreeSet<String> {
        &self.inner.executables
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.inner.requirements
    }

    pub fn dependencies(&self) -> &[Node] {
        &self.inner.dependencies
    }

    pub fn subnodes(&self) -> &[Node] {
        match &self.inner.kind {
            NodeKind::Simple => &[],
            NodeKind::Composite { subnodes } => subnodes,
        }
    }

    /// Worker slots this node occupies while running.
    pub fn threads(&self) -> usize {
        self.inner.threads
    }

    /// Invoke the node's action inside `ctx`. Nodes without an action
    /// succeed immediately.
    pub async fn run(&self, ctx: &NodeContext) -> std::result::Result<(), NodeError> {
        match &self.inner.action {
            Some(action) => action.run(ctx).await,
            None => Ok(()),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.description)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("description", &self.inner.description)
            .field("composite", &self.is_composite())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Node`]; everything declared here is fixed once built.
pub struct NodeBuilder {
    description: String,
    subnodes: Option<Vec<Node>>,
    input_files: BTreeSet<PathBuf>,
    output_files: BTreeSet<PathBuf>,
    auxiliary_files: BTreeSet<PathBuf>,
    executables: BTreeSet<String>,
    requirements: Vec<Requirement>,
    dependencies: Vec<Node>,
    threads: usize,
    commands: Vec<AtomicCommand>,
    action: Option<Arc<dyn NodeAction>>,
}

impl NodeBuilder {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            subnodes: None,
            input_files: BTreeSet::new(),
            output_files: BTreeSet::new(),
            auxiliary_files: BTreeSet::new(),
            executables: BTreeSet::new(),
            requirements: Vec::new(),
            dependencies: Vec::new(),
            threads: 1,
            commands: Vec::new(),
            action: None,
        }
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_files.insert(path.into());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.input_files.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_files.insert(path.into());
        self
    }

    pub fn outputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.output_files.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn auxiliary(mut self, path: impl Into<PathBuf>) -> Self {
        self.auxiliary_files.insert(path.into());
        self
    }

    pub fn executable(mut self, name: impl Into<String>) -> Self {
        self.executables.insert(name.into());
        self
    }

    /// Require a minimum version of an external program.
    pub fn requirement(mut self, requirement: Requirement) -> Self {
        if !self.requirements.contains(&requirement) {
            self.requirements.push(requirement);
        }
        self
    }

    pub fn dependency(mut self, node: &Node) -> Self {
        if !self.dependencies.contains(node) {
            self.dependencies.push(node.clone());
        }
        self
    }

    pub fn dependencies<'a>(mut self, nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        for node in nodes {
            self = self.dependency(node);
        }
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Append a shell command; commands run in order inside the node's
    /// scratch directory.
    pub fn command(mut self, command: AtomicCommand) -> Self {
        self.commands.push(command);
        self
    }

    /// Use a custom action instead of (or after) shell commands.
    pub fn action(mut self, action: impl NodeAction + 'static) -> Self {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn build(self) -> Result<Node> {
        if self.threads == 0 {
            return Err(PipelineError::ConfigError(format!(
                "node '{}' must use at least one thread",
                self.description
            )));
        }
        check_unique_file_names(&self.description, &self.output_files)?;

        let action: Option<Arc<dyn NodeAction>> = match (self.commands.is_empty(), self.action) {
            (true, action) => action,
            (false, None) => Some(Arc::new(CommandAction::new(self.commands))),
            (false, Some(custom)) => Some(Arc::new(CommandAction::new(self.commands).then(custom))),
        };

        let kind = match self.subnodes {
            Some(subnodes) => NodeKind::Composite { subnodes },
            None => NodeKind::Simple,
        };

        Ok(Node {
            inner: Arc::new(NodeInner {
                id: NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
                description: self.description,
                kind,
                input_files: self.input_files,
                output_files: self.output_files,
                auxiliary_files: self.auxiliary_files,
                executables: self.executables,
                requirements: self.requirements,
                dependencies: self.dependencies,
                threads: self.threads,
                action,
            }),
        })
    }
}

/// Outputs are staged in one scratch directory under their file names, so
/// two outputs of the same node must not share a file name.
fn check_unique_file_names(description: &str, outputs: &BTreeSet<PathBuf>) -> Result<()> {
    let mut seen: HashMap<&std::ffi::OsStr, &Path> = HashMap::new();
    for path in outputs {
        let Some(name) = path.file_name() else {
            return Err(PipelineError::ConfigError(format!(
                "node '{}' declares output {:?} without a file name",
                description, path
            )));
        };
        if let Some(previous) = seen.insert(name, path) {
            return Err(PipelineError::ConfigError(format!(
                "node '{}' declares outputs {:?} and {:?} with the same file name",
                description, previous, path
            )));
        }
    }
    Ok(())
}
