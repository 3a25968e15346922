// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use crate::dag::node_info::NodeState;
use crate::dag::validate;
use crate::errors::{PipelineError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::node::{Node, NodeId, SystemVersionQuery, VersionQuery};

/// Validated dependency graph over a set of nodes.
///
/// Edge direction: predecessor -> dependent. A node's predecessors are
/// - its declared dependencies,
/// - its sub-nodes, if it is a composite (it completes after them),
/// - for a sub-node, the dependencies of its composite parent (sub-nodes
///   only start once the parent's own dependencies are satisfied).
#[derive(Debug, Clone)]
pub struct NodeGraph {
    graph: DiGraph<NodeId, ()>,
    indices: HashMap<NodeId, NodeIndex>,
    nodes: HashMap<NodeId, Node>,
    /// Every node after all of its predecessors.
    order: Vec<NodeId>,
    /// Nodes nothing else depends on.
    top_nodes: Vec<NodeId>,
}

impl NodeGraph {
    /// Build and validate a graph against the real filesystem.
    ///
    /// Dependencies and sub-nodes of `nodes` are pulled in transitively.
    pub fn build(nodes: impl IntoIterator<Item = Node>) -> Result<Self> {
        Self::build_with_fs(nodes, &RealFileSystem)
    }

    /// Build and validate a graph, checking file existence through `fs`.
    pub fn build_with_fs(nodes: impl IntoIterator<Item = Node>, fs: &dyn FileSystem) -> Result<Self> {
        Self::build_with(nodes, fs, &SystemVersionQuery)
    }

    /// Build and validate a graph, checking file existence through `fs` and
    /// program versions through `versions`.
    ///
    /// Fails before anything runs if the graph has a cycle, two nodes claim
    /// the same output, a node consumes another node's output without
    /// depending on it, a required input is missing, an executable cannot
    /// be found, or a program is older than a node requires.
    pub fn build_with(
        nodes: impl IntoIterator<Item = Node>,
        fs: &dyn FileSystem,
        versions: &dyn VersionQuery,
    ) -> Result<Self> {
        let all = collect_nodes(nodes);
        info!(nodes = all.len(), "building node graph");

        let mut graph: DiGraph<NodeId, ()> = DiGraph::with_capacity(all.len(), all.len());
        let mut indices = HashMap::with_capacity(all.len());
        for node in &all {
            indices.insert(node.id(), graph.add_node(node.id()));
        }

        for node in &all {
            let this = indices[&node.id()];
            for dep in node.dependencies() {
                graph.update_edge(indices[&dep.id()], this, ());
            }
            for sub in node.subnodes() {
                let sub_ix = indices[&sub.id()];
                graph.update_edge(sub_ix, this, ());
                for dep in node.dependencies() {
                    graph.update_edge(indices[&dep.id()], sub_ix, ());
                }
            }
        }

        let nodes: HashMap<NodeId, Node> = all.iter().map(|n| (n.id(), n.clone())).collect();

        if let Some(cycle) = find_cycle(&graph) {
            let mut names: Vec<String> = cycle
                .iter()
                .map(|ix| nodes[&graph[*ix]].description().to_string())
                .collect();
            if let Some(first) = names.first().cloned() {
                names.push(first);
            }
            return Err(PipelineError::Cycle { nodes: names });
        }

        debug!("checking output files");
        validate::check_output_conflicts(&all, fs)?;
        debug!("checking input files");
        validate::check_input_files(&all, &graph, &indices, fs)?;
        debug!("checking required executables");
        validate::check_executables(&all, fs)?;
        debug!("checking version requirements");
        validate::check_version_requirements(&all, versions)?;

        let order: Vec<NodeId> = toposort(&graph, None)
            .map_err(|cycle| PipelineError::Cycle {
                nodes: vec![nodes[&graph[cycle.node_id()]].description().to_string()],
            })?
            .into_iter()
            .map(|ix| graph[ix])
            .collect();

        let top_nodes = order
            .iter()
            .copied()
            .filter(|id| {
                graph
                    .neighbors_directed(indices[id], Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect();

        Ok(Self {
            graph,
            indices,
            nodes,
            order,
            top_nodes,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Node ids in topological order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// All nodes, each after all of its predecessors.
    pub fn iter_topological(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().map(move |id| &self.nodes[id])
    }

    /// Nodes that nothing depends on (the roots of a tree view).
    pub fn top_nodes(&self) -> &[NodeId] {
        &self.top_nodes
    }

    /// Resolved direct predecessors of a node.
    pub fn dependencies_of(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct dependents of a node.
    pub fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Every node that directly or indirectly depends on `id`.
    pub fn transitive_dependents(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = self.dependents_of(id);
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependents_of(next));
            }
        }
        let mut out: Vec<NodeId> = seen.into_iter().collect();
        out.sort();
        out
    }

    /// Full transitive sub-node set of a composite (empty for simple nodes).
    ///
    /// Only used for reporting; scheduling works on the resolved edges.
    pub fn flatten_subnodes(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut stack: Vec<&Node> = node.subnodes().iter().collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next.id()) {
                stack.extend(next.subnodes());
            }
        }
        let mut out: Vec<NodeId> = seen.into_iter().collect();
        out.sort();
        out
    }

    /// (running, done, total) over the flattened sub-nodes of `id`, for
    /// rendering a composite as one line.
    pub fn subnode_summary(
        &self,
        id: NodeId,
        states: &HashMap<NodeId, NodeState>,
    ) -> (usize, usize, usize) {
        let subnodes = self.flatten_subnodes(id);
        let count = |wanted: NodeState| {
            subnodes
                .iter()
                .filter(|s| states.get(*s) == Some(&wanted))
                .count()
        };
        (
            count(NodeState::Running),
            count(NodeState::Done),
            subnodes.len(),
        )
    }

    fn neighbors(&self, id: NodeId, dir: Direction) -> Vec<NodeId> {
        let Some(ix) = self.indices.get(&id) else {
            return Vec::new();
        };
        let mut out: Vec<NodeId> = self
            .graph
            .neighbors_directed(*ix, dir)
            .map(|n| self.graph[n])
            .collect();
        out.sort();
        out
    }
}

/// Gather `roots` plus everything reachable through dependencies and
/// sub-nodes, ordered by construction.
fn collect_nodes(roots: impl IntoIterator<Item = Node>) -> Vec<Node> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<Node> = roots.into_iter().collect();

    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        stack.extend(node.dependencies().iter().cloned());
        stack.extend(node.subnodes().iter().cloned());
        out.push(node);
    }

    out.sort_by_key(|n| n.id());
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    InProgress,
    Finished,
}

/// Depth-first search with three-colour marking. Returns the members of
/// the first cycle found, in edge order.
fn find_cycle(graph: &DiGraph<NodeId, ()>) -> Option<Vec<NodeIndex>> {
    let mut color = vec![Color::Unvisited; graph.node_count()];

    for start in graph.node_indices() {
        if color[start.index()] != Color::Unvisited {
            continue;
        }

        color[start.index()] = Color::InProgress;
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> =
            vec![(start, graph.neighbors(start).collect())];

        loop {
            let Some((current, pending)) = stack.last_mut() else {
                break;
            };
            let current = *current;

            match pending.pop() {
                Some(next) => match color[next.index()] {
                    Color::Unvisited => {
                        color[next.index()] = Color::InProgress;
                        stack.push((next, graph.neighbors(next).collect()));
                    }
                    Color::InProgress => {
                        let pos = stack
                            .iter()
                            .position(|(ix, _)| *ix == next)
                            .unwrap_or(0);
                        return Some(stack[pos..].iter().map(|(ix, _)| *ix).collect());
                    }
                    Color::Finished => {}
                },
                None => {
                    color[current.index()] = Color::Finished;
                    stack.pop();
                }
            }
        }
    }

    None
}
