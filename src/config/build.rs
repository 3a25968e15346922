// src/config/build.rs

//! Turn a validated pipeline file into nodes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::config::model::{ConfigFile, NodeConfig, RequirementConfig};
use crate::errors::{PipelineError, Result};
use crate::exec::AtomicCommand;
use crate::node::{Node, NodeBuilder, Requirement, Version};
use crate::pipeline::RunOptions;

/// Build one [`Node`] per `[node.<name>]` section, keyed by name.
///
/// Relative file paths (and executables given as a path) are resolved
/// against `base_dir`.
pub fn nodes_from_config(cfg: &ConfigFile, base_dir: &Path) -> Result<BTreeMap<String, Node>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.node.keys() {
        graph.add_node(name.as_str());
    }
    for (name, node) in cfg.node.iter() {
        for dep in node.after.iter().chain(node.subnodes.iter()) {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| PipelineError::Cycle {
        nodes: vec![cycle.node_id().to_string()],
    })?;

    let mut built: BTreeMap<String, Node> = BTreeMap::new();
    for name in order {
        let Some(node_cfg) = cfg.node.get(name) else {
            continue;
        };
        let node = build_node(name, node_cfg, &built, base_dir)?;
        debug!(node = %name, id = %node.id(), "built node from config");
        built.insert(name.to_string(), node);
    }

    Ok(built)
}

fn build_node(
    name: &str,
    cfg: &NodeConfig,
    built: &BTreeMap<String, Node>,
    base_dir: &Path,
) -> Result<Node> {
    let lookup = |other: &String| {
        built.get(other).cloned().ok_or_else(|| {
            PipelineError::ConfigError(format!("node '{name}' refers to unknown node '{other}'"))
        })
    };

    let description = cfg.description.clone().unwrap_or_else(|| name.to_string());
    let mut builder: NodeBuilder = if cfg.subnodes.is_empty() {
        Node::builder(description)
    } else {
        let subnodes = cfg.subnodes.iter().map(lookup).collect::<Result<Vec<_>>>()?;
        Node::composite(description, subnodes)
    };

    let dependencies = cfg.after.iter().map(lookup).collect::<Result<Vec<_>>>()?;

    builder = builder
        .inputs(cfg.inputs.iter().map(|p| resolve(base_dir, p)))
        .outputs(cfg.outputs.iter().map(|p| resolve(base_dir, p)))
        .dependencies(dependencies.iter())
        .threads(cfg.threads);

    for path in &cfg.auxiliary {
        builder = builder.auxiliary(resolve(base_dir, path));
    }
    for exe in &cfg.executables {
        builder = builder.executable(resolve_executable(base_dir, exe));
    }
    for req in &cfg.requirements {
        builder = builder.requirement(build_requirement(name, req)?);
    }
    for cmd in &cfg.cmd {
        builder = builder.command(AtomicCommand::new(cmd.clone()));
    }

    builder.build()
}

fn build_requirement(node: &str, cfg: &RequirementConfig) -> Result<Requirement> {
    let minimum: Version = cfg.min_version.parse().map_err(|_| {
        PipelineError::ConfigError(format!(
            "node '{node}': requirement '{}' has invalid version {:?}",
            cfg.name, cfg.min_version
        ))
    })?;
    Ok(Requirement::new(&cfg.name, cfg.call.iter().cloned(), &cfg.search, minimum)?
        .with_priority(cfg.priority))
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Bare program names stay bare so they are looked up on `PATH`.
fn resolve_executable(base_dir: &Path, exe: &str) -> String {
    if exe.contains(std::path::MAIN_SEPARATOR) || exe.contains('/') {
        resolve(base_dir, Path::new(exe)).to_string_lossy().into_owned()
    } else {
        exe.to_string()
    }
}

impl ConfigFile {
    /// Run options from `[config]`, with scratch directories below
    /// `temp_root` resolved against `base_dir`.
    pub fn run_options(&self, base_dir: &Path) -> RunOptions {
        let defaults = RunOptions::default();
        RunOptions {
            max_threads: self.config.max_threads.unwrap_or(defaults.max_threads),
            failure_policy: self.config.failure_policy,
            temp_root: self
                .config
                .temp_root
                .as_deref()
                .map_or(defaults.temp_root, |root| resolve(base_dir, root)),
        }
    }
}
