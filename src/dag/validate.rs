// src/dag/validate.rs

//! File-level checks run while building a [`super::NodeGraph`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::errors::{PipelineError, Result};
use crate::fs::{FileSystem, find_executable};
use crate::node::{Node, NodeId, Requirement, VersionQuery};

/// Max number of error messages of each kind.
const MAX_ERROR_MESSAGES: usize = 10;

/// No two nodes may create the same output file.
///
/// The directory part of each path is canonicalised first, so the same file
/// reached through a relative path, `..` or a symlinked directory still
/// collides. The file itself does not need to exist.
pub fn check_output_conflicts(nodes: &[Node], fs: &dyn FileSystem) -> Result<()> {
    let mut dir_cache: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut owners: HashMap<PathBuf, &Node> = HashMap::new();

    for node in nodes {
        for path in node.output_files() {
            let key = real_output_path(path, fs, &mut dir_cache);
            match owners.get(&key) {
                Some(first) if first.id() != node.id() => {
                    return Err(PipelineError::ConflictingOutputs {
                        path: path.clone(),
                        first: first.description().to_string(),
                        second: node.description().to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    owners.insert(key, node);
                }
            }
        }
    }

    Ok(())
}

fn real_output_path(
    path: &Path,
    fs: &dyn FileSystem,
    dir_cache: &mut HashMap<PathBuf, PathBuf>,
) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let Some(name) = path.file_name() else {
        return path.to_path_buf();
    };

    let real_dir = dir_cache
        .entry(parent.to_path_buf())
        .or_insert_with(|| fs.canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf()));
    real_dir.join(name)
}

/// Every input (and auxiliary file) must either be produced by a node the
/// consumer depends on, or already exist.
///
/// Producers are matched on the same canonical paths as
/// [`check_output_conflicts`] uses.
pub fn check_input_files(
    nodes: &[Node],
    graph: &DiGraph<NodeId, ()>,
    indices: &HashMap<NodeId, NodeIndex>,
    fs: &dyn FileSystem,
) -> Result<()> {
    let mut dir_cache: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut producers: HashMap<PathBuf, &Node> = HashMap::new();
    for node in nodes {
        for path in node.output_files() {
            producers.insert(real_output_path(path, fs, &mut dir_cache), node);
        }
    }

    let mut undeclared: BTreeMap<&Path, (&Node, BTreeSet<String>)> = BTreeMap::new();
    let mut missing: BTreeMap<&Path, BTreeSet<String>> = BTreeMap::new();

    for consumer in nodes {
        let required = consumer
            .input_files()
            .iter()
            .chain(consumer.auxiliary_files().iter());

        for path in required {
            let key = real_output_path(path, fs, &mut dir_cache);
            match producers.get(&key) {
                Some(producer) if producer.id() == consumer.id() => {}
                Some(producer) => {
                    let from = indices[&producer.id()];
                    let to = indices[&consumer.id()];
                    if !has_path_connecting(graph, from, to, None) {
                        undeclared
                            .entry(path.as_path())
                            .or_insert_with(|| (*producer, BTreeSet::new()))
                            .1
                            .insert(consumer.description().to_string());
                    }
                }
                None => {
                    // Stat failures are left for the staleness checks to report.
                    if matches!(fs.stat(path), Ok(None)) {
                        missing
                            .entry(path.as_path())
                            .or_default()
                            .insert(consumer.description().to_string());
                    }
                }
            }
        }
    }

    if !undeclared.is_empty() {
        let messages: Vec<String> = undeclared
            .into_iter()
            .take(MAX_ERROR_MESSAGES)
            .map(|(path, (producer, consumers))| {
                format!(
                    "\tFilename: {}\n\tCreated by: {}\n\tDependent node(s): {}",
                    path.display(),
                    producer.description(),
                    summarize_nodes(consumers).join("\n\t                   ")
                )
            })
            .collect();
        return Err(PipelineError::UndeclaredDependency(messages.join("\n")));
    }

    if !missing.is_empty() {
        let messages: Vec<String> = missing
            .into_iter()
            .take(MAX_ERROR_MESSAGES)
            .map(|(path, consumers)| {
                format!(
                    "\tFilename: {}\n\tDependent node(s): {}",
                    path.display(),
                    summarize_nodes(consumers).join("\n\t                   ")
                )
            })
            .collect();
        return Err(PipelineError::MissingInputs(messages.join("\n")));
    }

    Ok(())
}

/// Every declared executable must be resolvable.
pub fn check_executables(nodes: &[Node], fs: &dyn FileSystem) -> Result<()> {
    let wanted: BTreeSet<&str> = nodes
        .iter()
        .flat_map(|n| n.executables().iter().map(String::as_str))
        .collect();

    let missing: Vec<&str> = wanted
        .into_iter()
        .filter(|name| find_executable(fs, name).is_none())
        .take(MAX_ERROR_MESSAGES)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingExecutables(format!(
            "\t{}",
            missing.join("\n\t")
        )))
    }
}

/// Every version requirement must be met. Requirements shared by several
/// nodes are checked once, highest priority first, then by name; each
/// distinct version command runs at most once.
pub fn check_version_requirements(nodes: &[Node], versions: &dyn VersionQuery) -> Result<()> {
    let mut seen: HashSet<&Requirement> = HashSet::new();
    let mut requirements: Vec<&Requirement> = nodes
        .iter()
        .flat_map(|n| n.requirements())
        .filter(|req| seen.insert(*req))
        .collect();
    requirements.sort_by(|a, b| {
        b.priority()
            .cmp(&a.priority())
            .then_with(|| a.name().cmp(b.name()))
    });

    let mut outputs: HashMap<&[String], std::result::Result<String, String>> = HashMap::new();
    let mut failures: Vec<String> = Vec::new();

    for req in requirements {
        let output = outputs.entry(req.call()).or_insert_with(|| {
            debug!(program = req.name(), call = ?req.call(), "querying version");
            versions.output(req.call()).map_err(|e| e.to_string())
        });
        let result = match output {
            Ok(text) => req.check(text),
            Err(e) => Err(format!("could not check version for {}: {e}", req.name())),
        };
        match result {
            Ok(found) => debug!(program = req.name(), version = %found, "version requirement met"),
            Err(message) => failures.push(message),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        let shown: Vec<String> = failures
            .into_iter()
            .take(MAX_ERROR_MESSAGES)
            .map(|m| format!("\t{m}"))
            .collect();
        Err(PipelineError::VersionRequirement(shown.join("\n")))
    }
}

fn summarize_nodes(names: BTreeSet<String>) -> Vec<String> {
    let total = names.len();
    let mut out: Vec<String> = names.into_iter().take(5).collect();
    if total > 5 {
        out.push(format!("and {} more nodes ...", total - 5));
    }
    out
}
