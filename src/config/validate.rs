// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipelineError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.node))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_global_config(cfg)?;
    validate_node_references(cfg)?;
    validate_graph(cfg)?;
    Ok(())
}

fn ensure_has_nodes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [node.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_threads == Some(0) {
        return Err(PipelineError::ConfigError(
            "[config].max_threads must be >= 1 (got 0)".to_string(),
        ));
    }

    for (name, node) in cfg.node.iter() {
        if node.threads == 0 {
            return Err(PipelineError::ConfigError(format!(
                "node '{}' must use at least one thread (got 0)",
                name
            )));
        }
    }

    Ok(())
}

fn validate_node_references(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        let refs = node
            .after
            .iter()
            .map(|r| ("after", r))
            .chain(node.subnodes.iter().map(|r| ("subnodes", r)));

        for (field, target) in refs {
            if !cfg.node.contains_key(target) {
                return Err(PipelineError::ConfigError(format!(
                    "node '{}' has unknown node '{}' in `{}`",
                    name, target, field
                )));
            }
            if target == name {
                return Err(PipelineError::ConfigError(format!(
                    "node '{}' cannot refer to itself in `{}`",
                    name, field
                )));
            }
        }
    }
    Ok(())
}

fn validate_graph(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: prerequisite -> node. For
    //   [node.B]
    //   after = ["A"]
    // we add edge A -> B; sub-nodes point at their composite.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.node.keys() {
        graph.add_node(name.as_str());
    }

    for (name, node) in cfg.node.iter() {
        for dep in node.after.iter().chain(node.subnodes.iter()) {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(PipelineError::Cycle {
            nodes: vec![cycle.node_id().to_string()],
        }),
    }
}
