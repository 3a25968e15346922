#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use pipegraph::config::{ConfigFile, ConfigSection, NodeConfig, RawConfigFile};
use pipegraph::node::Node;
use pipegraph::types::FailurePolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                node: BTreeMap::new(),
            },
        }
    }

    pub fn with_node(mut self, name: &str, node: NodeConfig) -> Self {
        self.config.node.insert(name.to_string(), node);
        self
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.config.config.max_threads = Some(n);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.config.failure_policy = policy;
        self
    }

    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.config.temp_root = Some(root.into());
        self
    }

    /// The unvalidated file, for tests of validation itself.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            node: NodeConfig {
                cmd: vec![cmd.to_string()],
                threads: 1,
                ..NodeConfig::default()
            },
        }
    }

    /// A node without commands (e.g. a composite).
    pub fn empty() -> Self {
        Self {
            node: NodeConfig {
                threads: 1,
                ..NodeConfig::default()
            },
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.node.description = Some(text.to_string());
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.node.cmd.push(cmd.to_string());
        self
    }

    pub fn input(mut self, path: &str) -> Self {
        self.node.inputs.push(PathBuf::from(path));
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.node.outputs.push(PathBuf::from(path));
        self
    }

    pub fn auxiliary(mut self, path: &str) -> Self {
        self.node.auxiliary.push(PathBuf::from(path));
        self
    }

    pub fn executable(mut self, name: &str) -> Self {
        self.node.executables.push(name.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.node.after.push(dep.to_string());
        self
    }

    pub fn subnode(mut self, name: &str) -> Self {
        self.node.subnodes.push(name.to_string());
        self
    }

    pub fn threads(mut self, n: usize) -> Self {
        self.node.threads = n;
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}

/// A node without an action, reading `inputs`, writing `outputs` and
/// depending on `deps`.
pub fn file_node(desc: &str, inputs: &[&str], outputs: &[&str], deps: &[&Node]) -> Node {
    Node::builder(desc)
        .inputs(inputs.iter().copied())
        .outputs(outputs.iter().copied())
        .dependencies(deps.iter().copied())
        .build()
        .expect("valid test node")
}

/// A node with no files at all, depending on `deps`.
pub fn bare_node(desc: &str, deps: &[&Node]) -> Node {
    file_node(desc, &[], &[], deps)
}
