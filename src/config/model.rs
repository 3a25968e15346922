// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

use crate::types::FailurePolicy;

/// Top-level pipeline file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// max_threads = 4
/// failure_policy = "keep_going"
///
/// [node.index]
/// cmd = "bwa index {IN_0}"
/// inputs = ["ref.fa"]
/// outputs = ["ref.fa.bwt"]
///
/// [node.align]
/// cmd = ["bwa mem {IN_0} reads.fq > {OUT_0}"]
/// inputs = ["ref.fa"]
/// outputs = ["aln.sam"]
/// auxiliary = ["ref.fa.bwt"]
/// after = ["index"]
/// executables = ["bwa"]
/// requirements = [
///     { name = "bwa", call = ["bwa"], search = 'Version: (\d+)\.(\d+)', min_version = "0.7" },
/// ]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Global options from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All nodes from `[node.<name>]`, keyed by name.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,
}

/// A validated pipeline file. Obtain one through `ConfigFile::try_from`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub node: BTreeMap<String, NodeConfig>,
}

impl ConfigFile {
    /// Assemble a config without running validation.
    pub(crate) fn new_unchecked(config: ConfigSection, node: BTreeMap<String, NodeConfig>) -> Self {
        Self { config, node }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Upper bound on the summed `threads` of running nodes. Defaults to the
    /// number of available CPUs.
    #[serde(default)]
    pub max_threads: Option<usize>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Where per-node scratch directories are created. Defaults to the
    /// system temp directory.
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Human-readable description; the node name is used if absent.
    #[serde(default)]
    pub description: Option<String>,

    /// Shell command(s), run in order. A single string is accepted too.
    #[serde(default, deserialize_with = "one_or_many")]
    pub cmd: Vec<String>,

    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    #[serde(default)]
    pub outputs: Vec<PathBuf>,

    /// Files that must exist but are not tracked for staleness.
    #[serde(default)]
    pub auxiliary: Vec<PathBuf>,

    /// Programs that must be found (on `PATH` unless given as a path).
    #[serde(default)]
    pub executables: Vec<String>,

    /// Minimum versions of external programs.
    #[serde(default)]
    pub requirements: Vec<RequirementConfig>,

    /// Dependency list: this node waits for all nodes listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Makes this a composite node over the listed nodes.
    #[serde(default)]
    pub subnodes: Vec<String>,

    #[serde(default = "default_threads")]
    pub threads: usize,
}

/// One entry of a node's `requirements` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequirementConfig {
    pub name: String,

    /// Version command and its arguments; run without a shell.
    pub call: Vec<String>,

    /// Regex whose capture groups are the version's numeric parts.
    pub search: String,

    /// Dotted minimum version, e.g. `"1.9"`.
    pub min_version: String,

    /// Higher priorities are checked first.
    #[serde(default)]
    pub priority: i32,
}

fn default_threads() -> usize {
    1
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(cmd) => vec![cmd],
        OneOrMany::Many(cmds) => cmds,
    })
}
