// tests/config_loading.rs

mod common;

use std::error::Error;
use std::path::{Path, PathBuf};

use pipegraph::config::{
    ConfigFile, RawConfigFile, config_base_dir, load_and_validate, load_from_path, nodes_from_config,
};
use pipegraph::errors::PipelineError;
use pipegraph::types::FailurePolicy;
use pipegraph_test_utils::builders::{ConfigFileBuilder, NodeConfigBuilder};
use pipegraph_test_utils::fixture::Fixture;

use crate::common::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn parse(text: &str) -> Result<ConfigFile, PipelineError> {
    let raw: RawConfigFile = toml::from_str(text)?;
    ConfigFile::try_from(raw)
}

fn config_error(result: Result<ConfigFile, PipelineError>) -> String {
    match result {
        Err(PipelineError::ConfigError(msg)) => msg,
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn parses_full_pipeline_file() -> TestResult {
    init_tracing();
    let cfg = parse(
        r#"
[config]
max_threads = 3
failure_policy = "fail_fast"
temp_root = "/scratch"

[node.index]
description = "index reference"
cmd = "bwa index {IN_0}"
inputs = ["ref.fa"]
outputs = ["ref.fa.bwt"]
executables = ["bwa"]

[node.align]
cmd = ["bwa mem {IN_0} reads.fq > {OUT_0}", "touch {TEMP_DIR}/done"]
inputs = ["ref.fa"]
outputs = ["aln.sam"]
auxiliary = ["ref.fa.bwt"]
after = ["index"]
threads = 2
"#,
    )?;

    assert_eq!(cfg.config.max_threads, Some(3));
    assert_eq!(cfg.config.failure_policy, FailurePolicy::FailFast);
    assert_eq!(cfg.config.temp_root.as_deref(), Some(Path::new("/scratch")));

    let index = &cfg.node["index"];
    assert_eq!(index.description.as_deref(), Some("index reference"));
    assert_eq!(index.cmd, vec!["bwa index {IN_0}"]);
    assert_eq!(index.threads, 1);

    let align = &cfg.node["align"];
    assert_eq!(align.cmd.len(), 2);
    assert_eq!(align.after, vec!["index"]);
    assert_eq!(align.auxiliary, vec![PathBuf::from("ref.fa.bwt")]);
    assert_eq!(align.threads, 2);
    Ok(())
}

#[test]
fn defaults_apply_when_config_section_is_absent() -> TestResult {
    let cfg = parse("[node.only]\ncmd = \"true\"\n")?;
    assert_eq!(cfg.config.max_threads, None);
    assert_eq!(cfg.config.failure_policy, FailurePolicy::KeepGoing);
    assert!(cfg.node["only"].inputs.is_empty());
    Ok(())
}

#[test]
fn unknown_keys_are_rejected() {
    let err = parse("[node.a]\ncmd = \"true\"\ncommand = \"oops\"\n").unwrap_err();
    assert!(matches!(err, PipelineError::TomlError(_)), "{err:?}");
}

#[test]
fn empty_pipeline_is_rejected() {
    let msg = config_error(parse("[config]\nmax_threads = 2\n"));
    assert!(msg.contains("at least one [node.<name>]"));
}

#[test]
fn zero_threads_are_rejected() {
    let msg = config_error(parse("[config]\nmax_threads = 0\n[node.a]\ncmd = \"true\"\n"));
    assert!(msg.contains("max_threads"));

    let msg = config_error(parse("[node.a]\ncmd = \"true\"\nthreads = 0\n"));
    assert!(msg.contains("node 'a'"));
}

#[test]
fn unknown_references_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_node("a", NodeConfigBuilder::new("true").after("missing").build())
        .build_raw();
    let msg = config_error(ConfigFile::try_from(raw));
    assert_eq!(msg, "node 'a' has unknown node 'missing' in `after`");

    let raw = ConfigFileBuilder::new()
        .with_node("group", NodeConfigBuilder::empty().subnode("ghost").build())
        .build_raw();
    let msg = config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("`subnodes`"));
}

#[test]
fn self_reference_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_node("a", NodeConfigBuilder::new("true").after("a").build())
        .build_raw();
    let msg = config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("cannot refer to itself"));
}

#[test]
fn cycles_between_nodes_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_node("a", NodeConfigBuilder::new("true").after("c").build())
        .with_node("b", NodeConfigBuilder::new("true").after("a").build())
        .with_node("c", NodeConfigBuilder::new("true").after("b").build())
        .build_raw();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, PipelineError::Cycle { .. }), "{err:?}");
}

#[test]
fn nodes_are_built_with_dependencies_and_resolved_paths() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_node(
            "a",
            NodeConfigBuilder::new("echo a > {OUT_0}")
                .output("a.txt")
                .executable("sh")
                .executable("bin/tool")
                .build(),
        )
        .with_node(
            "b",
            NodeConfigBuilder::new("cp {IN_0} {OUT_0}")
                .description("copy a")
                .input("a.txt")
                .output("/abs/b.txt")
                .after("a")
                .threads(2)
                .build(),
        )
        .build();

    let nodes = nodes_from_config(&cfg, Path::new("/work"))?;
    let a = &nodes["a"];
    let b = &nodes["b"];

    assert_eq!(b.description(), "copy a");
    assert_eq!(b.threads(), 2);
    assert_eq!(b.dependencies(), std::slice::from_ref(a));
    assert!(a.output_files().contains(Path::new("/work/a.txt")));
    assert!(b.input_files().contains(Path::new("/work/a.txt")));
    assert!(b.output_files().contains(Path::new("/abs/b.txt")));
    assert!(a.executables().contains("sh"));
    assert!(a.executables().contains("/work/bin/tool"));
    Ok(())
}

#[test]
fn subnodes_become_composites() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_node("lane1", NodeConfigBuilder::new("true").build())
        .with_node("lane2", NodeConfigBuilder::new("true").build())
        .with_node(
            "library",
            NodeConfigBuilder::empty().subnode("lane1").subnode("lane2").build(),
        )
        .build();

    let nodes = nodes_from_config(&cfg, Path::new("."))?;
    let library = &nodes["library"];
    assert!(library.is_composite());
    let subs: Vec<&str> = library.subnodes().iter().map(|n| n.description()).collect();
    assert_eq!(subs, vec!["lane1", "lane2"]);
    Ok(())
}

#[test]
fn version_requirements_are_read_from_nodes() -> TestResult {
    let cfg = parse(
        r#"
[node.sort]
cmd = "samtools sort -o {OUT_0} {IN_0}"
inputs = ["aln.bam"]
outputs = ["sorted.bam"]
requirements = [
    { name = "samtools", call = ["samtools", "--version"], search = 'samtools (\d+)\.(\d+)', min_version = "1.9", priority = 5 },
]
"#,
    )?;

    let nodes = nodes_from_config(&cfg, Path::new("/work"))?;
    let reqs = nodes["sort"].requirements();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].name(), "samtools");
    assert_eq!(reqs[0].call(), ["samtools", "--version"]);
    assert_eq!(reqs[0].minimum().parts(), [1, 9]);
    assert_eq!(reqs[0].priority(), 5);
    Ok(())
}

#[test]
fn malformed_version_requirements_are_rejected() -> TestResult {
    let cfg = parse(
        r#"
[node.sort]
cmd = "true"
requirements = [{ name = "samtools", call = ["samtools"], search = '(\d+)', min_version = "one" }]
"#,
    )?;

    let err = nodes_from_config(&cfg, Path::new("/work")).unwrap_err();
    assert!(err.to_string().contains("invalid version"), "{err}");
    Ok(())
}

#[test]
fn run_options_come_from_config_section() {
    let cfg = ConfigFileBuilder::new()
        .with_node("a", NodeConfigBuilder::new("true").build())
        .max_threads(6)
        .failure_policy(FailurePolicy::FailFast)
        .temp_root("scratch")
        .build();

    let opts = cfg.run_options(Path::new("/project"));
    assert_eq!(opts.max_threads, 6);
    assert_eq!(opts.failure_policy, FailurePolicy::FailFast);
    assert_eq!(opts.temp_root, PathBuf::from("/project/scratch"));
}

#[test]
fn files_load_from_disk() -> TestResult {
    let fx = Fixture::new();
    let path = fx.write("sub/Pipeline.toml", "[node.a]\ncmd = \"true\"\nafter = [\"nope\"]\n");

    let raw = load_from_path(&path)?;
    assert_eq!(raw.node.len(), 1);
    assert!(matches!(
        load_and_validate(&path),
        Err(PipelineError::ConfigError(_))
    ));
    assert_eq!(config_base_dir(&path), fx.path("sub"));
    assert_eq!(config_base_dir(Path::new("Pipeline.toml")), PathBuf::from("."));

    let missing = load_from_path(fx.path("nope.toml")).unwrap_err();
    assert!(matches!(missing, PipelineError::IoError(_)));
    Ok(())
}
