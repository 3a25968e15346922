// tests/graph_validation.rs

mod common;

use std::collections::HashMap;

use pipegraph::dag::{NodeGraph, NodeState};
use pipegraph::errors::PipelineError;
use pipegraph::fs::RealFileSystem;
use pipegraph::fs::mock::MockFileSystem;
use pipegraph::node::{Node, Requirement, Version};
use pipegraph_test_utils::builders::{bare_node, file_node};
use pipegraph_test_utils::fake_versions::FakeVersions;

use crate::common::graph;

#[test]
fn two_nodes_claiming_the_same_output_are_rejected() {
    let fs = MockFileSystem::new();
    let first = file_node("mark duplicates", &[], &["/out/x.bam"], &[]);
    let second = file_node("realign", &[], &["/out/x.bam"], &[]);

    let err = NodeGraph::build_with_fs([first, second], &fs).unwrap_err();
    match err {
        PipelineError::ConflictingOutputs {
            path,
            first,
            second,
        } => {
            assert_eq!(path, std::path::Path::new("/out/x.bam"));
            let mut names = vec![first, second];
            names.sort();
            assert_eq!(names, vec!["mark duplicates", "realign"]);
        }
        other => panic!("expected ConflictingOutputs, got {other:?}"),
    }
}

#[test]
fn output_collisions_are_detected_through_relative_directories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let direct = dir.path().join("x.bam");
    let roundabout = dir.path().join("sub").join("..").join("x.bam");

    let a = Node::builder("a").output(direct).build().unwrap();
    let b = Node::builder("b").output(roundabout).build().unwrap();

    let err = NodeGraph::build_with_fs([a, b], &RealFileSystem).unwrap_err();
    assert!(matches!(err, PipelineError::ConflictingOutputs { .. }), "got {err:?}");
}

#[test]
fn output_collisions_through_dot_dot_are_detected_without_touching_disk() {
    let fs = MockFileSystem::new();
    let a = file_node("a", &[], &["/out/x.bam"], &[]);
    let b = file_node("b", &[], &["/out/tmp/../x.bam"], &[]);

    let err = NodeGraph::build_with_fs([a, b], &fs).unwrap_err();
    assert!(matches!(err, PipelineError::ConflictingOutputs { .. }), "got {err:?}");
}

#[test]
fn composite_whose_dependency_needs_a_subnode_is_a_cycle() {
    let fs = MockFileSystem::new();
    let sub = bare_node("sub", &[]);
    let dep = bare_node("dep", &[&sub]);
    let composite = Node::composite("group", [sub.clone()])
        .dependency(&dep)
        .build()
        .unwrap();

    let err = NodeGraph::build_with_fs([composite], &fs).unwrap_err();
    match err {
        PipelineError::Cycle { nodes } => {
            assert!(nodes.len() >= 3, "cycle should be closed: {nodes:?}");
            assert_eq!(nodes.first(), nodes.last());
            assert!(nodes.iter().any(|n| n == "sub"));
            assert!(nodes.iter().any(|n| n == "dep"));
        }
        other => panic!("expected Cycle, got {other:?}"),
    }
}

#[test]
fn consuming_an_output_without_depending_on_its_producer_is_rejected() {
    let fs = MockFileSystem::new();
    let producer = file_node("index", &[], &["/ref.fa.bwt"], &[]);
    let consumer = file_node("align", &["/ref.fa.bwt"], &["/aln.sam"], &[]);

    let err = NodeGraph::build_with_fs([producer, consumer], &fs).unwrap_err();
    match err {
        PipelineError::UndeclaredDependency(msg) => {
            assert!(msg.contains("/ref.fa.bwt"), "{msg}");
            assert!(msg.contains("index"), "{msg}");
            assert!(msg.contains("align"), "{msg}");
        }
        other => panic!("expected UndeclaredDependency, got {other:?}"),
    }
}

#[test]
fn transitive_dependency_on_the_producer_is_enough() {
    let fs = MockFileSystem::new();
    let a = file_node("a", &[], &["/a.txt"], &[]);
    let b = file_node("b", &[], &["/b.txt"], &[&a]);
    let c = file_node("c", &["/a.txt"], &["/c.txt"], &[&b]);

    let g = graph(&fs, &[&c]);
    assert_eq!(g.len(), 3);
}

#[test]
fn inputs_that_nobody_creates_must_exist() {
    let fs = MockFileSystem::new();
    let node = Node::builder("align")
        .input("/reads.fq")
        .auxiliary("/ref.fa")
        .output("/aln.sam")
        .build()
        .unwrap();

    let err = NodeGraph::build_with_fs([node.clone()], &fs).unwrap_err();
    match err {
        PipelineError::MissingInputs(msg) => {
            assert!(msg.contains("/reads.fq"), "{msg}");
            assert!(msg.contains("/ref.fa"), "{msg}");
        }
        other => panic!("expected MissingInputs, got {other:?}"),
    }

    fs.add_file("/reads.fq", "@r1");
    fs.add_file("/ref.fa", ">chr1");
    assert!(NodeGraph::build_with_fs([node], &fs).is_ok());
}

#[test]
fn missing_input_messages_are_capped() {
    let fs = MockFileSystem::new();
    let inputs: Vec<String> = (0..25).map(|i| format!("/missing/{i:02}.txt")).collect();
    let node = Node::builder("greedy")
        .inputs(inputs.iter().map(String::as_str))
        .build()
        .unwrap();

    let err = NodeGraph::build_with_fs([node], &fs).unwrap_err();
    let PipelineError::MissingInputs(msg) = err else {
        panic!("expected MissingInputs");
    };
    assert_eq!(msg.matches("Filename:").count(), 10);
}

#[test]
fn declared_executables_must_be_found() {
    let fs = MockFileSystem::new();
    fs.add_executable("/opt/tools/bwa");
    let ok = Node::builder("align").executable("/opt/tools/bwa").build().unwrap();
    assert!(NodeGraph::build_with_fs([ok], &fs).is_ok());

    let missing = Node::builder("call")
        .executable("/opt/tools/no-such-caller")
        .build()
        .unwrap();
    let err = NodeGraph::build_with_fs([missing], &fs).unwrap_err();
    match err {
        PipelineError::MissingExecutables(msg) => assert!(msg.contains("no-such-caller")),
        other => panic!("expected MissingExecutables, got {other:?}"),
    }
}

#[test]
fn missing_executable_messages_are_capped() {
    let fs = MockFileSystem::new();
    let mut builder = Node::builder("toolbox");
    for i in 0..12 {
        builder = builder.executable(format!("/opt/missing/tool{i:02}"));
    }
    let node = builder.build().unwrap();

    let err = NodeGraph::build_with_fs([node], &fs).unwrap_err();
    let PipelineError::MissingExecutables(msg) = err else {
        panic!("expected MissingExecutables");
    };
    assert_eq!(msg.lines().count(), 10, "{msg}");
    assert!(msg.contains("tool00"));
    assert!(!msg.contains("tool11"));
}

#[test]
fn consumer_reaching_an_output_through_dot_dot_needs_the_dependency() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("d")).unwrap();

    let producer = Node::builder("index")
        .output(dir.path().join("x"))
        .build()
        .unwrap();
    let consumer = Node::builder("align")
        .input(dir.path().join("d").join("..").join("x"))
        .output(dir.path().join("aln.sam"))
        .build()
        .unwrap();

    let err = NodeGraph::build_with_fs([producer.clone(), consumer], &RealFileSystem).unwrap_err();
    match err {
        PipelineError::UndeclaredDependency(msg) => {
            assert!(msg.contains("index"), "{msg}");
            assert!(msg.contains("align"), "{msg}");
        }
        other => panic!("expected UndeclaredDependency, got {other:?}"),
    }

    let consumer = Node::builder("align")
        .input(dir.path().join("d").join("..").join("x"))
        .output(dir.path().join("aln.sam"))
        .dependency(&producer)
        .build()
        .unwrap();
    assert!(NodeGraph::build_with_fs([consumer], &RealFileSystem).is_ok());
}

fn samtools_at_least(minimum: &[u32]) -> Requirement {
    Requirement::new(
        "samtools",
        ["samtools", "--version"],
        r"samtools (\d+)\.(\d+)",
        Version::new(minimum),
    )
    .unwrap()
}

#[test]
fn version_requirements_that_are_met_pass() {
    let fs = MockFileSystem::new();
    let versions = FakeVersions::new().with_output(&["samtools", "--version"], "samtools 1.10\n");
    let a = Node::builder("sort").requirement(samtools_at_least(&[1, 9])).build().unwrap();
    let b = Node::builder("index").requirement(samtools_at_least(&[1, 9])).build().unwrap();

    assert!(NodeGraph::build_with([a, b], &fs, &versions).is_ok());
    assert_eq!(versions.calls().len(), 1, "shared requirement queried once");
}

#[test]
fn outdated_programs_fail_graph_construction() {
    let fs = MockFileSystem::new();
    let versions = FakeVersions::new().with_output(&["samtools", "--version"], "samtools 0.1\n");
    let node = Node::builder("sort").requirement(samtools_at_least(&[1, 9])).build().unwrap();

    let err = NodeGraph::build_with([node], &fs, &versions).unwrap_err();
    match err {
        PipelineError::VersionRequirement(msg) => {
            assert!(msg.contains("samtools"), "{msg}");
            assert!(msg.contains("v0.1"), "{msg}");
            assert!(msg.contains("v1.9"), "{msg}");
        }
        other => panic!("expected VersionRequirement, got {other:?}"),
    }
}

#[test]
fn version_checks_run_by_priority_then_name() {
    let fs = MockFileSystem::new();
    let req = |name: &str, priority: i32| {
        Requirement::new(name, [name, "--version"], r"(\d+)", Version::new([1]))
            .unwrap()
            .with_priority(priority)
    };
    let versions = FakeVersions::new()
        .with_output(&["bwa", "--version"], "1")
        .with_output(&["java", "--version"], "8")
        .with_output(&["picard", "--version"], "2");
    let node = Node::builder("align")
        .requirement(req("picard", 0))
        .requirement(req("bwa", 0))
        .requirement(req("java", 10))
        .build()
        .unwrap();

    NodeGraph::build_with([node], &fs, &versions).unwrap();
    let order: Vec<String> = versions.calls().into_iter().map(|call| call[0].clone()).collect();
    assert_eq!(order, vec!["java", "bwa", "picard"]);
}

#[test]
fn unrunnable_version_commands_are_reported() {
    let fs = MockFileSystem::new();
    let versions = FakeVersions::new();
    let node = Node::builder("sort").requirement(samtools_at_least(&[1, 9])).build().unwrap();

    let err = NodeGraph::build_with([node], &fs, &versions).unwrap_err();
    let PipelineError::VersionRequirement(msg) = err else {
        panic!("expected VersionRequirement");
    };
    assert!(msg.contains("could not check version for samtools"), "{msg}");
}

#[test]
fn topological_order_puts_dependencies_first() {
    let fs = MockFileSystem::new();
    let a = bare_node("a", &[]);
    let b = bare_node("b", &[&a]);
    let c = bare_node("c", &[&a]);
    let d = bare_node("d", &[&b, &c]);

    let g = graph(&fs, &[&d]);
    let order: Vec<&str> = g.iter_topological().map(|n| n.description()).collect();
    let pos = |name: &str| order.iter().position(|n| *n == name).unwrap();

    assert_eq!(order.len(), 4);
    assert!(pos("a") < pos("b"));
    assert!(pos("a") < pos("c"));
    assert!(pos("b") < pos("d"));
    assert!(pos("c") < pos("d"));
    assert_eq!(g.top_nodes(), &[d.id()]);
}

#[test]
fn dependents_and_transitive_dependents() {
    let fs = MockFileSystem::new();
    let a = bare_node("a", &[]);
    let b = bare_node("b", &[&a]);
    let c = bare_node("c", &[&b]);
    let other = bare_node("other", &[]);

    let g = graph(&fs, &[&c, &other]);
    assert_eq!(g.dependents_of(a.id()), vec![b.id()]);
    assert_eq!(g.dependencies_of(c.id()), vec![b.id()]);

    let mut expected = vec![b.id(), c.id()];
    expected.sort();
    assert_eq!(g.transitive_dependents(a.id()), expected);
    assert!(g.transitive_dependents(other.id()).is_empty());
}

#[test]
fn subnodes_wait_for_the_composites_dependencies() {
    let fs = MockFileSystem::new();
    let setup = bare_node("setup", &[]);
    let lane1 = bare_node("lane1", &[]);
    let lane2 = bare_node("lane2", &[]);
    let library = Node::composite("library", [lane1.clone(), lane2.clone()])
        .dependency(&setup)
        .build()
        .unwrap();

    let g = graph(&fs, &[&library]);
    assert_eq!(g.dependencies_of(lane1.id()), vec![setup.id()]);

    let mut preds = vec![setup.id(), lane1.id(), lane2.id()];
    preds.sort();
    assert_eq!(g.dependencies_of(library.id()), preds);
}

#[test]
fn flatten_and_summarise_nested_composites() {
    let fs = MockFileSystem::new();
    let lane1 = bare_node("lane1", &[]);
    let lane2 = bare_node("lane2", &[]);
    let library = Node::composite("library", [lane1.clone(), lane2.clone()])
        .build()
        .unwrap();
    let sample = Node::composite("sample", [library.clone()]).build().unwrap();

    let g = graph(&fs, &[&sample]);

    let mut expected = vec![lane1.id(), lane2.id(), library.id()];
    expected.sort();
    assert_eq!(g.flatten_subnodes(sample.id()), expected);
    assert!(g.flatten_subnodes(lane1.id()).is_empty());

    let states: HashMap<_, _> = [
        (lane1.id(), NodeState::Done),
        (lane2.id(), NodeState::Running),
        (library.id(), NodeState::Runnable),
        (sample.id(), NodeState::Runnable),
    ]
    .into_iter()
    .collect();
    assert_eq!(g.subnode_summary(sample.id(), &states), (1, 1, 3));
}

#[test]
fn nodes_with_duplicate_output_file_names_are_rejected_at_construction() {
    let err = Node::builder("split")
        .output("/a/part.txt")
        .output("/b/part.txt")
        .build()
        .unwrap_err();
    assert!(matches!(err, PipelineError::ConfigError(_)), "got {err:?}");
}
