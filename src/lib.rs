// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod node;
pub mod observer;
pub mod pipeline;
pub mod report;
pub mod types;

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{config_base_dir, load_and_validate, nodes_from_config};
use crate::dag::NodeState;
use crate::node::Node;
use crate::observer::LoggingObserver;
use crate::types::FailurePolicy;

pub use crate::dag::{NodeGraph, Scheduler, SchedulerOptions};
pub use crate::errors::{NodeError, PipelineError};
pub use crate::node::{NodeBuilder, NodeId};
pub use crate::pipeline::{Pipeline, RunOptions};
pub use crate::report::RunReport;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline file loading
/// - node construction and graph validation
/// - scheduler / runtime / executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading pipeline file {:?}", args.config))?;

    let base_dir = std::path::absolute(config_base_dir(&args.config))
        .context("resolving pipeline directory")?;
    let nodes = nodes_from_config(&cfg, &base_dir)?;

    let mut options = cfg.run_options(&base_dir);
    if let Some(max_threads) = args.max_threads {
        options.max_threads = max_threads;
    }
    if args.fail_fast {
        options.failure_policy = FailurePolicy::FailFast;
    }
    info!(
        nodes = nodes.len(),
        max_threads = options.max_threads,
        policy = ?options.failure_policy,
        temp_root = ?options.temp_root,
        "pipeline loaded"
    );

    let mut pipeline = Pipeline::new(options);
    pipeline.add_nodes(nodes.values().cloned());

    if args.dry_run {
        let states = pipeline.dry_run()?;
        print_dry_run(&pipeline, &states)?;
        return Ok(());
    }

    // Ctrl-C → graceful stop.
    {
        let stop = pipeline.stop_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; stopping");
            stop.stop().await;
        });
    }

    let report = pipeline.run(Box::new(LoggingObserver::new())).await?;
    print!("{report}");

    if report.stopped {
        bail!("pipeline stopped before completion");
    }
    if !report.is_success() {
        bail!(
            "{} node(s) failed, {} skipped",
            report.failed,
            report.skipped
        );
    }
    Ok(())
}

/// Dry-run output: every node with its initial state.
fn print_dry_run(pipeline: &Pipeline, states: &[(Node, NodeState)]) -> Result<()> {
    let graph = pipeline.build_graph()?;
    let by_id: HashMap<NodeId, NodeState> = states.iter().map(|(n, s)| (n.id(), *s)).collect();

    println!("pipegraph dry-run");
    println!("  max_threads = {}", pipeline.options().max_threads);
    println!("  failure_policy = {:?}", pipeline.options().failure_policy);
    println!();

    println!("nodes ({}):", states.len());
    for (node, state) in states {
        let label = state.to_string();
        println!("  [{label:>8}] {}", node.description());
        if node.is_composite() {
            let (running, done, total) = graph.subnode_summary(node.id(), &by_id);
            println!("      subnodes: {done}/{total} done, {running} running");
        }
        for output in node.output_files() {
            println!("      -> {}", output.display());
        }
    }

    let to_run = states.iter().filter(|(_, s)| s.is_pending()).count();
    println!();
    println!("{to_run} node(s) would run");

    debug!("dry-run complete (no execution)");
    Ok(())
}
