// src/engine/runtime.rs

use std::fmt;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledNode;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::report::RunReport;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Drives the scheduler in response to `RuntimeEvent`s, and delegates
/// actual node execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels and dispatching nodes to the executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches the initial ready set.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the
    ///   core runtime.
    /// - Executes commands returned by the core (dispatch, cancel).
    ///
    /// Returns once every node is in a terminal state.
    pub async fn run(mut self) -> Result<RunReport> {
        info!("pipeline runtime started");

        let step = self.core.start();
        let mut keep_running = step.keep_running;
        for command in step.commands {
            self.execute_command(command).await?;
        }

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    let running = self.core.scheduler().running_count();
                    warn!(running, "runtime event channel closed before the run finished");
                    return Err(anyhow!(
                        "runtime event channel closed with {running} node(s) still running"
                    )
                    .into());
                }
            };

            debug!(?event, "runtime received event");

            // Feed the event into the pure core and get commands back.
            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            keep_running = step.keep_running;
        }

        let report = self.core.report();
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            stopped = report.stopped,
            "runtime exiting"
        );
        Ok(report)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchNodes(nodes) => {
                self.spawn_ready(nodes).await?;
            }
            CoreCommand::CancelRunning => {
                info!(
                    running = self.core.scheduler().running_count(),
                    "cancelling running nodes"
                );
                self.executor.cancel_running().await?;
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, nodes: Vec<ScheduledNode>) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = nodes.iter().map(|n| n.description()).collect();
        debug!(?names, "spawning ready nodes");

        self.executor.spawn_ready_nodes(nodes).await
    }
}
