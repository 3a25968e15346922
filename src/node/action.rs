// src/node/action.rs

//! The hook a node runs when the scheduler dispatches it.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::watch;

use crate::errors::NodeError;

/// Work performed by a node.
///
/// The action is always invoked with a private scratch directory (see
/// [`NodeContext::scratch_dir`]) and must write every declared output there,
/// under the output's file name. The runner moves those files to their final
/// locations only after the action returns `Ok`.
pub trait NodeAction: Send + Sync + fmt::Debug {
    fn run<'a>(
        &'a self,
        ctx: &'a NodeContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), NodeError>> + Send + 'a>>;
}

/// Everything an action gets to see while it runs.
#[derive(Debug, Clone)]
pub struct NodeContext {
    description: String,
    scratch_dir: PathBuf,
    input_files: Vec<PathBuf>,
    output_files: Vec<PathBuf>,
    cancel: watch::Receiver<bool>,
}

impl NodeContext {
    pub fn new(
        description: impl Into<String>,
        scratch_dir: impl Into<PathBuf>,
        input_files: Vec<PathBuf>,
        output_files: Vec<PathBuf>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            description: description.into(),
            scratch_dir: scratch_dir.into(),
            input_files,
            output_files,
            cancel,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Declared inputs, in sorted order.
    pub fn input_files(&self) -> &[PathBuf] {
        &self.input_files
    }

    /// Declared final output paths, in sorted order.
    pub fn output_files(&self) -> &[PathBuf] {
        &self.output_files
    }

    /// Where the action must write the output that ends up at `final_path`.
    pub fn staged_path(&self, final_path: &Path) -> PathBuf {
        match final_path.file_name() {
            Some(name) => self.scratch_dir.join(name),
            None => self.scratch_dir.join(final_path),
        }
    }

    /// Staged locations of all outputs, in the same order as
    /// [`NodeContext::output_files`].
    pub fn staged_outputs(&self) -> Vec<PathBuf> {
        self.output_files
            .iter()
            .map(|p| self.staged_path(p))
            .collect()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the run has been asked to stop. Never resolves if the
    /// stop signal can no longer be sent.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        let sender_gone = rx.wait_for(|stop| *stop).await.is_err();
        if sender_gone {
            std::future::pending::<()>().await;
        }
    }
}

/// In-process action backed by a closure.
///
/// The closure runs on the node's worker task and should not block for long.
pub struct FnAction<F> {
    name: &'static str,
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn(&NodeContext) -> Result<(), NodeError> + Send + Sync,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

impl<F> NodeAction for FnAction<F>
where
    F: Fn(&NodeContext) -> Result<(), NodeError> + Send + Sync,
{
    fn run<'a>(
        &'a self,
        ctx: &'a NodeContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), NodeError>> + Send + 'a>> {
        Box::pin(async move {
            if ctx.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            (self.f)(ctx)
        })
    }
}
