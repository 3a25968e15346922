// src/exec/command.rs

//! Shell commands wrapped by nodes.
//!
//! An [`AtomicCommand`] is one shell command line. It always runs with the
//! node's scratch directory as working directory, so anything it writes stays
//! private until the node's outputs are committed (see [`super::atomic`]).
//!
//! The command line may refer to the node's files through placeholders:
//!
//! - `{TEMP_DIR}`: the scratch directory
//! - `{IN_<n>}`: the n-th declared input (sorted order), as an absolute path
//! - `{OUT_<n>}`: the scratch location of the n-th declared output

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, LazyLock};

use anyhow::anyhow;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::errors::NodeError;
use crate::node::{NodeAction, NodeContext};

/// Number of trailing stderr lines kept for failure reports.
const DIAGNOSTIC_LINES: usize = 20;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(TEMP_DIR|IN_(\d+)|OUT_(\d+))\}").expect("placeholder regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicCommand {
    command: String,
}

impl AtomicCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// The command line as written, placeholders unexpanded.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Expand placeholders against `ctx`.
    pub fn render(&self, ctx: &NodeContext) -> Result<String, NodeError> {
        let mut rendered = String::with_capacity(self.command.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(&self.command) {
            let whole = caps.get(0).ok_or_else(|| anyhow!("empty placeholder match"))?;
            rendered.push_str(&self.command[last..whole.start()]);

            let path = if let Some(idx) = caps.get(2) {
                let input = lookup(ctx.input_files(), idx.as_str(), "IN", &self.command)?;
                std::path::absolute(input).map_err(|e| anyhow!("resolving {:?}: {e}", input))?
            } else if let Some(idx) = caps.get(3) {
                let output = lookup(ctx.output_files(), idx.as_str(), "OUT", &self.command)?;
                ctx.staged_path(output)
            } else {
                ctx.scratch_dir().to_path_buf()
            };

            rendered.push_str(&shell_quote(&path));
            last = whole.end();
        }

        rendered.push_str(&self.command[last..]);
        Ok(rendered)
    }

    /// Run the command to completion inside `ctx`'s scratch directory.
    ///
    /// Returns [`NodeError::Cancelled`] after killing the process if the run
    /// is stopped while it is executing.
    pub async fn run(&self, ctx: &NodeContext) -> Result<(), NodeError> {
        if ctx.is_cancelled() {
            return Err(NodeError::Cancelled);
        }

        let rendered = self.render(ctx)?;

        info!(
            node = %ctx.description(),
            cmd = %rendered,
            "starting process"
        );

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&rendered);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&rendered);
            c
        };

        cmd.current_dir(ctx.scratch_dir())
            .env("TEMP_DIR", ctx.scratch_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so cancelling also reaches whatever the shell
        // started.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| NodeError::Launch {
            command: rendered.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(drain_lines(out, ctx.description().to_string(), "stdout", 0)));
        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(drain_lines(
                err,
                ctx.description().to_string(),
                "stderr",
                DIAGNOSTIC_LINES,
            ))
        });

        let status = tokio::select! {
            status_res = child.wait() => {
                status_res.map_err(|e| anyhow!("waiting for `{rendered}`: {e}"))?
            }

            _ = ctx.cancelled() => {
                info!(
                    node = %ctx.description(),
                    "cancellation requested; killing process"
                );
                if let Err(e) = kill_tree(&mut child).await {
                    warn!(
                        node = %ctx.description(),
                        error = %e,
                        "failed to kill child process on cancellation"
                    );
                }
                return Err(NodeError::Cancelled);
            }
        };

        if let Some(handle) = stdout {
            let _ = handle.await;
        }
        let diagnostics = match stderr {
            Some(handle) => handle.await.map(Vec::from).unwrap_or_default(),
            None => Vec::new(),
        };

        info!(
            node = %ctx.description(),
            exit_code = status.code(),
            success = status.success(),
            "process exited"
        );

        if status.success() {
            Ok(())
        } else {
            Err(NodeError::CommandFailed {
                command: rendered,
                status: describe_status(status),
                diagnostics,
            })
        }
    }
}

impl fmt::Display for AtomicCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

/// Kill the child and every process in its group, then reap it.
#[cfg(unix)]
async fn kill_tree(child: &mut Child) -> io::Result<()> {
    if let Some(pid) = child.id() {
        let pgid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: killpg has no memory-safety preconditions.
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err);
            }
        }
    }
    child.wait().await.map(drop)
}

#[cfg(not(unix))]
async fn kill_tree(child: &mut Child) -> io::Result<()> {
    child.kill().await
}

fn lookup<'a>(
    files: &'a [std::path::PathBuf],
    idx: &str,
    kind: &str,
    command: &str,
) -> Result<&'a Path, NodeError> {
    idx.parse::<usize>()
        .ok()
        .and_then(|i| files.get(i))
        .map(|p| p.as_path())
        .ok_or_else(|| {
            NodeError::Other(anyhow!(
                "placeholder {{{kind}_{idx}}} in `{command}` does not match a declared file ({} declared)",
                files.len()
            ))
        })
}

/// Quote a path for `sh` if it contains anything beyond a safe set.
fn shell_quote(path: &Path) -> String {
    let s = path.to_string_lossy();
    let safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+:,@%".contains(c));
    if safe && !s.is_empty() {
        s.into_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(unix)]
fn describe_status(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with code {code}"),
        (None, Some(signal)) => format!("was terminated by signal {signal}"),
        (None, None) => "failed".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with code {code}"),
        None => "failed".to_string(),
    }
}

/// Consume a child pipe line by line, logging at debug and keeping the last
/// `keep` lines.
async fn drain_lines<R>(
    reader: R,
    node: String,
    stream: &'static str,
    keep: usize,
) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(keep);

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(node = %node, "{stream}: {line}");
        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    tail
}

/// Runs a sequence of commands, stopping at the first failure, optionally
/// followed by a custom action.
#[derive(Debug)]
pub struct CommandAction {
    commands: Vec<AtomicCommand>,
    then: Option<Arc<dyn NodeAction>>,
}

impl CommandAction {
    pub fn new(commands: Vec<AtomicCommand>) -> Self {
        Self {
            commands,
            then: None,
        }
    }

    pub fn then(mut self, next: Arc<dyn NodeAction>) -> Self {
        self.then = Some(next);
        self
    }

    pub fn commands(&self) -> &[AtomicCommand] {
        &self.commands
    }
}

impl NodeAction for CommandAction {
    fn run<'a>(
        &'a self,
        ctx: &'a NodeContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), NodeError>> + Send + 'a>> {
        Box::pin(async move {
            for command in &self.commands {
                command.run(ctx).await?;
            }
            if let Some(next) = &self.then {
                next.run(ctx).await?;
            }
            Ok(())
        })
    }
}
