// src/exec/atomic.rs

//! Scratch directories and output commits.
//!
//! Every dispatched node gets a fresh [`ScratchDir`]. Its action writes the
//! declared outputs there; [`ScratchDir::commit`] then moves them into their
//! final locations. If the action fails, is cancelled, or does not produce
//! every output, the scratch directory is removed and no final path is
//! touched, so a failed node looks exactly like one that never ran.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::errors::NodeError;

#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a new private directory below `temp_root`.
    pub fn create(temp_root: &Path) -> Result<Self, NodeError> {
        fs::create_dir_all(temp_root)
            .with_context(|| format!("creating temp root {:?}", temp_root))?;
        let dir = tempfile::Builder::new()
            .prefix("pipegraph-")
            .tempdir_in(temp_root)
            .with_context(|| format!("creating scratch directory in {:?}", temp_root))?;
        debug!(path = ?dir.path(), "created scratch directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the output ending up at `final_path` is staged.
    pub fn staged_path(&self, final_path: &Path) -> PathBuf {
        match final_path.file_name() {
            Some(name) => self.dir.path().join(name),
            None => self.dir.path().join(final_path),
        }
    }

    /// Move every staged output to its final path, then remove the scratch
    /// directory.
    ///
    /// All outputs are checked before anything is moved. Files already at a
    /// final path are set aside first; if a move fails half-way, the new
    /// outputs are deleted and the set-aside files are put back.
    pub fn commit(self, outputs: &[PathBuf]) -> Result<(), NodeError> {
        for output in outputs {
            if !self.staged_path(output).is_file() {
                self.discard();
                return Err(NodeError::MissingOutput(output.clone()));
            }
        }

        let mut txn = CommitLog::default();
        for output in outputs {
            let staged = self.staged_path(output);
            if let Err(source) = txn.replace(&staged, output) {
                txn.roll_back();
                self.discard();
                return Err(NodeError::Commit {
                    from: staged,
                    to: output.clone(),
                    source,
                });
            }
            debug!(path = ?output, "committed output");
        }

        txn.finish();
        self.discard();
        Ok(())
    }

    /// Remove the scratch directory and everything in it.
    pub fn discard(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(?path, error = %e, "failed to remove scratch directory");
        }
    }
}

/// Final paths touched by one commit.
#[derive(Debug, Default)]
struct CommitLog<'a> {
    moved: Vec<&'a Path>,
    backups: Vec<(&'a Path, PathBuf)>,
}

impl<'a> CommitLog<'a> {
    fn replace(&mut self, staged: &Path, output: &'a Path) -> io::Result<()> {
        if let Some(backup) = set_aside(output)? {
            self.backups.push((output, backup));
        }
        move_file(staged, output)?;
        self.moved.push(output);
        Ok(())
    }

    fn roll_back(self) {
        for output in self.moved.into_iter().rev() {
            if let Err(e) = fs::remove_file(output) {
                warn!(path = ?output, error = %e, "failed to roll back committed output");
            }
        }
        for (output, backup) in self.backups {
            if let Err(e) = fs::rename(&backup, output) {
                warn!(path = ?output, ?backup, error = %e, "failed to restore previous output");
            }
        }
    }

    fn finish(self) {
        for (_, backup) in self.backups {
            if let Err(e) = fs::remove_file(&backup) {
                warn!(path = ?backup, error = %e, "failed to remove previous output");
            }
        }
    }
}

/// Rename an existing file at `path` out of the way. Directories are left
/// alone; moving an output onto one fails later.
fn set_aside(path: &Path) -> io::Result<Option<PathBuf>> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(None),
        Ok(_) => {
            let backup = sibling(path, "backup");
            fs::rename(path, &backup)?;
            debug!(?path, ?backup, "set aside previous output");
            Ok(Some(backup))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// A hidden name next to `path`, on the same filesystem.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.pipegraph-{suffix}"))
}

/// Rename `from` to `to`, creating parent directories.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            copy_into_place(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

/// Copy `from` next to `to` and rename it over `to`, so `to` never holds a
/// partial file. The copy is removed again if either step fails.
fn copy_into_place(from: &Path, to: &Path) -> io::Result<()> {
    let tmp = sibling(to, "partial");
    let result = fs::copy(from, &tmp).and_then(|_| fs::rename(&tmp, to));
    if result.is_err() {
        match fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?tmp, error = %e, "failed to remove partial copy"),
        }
    }
    result
}

fn is_cross_device(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::CrossesDevices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_copy_leaves_no_partial_file() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("big.dat");
        fs::write(&from, vec![7u8; 64 * 1024]).unwrap();
        let to = dir.path().join("out.dat");
        let tmp = sibling(&to, "partial");
        std::os::unix::fs::symlink(full, &tmp).unwrap();

        assert!(copy_into_place(&from, &to).is_err());
        assert!(fs::symlink_metadata(&tmp).is_err());
        assert!(!to.exists());
        assert!(from.exists());
    }

    #[test]
    fn failed_rename_after_copy_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        fs::write(&from, "a").unwrap();
        let to = dir.path().join("taken");
        fs::create_dir(&to).unwrap();
        fs::write(to.join("inside"), "x").unwrap();

        assert!(copy_into_place(&from, &to).is_err());
        assert!(!sibling(&to, "partial").exists());
        assert!(to.join("inside").exists());
    }

    #[test]
    fn sibling_names_are_hidden_next_to_the_path() {
        assert_eq!(
            sibling(Path::new("/data/out.txt"), "backup"),
            PathBuf::from("/data/.out.txt.pipegraph-backup")
        );
    }
}
