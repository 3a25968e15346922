// src/fs/mod.rs

//! Filesystem access used by staleness checks and graph validation.
//!
//! Everything that only *reads* metadata goes through the [`FileSystem`]
//! trait, so tests can swap in [`mock::MockFileSystem`]. Moving finished
//! outputs into place is done by `exec::atomic` directly on the real disk.

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod cache;
pub mod mock;

pub use cache::{FileStatusCache, StatResult};

/// Metadata of an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub mtime: SystemTime,
    pub size: u64,
}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Metadata for `path`, or `Ok(None)` if nothing exists there.
    ///
    /// Errors are reserved for failures other than "not found".
    fn stat(&self, path: &Path) -> io::Result<Option<FileStat>>;

    fn exists(&self, path: &Path) -> bool {
        matches!(self.stat(path), Ok(Some(_)))
    }

    fn is_executable(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn stat(&self, path: &Path) -> io::Result<Option<FileStat>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(FileStat {
                mtime: meta.modified()?,
                size: meta.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[cfg(unix)]
    fn is_executable(&self, path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;

        fs::metadata(path)
            .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_executable(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).with_context(|| format!("canonicalizing {:?}", path))
    }
}

/// Resolve an executable the way a shell would: names containing a path
/// separator are checked directly, bare names are searched on `PATH`.
pub fn find_executable(fs: &dyn FileSystem, name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return fs
            .is_executable(candidate)
            .then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|full| fs.is_executable(full))
}
