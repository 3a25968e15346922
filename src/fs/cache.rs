use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, trace};

use crate::errors::{PipelineError, Result};
use crate::fs::{FileStat, FileSystem, RealFileSystem};

/// Outcome of a cached `stat` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatResult {
    Present(FileStat),
    Absent,
}

impl StatResult {
    pub fn exists(&self) -> bool {
        matches!(self, StatResult::Present(_))
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        match self {
            StatResult::Present(stat) => Some(stat.mtime),
            StatResult::Absent => None,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            StatResult::Present(stat) => Some(stat.size),
            StatResult::Absent => None,
        }
    }
}

/// Failed lookups are remembered too, so a path that could not be read
/// fails every node that depends on it in the same way.
type CachedStat = std::result::Result<StatResult, (io::ErrorKind, String)>;

/// Memoised filesystem metadata for one scheduling run.
///
/// Entries are filled lazily and never invalidated: all staleness decisions
/// made through one cache see a single snapshot of the filesystem, even if a
/// file changes on disk in the meantime.
#[derive(Debug)]
pub struct FileStatusCache {
    fs: Arc<dyn FileSystem>,
    entries: HashMap<PathBuf, CachedStat>,
}

impl FileStatusCache {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            entries: HashMap::new(),
        }
    }

    /// Stat `path`, consulting the filesystem only on the first request.
    ///
    /// A missing file is [`StatResult::Absent`], never an error.
    pub fn stat(&mut self, path: &Path) -> Result<StatResult> {
        if !self.entries.contains_key(path) {
            trace!(?path, "stat cache miss");
            let fresh = match self.fs.stat(path) {
                Ok(Some(stat)) => Ok(StatResult::Present(stat)),
                Ok(None) => Ok(StatResult::Absent),
                Err(e) => {
                    debug!(?path, error = %e, "stat failed");
                    Err((e.kind(), e.to_string()))
                }
            };
            self.entries.insert(path.to_path_buf(), fresh);
        }

        self.entries[path].clone().map_err(|(kind, msg)| PipelineError::CacheStat {
            path: path.to_path_buf(),
            source: io::Error::new(kind, msg),
        })
    }

    /// Number of distinct paths looked up so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FileStatusCache {
    fn default() -> Self {
        Self::new(Arc::new(RealFileSystem))
    }
}
