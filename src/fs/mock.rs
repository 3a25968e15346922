// src/fs/mock.rs

use super::{FileStat, FileSystem};
use anyhow::Result;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct MockFile {
    pub contents: Vec<u8>,
    pub mtime: SystemTime,
    pub executable: bool,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockFile>,
    /// Paths whose `stat` fails with the given error kind.
    failures: HashMap<PathBuf, io::ErrorKind>,
    /// Counts `stat` calls per path.
    stat_calls: HashMap<PathBuf, usize>,
}

/// In-memory filesystem with explicit modification times.
///
/// Files added without a timestamp get `UNIX_EPOCH + 1s`; use
/// [`MockFileSystem::add_file_at`] or [`MockFileSystem::set_mtime`] to order
/// them.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.add_file_at(path, content, secs(1));
    }

    pub fn add_file_at(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        mtime: SystemTime,
    ) {
        self.lock().files.insert(
            path.as_ref().to_path_buf(),
            MockFile {
                contents: content.into(),
                mtime,
                executable: false,
            },
        );
    }

    pub fn add_executable(&self, path: impl AsRef<Path>) {
        self.lock().files.insert(
            path.as_ref().to_path_buf(),
            MockFile {
                contents: Vec::new(),
                mtime: secs(1),
                executable: true,
            },
        );
    }

    pub fn set_mtime(&self, path: impl AsRef<Path>, mtime: SystemTime) {
        if let Some(file) = self.lock().files.get_mut(path.as_ref()) {
            file.mtime = mtime;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.lock().files.remove(path.as_ref());
    }

    /// Make every subsequent `stat` of `path` fail with `kind`.
    pub fn fail_stat(&self, path: impl AsRef<Path>, kind: io::ErrorKind) {
        self.lock().failures.insert(path.as_ref().to_path_buf(), kind);
    }

    /// Number of times `stat` was called for `path`.
    pub fn stat_calls(&self, path: impl AsRef<Path>) -> usize {
        self.lock()
            .stat_calls
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }
}

impl FileSystem for MockFileSystem {
    fn stat(&self, path: &Path) -> io::Result<Option<FileStat>> {
        let mut state = self.lock();
        *state.stat_calls.entry(path.to_path_buf()).or_insert(0) += 1;

        if let Some(kind) = state.failures.get(path) {
            return Err(io::Error::new(*kind, format!("mock failure for {:?}", path)));
        }

        Ok(state.files.get(path).map(|file| FileStat {
            mtime: file.mtime,
            size: file.contents.len() as u64,
        }))
    }

    fn is_executable(&self, path: &Path) -> bool {
        self.lock()
            .files
            .get(path)
            .is_some_and(|file| file.executable)
    }

    /// Lexical only: `.` and `..` are collapsed, symlinks do not exist.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        let mut out = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                        out.pop();
                    } else if !out.has_root() {
                        out.push("..");
                    }
                }
                other => out.push(other.as_os_str()),
            }
        }
        if out.as_os_str().is_empty() {
            out.push(".");
        }
        Ok(out)
    }
}

/// `UNIX_EPOCH + n` seconds; handy for ordering mock timestamps.
pub fn secs(n: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_collapses_dot_segments() {
        let fs = MockFileSystem::new();
        let canon = |p: &str| fs.canonicalize(Path::new(p)).unwrap();
        assert_eq!(canon("/out/sub/../x.bam"), PathBuf::from("/out/x.bam"));
        assert_eq!(canon("/out/./x.bam"), PathBuf::from("/out/x.bam"));
        assert_eq!(canon("/.."), PathBuf::from("/"));
        assert_eq!(canon("a/.."), PathBuf::from("."));
        assert_eq!(canon("../a"), PathBuf::from("../a"));
    }
}
