// tests/file_status_cache.rs

use std::io;
use std::path::Path;
use std::sync::Arc;

use pipegraph::errors::PipelineError;
use pipegraph::fs::mock::{MockFileSystem, secs};
use pipegraph::fs::{FileStatusCache, StatResult};

#[test]
fn missing_file_is_absent_not_an_error() {
    let fs = MockFileSystem::new();
    let mut cache = FileStatusCache::new(Arc::new(fs));

    let result = cache.stat(Path::new("/data/nothing.bam")).unwrap();
    assert_eq!(result, StatResult::Absent);
    assert!(!result.exists());
    assert_eq!(result.mtime(), None);
}

#[test]
fn present_file_reports_mtime_and_size() {
    let fs = MockFileSystem::new();
    fs.add_file_at("/data/reads.fq", "ACGT", secs(42));
    let mut cache = FileStatusCache::new(Arc::new(fs));

    let result = cache.stat(Path::new("/data/reads.fq")).unwrap();
    assert!(result.exists());
    assert_eq!(result.mtime(), Some(secs(42)));
    assert_eq!(result.size(), Some(4));
}

#[test]
fn repeated_lookups_hit_the_filesystem_once() {
    let fs = MockFileSystem::new();
    fs.add_file("/data/ref.fa", ">chr1");
    let mut cache = FileStatusCache::new(Arc::new(fs.clone()));

    for _ in 0..5 {
        cache.stat(Path::new("/data/ref.fa")).unwrap();
        cache.stat(Path::new("/data/missing")).unwrap();
    }

    assert_eq!(fs.stat_calls("/data/ref.fa"), 1);
    assert_eq!(fs.stat_calls("/data/missing"), 1);
    assert_eq!(cache.len(), 2);
}

#[test]
fn results_are_a_snapshot_even_if_the_file_changes() {
    let fs = MockFileSystem::new();
    fs.add_file_at("/data/a.txt", "a", secs(10));
    let mut cache = FileStatusCache::new(Arc::new(fs.clone()));

    let first = cache.stat(Path::new("/data/a.txt")).unwrap();

    fs.set_mtime("/data/a.txt", secs(99));
    fs.remove("/data/a.txt");

    let second = cache.stat(Path::new("/data/a.txt")).unwrap();
    assert_eq!(first, second);
    assert_eq!(second.mtime(), Some(secs(10)));
}

#[test]
fn stat_failure_is_a_cache_stat_error_and_is_memoised() {
    let fs = MockFileSystem::new();
    fs.fail_stat("/secret/in.bam", io::ErrorKind::PermissionDenied);
    let mut cache = FileStatusCache::new(Arc::new(fs.clone()));

    for _ in 0..3 {
        match cache.stat(Path::new("/secret/in.bam")) {
            Err(PipelineError::CacheStat { path, source }) => {
                assert_eq!(path, Path::new("/secret/in.bam"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected CacheStat error, got {other:?}"),
        }
    }

    assert_eq!(fs.stat_calls("/secret/in.bam"), 1);
}

#[test]
fn real_filesystem_cache_sees_files_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("x.txt");
    std::fs::write(&file, "hello").unwrap();

    let mut cache = FileStatusCache::default();
    assert_eq!(cache.stat(&file).unwrap().size(), Some(5));
    assert!(!cache.stat(&dir.path().join("y.txt")).unwrap().exists());
}
