//! Integration tests for rebuilding the disk tier after a restart
//!
//! The manifest is rebuilt from the files left in the cache directory;
//! anything whose metadata cannot be read is deleted.

use anycache::{AnyCache, CacheConfig, Expiry};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn open(root: &Path) -> AnyCache {
    let config = CacheConfig::builder()
        .root_directory(root)
        .debounce(Duration::from_secs(3600))
        .trim_interval(Duration::from_secs(3600))
        .build();
    AnyCache::with_config("recovery", config).unwrap()
}

fn sidecar_of(data: &Path) -> PathBuf {
    let name = data.file_name().unwrap().to_string_lossy().into_owned();
    data.with_file_name(format!(".{}.meta", name))
}

#[test]
fn test_values_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let cache = open(dir.path());
        cache.set_object("note.txt", "persisted".to_string(), Expiry::Never).unwrap();
        cache.set_object("count", 12u32, Expiry::after_secs(3600)).unwrap();
        cache.flush();
    }

    let cache = open(dir.path());
    assert!(cache.memory().is_empty());

    let mut keys = cache.all_keys();
    keys.sort();
    assert_eq!(keys, vec!["count", "note.txt"]);
    assert_eq!(cache.object::<String>("note.txt").unwrap(), "persisted");
    assert_eq!(cache.object::<u32>("count").unwrap(), 12);
    assert_eq!(cache.entity("note.txt").unwrap().expiry(), Expiry::Never);
}

#[test]
fn test_drop_waits_for_pending_writes() {
    let dir = TempDir::new().unwrap();
    {
        let cache = open(dir.path());
        for i in 0..20 {
            cache.set_object(&format!("k{}", i), vec![i as u8; 64], Expiry::Never).unwrap();
        }
    }

    let cache = open(dir.path());
    assert_eq!(cache.all_keys().len(), 20);
    assert_eq!(cache.disk().total_size(), 20 * 64);
}

#[test]
fn test_corrupt_metadata_is_deleted_on_rebuild() {
    let dir = TempDir::new().unwrap();
    let (corrupt, missing_meta) = {
        let cache = open(dir.path());
        cache.set_object("corrupt", "a".to_string(), Expiry::Never).unwrap();
        cache.set_object("no-meta", "b".to_string(), Expiry::Never).unwrap();
        cache.set_object("healthy", "c".to_string(), Expiry::Never).unwrap();
        cache.flush();
        (
            cache.disk().record("corrupt").unwrap().location,
            cache.disk().record("no-meta").unwrap().location,
        )
    };

    fs::write(sidecar_of(&corrupt), b"\x00\x01 definitely not json").unwrap();
    fs::remove_file(sidecar_of(&missing_meta)).unwrap();

    let cache = open(dir.path());
    assert_eq!(cache.all_keys(), vec!["healthy".to_string()]);
    assert!(!corrupt.exists());
    assert!(!sidecar_of(&corrupt).exists());
    assert!(!missing_meta.exists());
    assert!(cache.object::<String>("corrupt").unwrap_err().is_not_found());
}

#[test]
fn test_missing_data_file_reads_as_miss() {
    let dir = TempDir::new().unwrap();
    let cache = open(dir.path());
    cache.set_object("k", "v".to_string(), Expiry::Never).unwrap();
    cache.flush();
    cache.drop_all();

    fs::remove_file(cache.disk().record("k").unwrap().location).unwrap();
    assert!(cache.object::<String>("k").unwrap_err().is_not_found());
    assert!(cache.all_keys().is_empty());

    // the orphaned sidecar is reaped by the next sweep
    let report = cache.remove_all_expired();
    assert_eq!(report.stray_files, 1);
}

#[test]
fn test_expired_entries_are_swept_after_restart() {
    let dir = TempDir::new().unwrap();
    {
        let cache = open(dir.path());
        cache
            .set_object("brief", "x".to_string(), Expiry::after(Duration::from_millis(10)))
            .unwrap();
        cache.set_object("lasting", "y".to_string(), Expiry::Never).unwrap();
        cache.flush();
    }
    std::thread::sleep(Duration::from_millis(30));

    let cache = open(dir.path());
    assert!(!cache.contains_object("brief"));
    assert_eq!(cache.all_keys().len(), 2);

    let report = cache.remove_all_expired();
    assert_eq!(report.expired, 1);
    assert_eq!(cache.all_keys(), vec!["lasting".to_string()]);
}

#[test]
fn test_stray_files_are_reaped() {
    let dir = TempDir::new().unwrap();
    let cache = open(dir.path());
    cache.set_object("k", "v".to_string(), Expiry::Never).unwrap();
    cache.flush();

    let stray = cache.disk().directory().join("left-behind.tmp");
    fs::write(&stray, b"partial").unwrap();

    let report = cache.remove_all_expired();
    assert_eq!(report.stray_files, 1);
    cache.flush();
    assert!(!stray.exists());
    assert_eq!(cache.object::<String>("k").unwrap(), "v");
}
