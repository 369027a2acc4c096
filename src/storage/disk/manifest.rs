//! Manifest records and the on-disk metadata they are rebuilt from
//!
//! Every cached value is one flat file named by a random id (keeping the
//! key's extension). Its metadata lives in a hidden sidecar next to it,
//! `.<file name>.meta`, holding the original key and the text-encoded
//! `expire` and `create` timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

const SIDECAR_PREFIX: char = '.';
const SIDECAR_SUFFIX: &str = ".meta";

/// What the manifest knows about one file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    /// Original cache key
    pub key: String,

    /// Path of the data file
    pub location: PathBuf,

    /// Absolute deadline
    pub expire: DateTime<Utc>,

    /// When the value was written
    pub created_at: DateTime<Utc>,

    /// Size of the data file in bytes
    pub size: u64,
}

impl ManifestRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire < now
    }

    pub(crate) fn metadata(&self) -> FileMetadata {
        FileMetadata {
            key: self.key.clone(),
            expire: self.expire,
            create: self.created_at,
        }
    }
}

/// Sidecar contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FileMetadata {
    pub key: String,
    pub expire: DateTime<Utc>,
    pub create: DateTime<Utc>,
}

/// Fresh unique file name for `key`, keeping its extension if it has one
pub(crate) fn file_name_for(key: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    match Path::new(key).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", id, ext),
        _ => id,
    }
}

/// Sidecar path for a data file
pub(crate) fn sidecar_path(data_path: &Path) -> PathBuf {
    let name = data_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    data_path.with_file_name(format!("{}{}{}", SIDECAR_PREFIX, name, SIDECAR_SUFFIX))
}

/// Data file a sidecar belongs to, `None` if `path` is not a sidecar name
pub(crate) fn data_path_for_sidecar(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let data_name = name
        .strip_prefix(SIDECAR_PREFIX)?
        .strip_suffix(SIDECAR_SUFFIX)?;
    if data_name.is_empty() {
        return None;
    }
    Some(path.with_file_name(data_name))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(SIDECAR_PREFIX))
}

/// Files found in a cache directory
#[derive(Debug, Default)]
pub(crate) struct DirListing {
    pub data_files: Vec<PathBuf>,
    pub sidecars: Vec<PathBuf>,
}

/// List the flat files of `directory`; subdirectories are ignored.
/// A missing directory lists as empty.
pub(crate) fn list_directory(directory: &Path) -> io::Result<DirListing> {
    let mut listing = DirListing::default();

    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(listing),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if is_hidden(&path) {
            listing.sidecars.push(path);
        } else {
            listing.data_files.push(path);
        }
    }

    Ok(listing)
}

/// Parse a data file's sidecar into a record
pub(crate) fn read_record(data_path: &Path) -> Option<ManifestRecord> {
    let raw = fs::read(sidecar_path(data_path)).ok()?;
    let metadata: FileMetadata = serde_json::from_slice(&raw).ok()?;
    let size = fs::metadata(data_path).ok()?.len();

    Some(ManifestRecord {
        key: metadata.key,
        location: data_path.to_path_buf(),
        expire: metadata.expire,
        created_at: metadata.create,
        size,
    })
}

/// Outcome of rebuilding the manifest from a directory
#[derive(Debug, Default)]
pub(crate) struct Rebuild {
    pub manifest: HashMap<String, ManifestRecord>,

    /// Data files (or lone sidecars) that must be deleted
    pub rejected: Vec<PathBuf>,
}

/// Rebuild the manifest from the files in `directory`.
///
/// Data files with missing or unparseable metadata, sidecars without a data
/// file, and all but the newest file for a key are rejected.
pub(crate) fn rebuild(directory: &Path) -> Rebuild {
    let mut rebuild = Rebuild::default();

    let listing = match list_directory(directory) {
        Ok(listing) => listing,
        Err(e) => {
            warn!("Cannot list cache directory {}: {}", directory.display(), e);
            return rebuild;
        }
    };

    for sidecar in &listing.sidecars {
        match data_path_for_sidecar(sidecar) {
            Some(data_path) if data_path.is_file() => {}
            _ => rebuild.rejected.push(sidecar.clone()),
        }
    }

    for data_path in listing.data_files {
        let Some(record) = read_record(&data_path) else {
            warn!("Discarding cache file with unreadable metadata: {}", data_path.display());
            rebuild.rejected.push(data_path);
            continue;
        };

        let newer_exists = rebuild
            .manifest
            .get(&record.key)
            .is_some_and(|existing| existing.created_at >= record.created_at);
        if newer_exists {
            rebuild.rejected.push(record.location);
            continue;
        }

        if let Some(superseded) = rebuild.manifest.insert(record.key.clone(), record) {
            rebuild.rejected.push(superseded.location);
        }
    }

    rebuild
}

/// Delete a data file and its sidecar, ignoring files that are already gone
pub(crate) fn remove_files_sync(path: &Path) {
    let targets = match data_path_for_sidecar(path) {
        Some(_) => vec![path.to_path_buf()],
        None => vec![path.to_path_buf(), sidecar_path(path)],
    };

    for target in targets {
        if let Err(e) = fs::remove_file(&target) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to delete cache file {}: {}", target.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_entry(
        dir: &Path,
        name: &str,
        key: &str,
        body: &[u8],
        create: DateTime<Utc>,
    ) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        let metadata = FileMetadata {
            key: key.to_string(),
            expire: Utc::now() + chrono::Duration::hours(1),
            create,
        };
        fs::write(sidecar_path(&path), serde_json::to_vec(&metadata).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_file_name_keeps_extension() {
        let name = file_name_for("images/avatar.png");
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), 32 + 4);
        assert!(!name.contains('-'));

        let bare = file_name_for("profile");
        assert_eq!(bare.len(), 32);
        assert_ne!(file_name_for("profile"), bare);
    }

    #[test]
    fn test_sidecar_naming() {
        let data = Path::new("/cache/default/abc.png");
        let sidecar = sidecar_path(data);
        assert_eq!(sidecar, Path::new("/cache/default/.abc.png.meta"));
        assert_eq!(data_path_for_sidecar(&sidecar).unwrap(), data);
        assert!(data_path_for_sidecar(data).is_none());
    }

    #[test]
    fn test_metadata_is_text() {
        let metadata = FileMetadata {
            key: "k".to_string(),
            expire: Utc::now(),
            create: Utc::now(),
        };
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"key\":\"k\""));
        assert!(json.contains("\"expire\":\""));
        let parsed: FileMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_rebuild_reads_valid_entries() {
        let dir = TempDir::new().unwrap();
        let path = write_entry(dir.path(), "a1", "alpha", b"12345", Utc::now());

        let rebuild = rebuild(dir.path());
        assert!(rebuild.rejected.is_empty());
        let record = &rebuild.manifest["alpha"];
        assert_eq!(record.location, path);
        assert_eq!(record.size, 5);
    }

    #[test]
    fn test_rebuild_rejects_corrupt_and_orphaned_files() {
        let dir = TempDir::new().unwrap();
        let corrupt = write_entry(dir.path(), "c1", "corrupt", b"x", Utc::now());
        fs::write(sidecar_path(&corrupt), b"{ not json").unwrap();

        let bare = dir.path().join("b1");
        fs::write(&bare, b"no metadata").unwrap();

        let lone_sidecar = dir.path().join(".gone.meta");
        fs::write(&lone_sidecar, b"{}").unwrap();

        let rebuild = rebuild(dir.path());
        assert!(rebuild.manifest.is_empty());
        assert_eq!(rebuild.rejected.len(), 3);
        assert!(rebuild.rejected.contains(&corrupt));
        assert!(rebuild.rejected.contains(&bare));
        assert!(rebuild.rejected.contains(&lone_sidecar));
    }

    #[test]
    fn test_rebuild_keeps_newest_file_per_key() {
        let dir = TempDir::new().unwrap();
        let five_minutes_ago = Utc::now() - chrono::Duration::minutes(5);
        let older = write_entry(dir.path(), "o1", "same", b"old", five_minutes_ago);
        let newer = write_entry(dir.path(), "n1", "same", b"new!", Utc::now());

        let rebuild = rebuild(dir.path());
        assert_eq!(rebuild.manifest["same"].location, newer);
        assert_eq!(rebuild.rejected, vec![older]);
    }

    #[test]
    fn test_rebuild_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let rebuild = rebuild(&dir.path().join("never-created"));
        assert!(rebuild.manifest.is_empty());
        assert!(rebuild.rejected.is_empty());
    }

    #[test]
    fn test_remove_files_sync_deletes_both() {
        let dir = TempDir::new().unwrap();
        let path = write_entry(dir.path(), "d1", "doomed", b"bytes", Utc::now());

        remove_files_sync(&path);
        assert!(!path.exists());
        assert!(!sidecar_path(&path).exists());

        // already gone is fine
        remove_files_sync(&path);
    }
}
