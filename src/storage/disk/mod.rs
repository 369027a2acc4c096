//! Persistent bounded tier
//!
//! One file per entry plus an in-memory manifest (key → record). The
//! manifest is the single source of truth for presence and expiry; the
//! directory is a write-behind copy of it, read back only to rebuild the
//! manifest at startup and to reap stray files during a sweep.
//!
//! Manifest changes happen synchronously under the tier lock. File writes
//! and deletions are queued to a dedicated I/O thread. Until a write lands
//! its bytes are served from a pending map, so a `get` right after `set`
//! always sees the new value.

mod io;
mod manifest;
mod sweep;

pub use manifest::ManifestRecord;
pub use sweep::{EvictionReason, SweepPlan};

use crate::config::DiskConfig;
use crate::entity::Entity;
use crate::error::Result;
use crate::expiry::Expiry;
use crate::storage::Tier;
use chrono::Utc;
use io::{IoOp, IoQueue};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Manifest plus the bytes of writes still in flight
#[derive(Default)]
struct DiskIndex {
    manifest: HashMap<String, ManifestRecord>,
    pending: HashMap<PathBuf, Arc<Vec<u8>>>,
}

/// Where a read finds its bytes
enum Located {
    /// Write not landed yet; served from the pending map
    InFlight(Entity, PathBuf),
    File(ManifestRecord),
}

/// Resolves once the file written by [`DiskTier::write`] has landed (or failed)
#[derive(Debug)]
pub struct WriteReceipt {
    location: PathBuf,
    landed: oneshot::Receiver<()>,
}

impl WriteReceipt {
    /// File the value is being written to
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Block the calling thread until the write has landed.
    ///
    /// Must not be called from inside an async runtime; `.await` the receipt
    /// there instead.
    pub fn wait(self) {
        let _ = self.landed.blocking_recv();
    }
}

impl Future for WriteReceipt {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.landed).poll(cx).map(|_| ())
    }
}

/// Summary of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub over_budget: usize,
    /// Files on disk no manifest record points at
    pub stray_files: usize,
}

impl SweepReport {
    pub fn evicted(&self) -> usize {
        self.expired + self.over_budget
    }
}

/// Disk tier with a self-healing manifest
pub struct DiskTier {
    name: String,
    directory: PathBuf,
    config: DiskConfig,
    index: Arc<Mutex<DiskIndex>>,
    io: IoQueue,
}

impl DiskTier {
    /// Open the tier at `<root>/<name>`, rebuilding the manifest from what is
    /// on disk. Files whose metadata cannot be read are deleted.
    pub fn new(name: impl Into<String>, config: DiskConfig) -> Result<Self> {
        let name = name.into();
        let directory = config.root_directory.join(&name);
        std::fs::create_dir_all(&directory)?;

        let rebuilt = manifest::rebuild(&directory);
        for path in &rebuilt.rejected {
            manifest::remove_files_sync(path);
        }

        info!(
            "Opened disk tier '{}' at {} ({} entries, {} discarded)",
            name,
            directory.display(),
            rebuilt.manifest.len(),
            rebuilt.rejected.len()
        );

        let io = IoQueue::spawn(&name)?;

        Ok(Self {
            name,
            directory,
            config,
            index: Arc::new(Mutex::new(DiskIndex {
                manifest: rebuilt.manifest,
                pending: HashMap::new(),
            })),
            io,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this cache's files
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    /// Persist `entity` under `key`.
    ///
    /// The value is serialized first; a serialization failure leaves the
    /// manifest untouched. On success the manifest points at a fresh file
    /// immediately, the bytes are written in the background, and
    /// `entity`'s cost becomes the serialized size.
    ///
    /// File operations are queued while the index lock is held, so the queue
    /// sees them in the same order as the manifest.
    pub fn write(&self, key: &str, entity: &mut Entity) -> Result<WriteReceipt> {
        let bytes = Arc::new(entity.to_bytes()?);
        let location = self.directory.join(manifest::file_name_for(key));
        let record = ManifestRecord {
            key: key.to_string(),
            location: location.clone(),
            expire: entity.expiry().deadline(),
            created_at: Utc::now(),
            size: bytes.len() as u64,
        };
        let metadata = record.metadata();

        let (landed_tx, landed_rx) = oneshot::channel();
        let shared = Arc::clone(&self.index);
        let landed_path = location.clone();
        let write = IoOp::Write {
            path: location.clone(),
            bytes: bytes.clone(),
            metadata,
            on_landed: Box::new(move || {
                shared.lock().pending.remove(&landed_path);
                let _ = landed_tx.send(());
            }),
        };

        {
            let mut index = self.index.lock();
            index.pending.insert(location.clone(), bytes.clone());
            let superseded = index.manifest.insert(key.to_string(), record);
            self.io.submit(write);
            if let Some(old) = superseded {
                index.pending.remove(&old.location);
                self.io.submit(IoOp::Remove { path: old.location });
            }
        }

        entity.set_cost(bytes.len());
        debug!("Stored disk entry: {} ({} bytes)", key, bytes.len());

        Ok(WriteReceipt {
            location,
            landed: landed_rx,
        })
    }

    /// Read `key` along with the file its record points at.
    ///
    /// Blocks on the file read when the value is not still in flight.
    pub fn lookup(&self, key: &str) -> Option<(Entity, PathBuf)> {
        let record = match self.locate(key)? {
            Located::InFlight(entity, location) => return Some((entity, location)),
            Located::File(record) => record,
        };

        match std::fs::read(&record.location) {
            Ok(bytes) => Some(Self::loaded(bytes, record)),
            Err(e) => {
                debug!("Cache file for {} unreadable: {}", key, e);
                self.drop_dangling(&record);
                None
            }
        }
    }

    /// Like [`lookup`](Self::lookup), reading the file on the I/O thread
    pub async fn lookup_async(&self, key: &str) -> Option<(Entity, PathBuf)> {
        let record = match self.locate(key)? {
            Located::InFlight(entity, location) => return Some((entity, location)),
            Located::File(record) => record,
        };

        let (reply, response) = oneshot::channel();
        self.io.submit(IoOp::Read {
            path: record.location.clone(),
            reply,
        });

        match response.await {
            Ok(Some(bytes)) => Some(Self::loaded(bytes, record)),
            _ => {
                self.drop_dangling(&record);
                None
            }
        }
    }

    /// Read `key` off the I/O thread, without blocking the caller
    pub async fn get_async(&self, key: &str) -> Option<Entity> {
        self.lookup_async(key).await.map(|(entity, _)| entity)
    }

    /// Whether the record for `key` still points at `location`
    pub fn is_current(&self, key: &str, location: &Path) -> bool {
        self.index
            .lock()
            .manifest
            .get(key)
            .is_some_and(|record| record.location.as_path() == location)
    }

    fn locate(&self, key: &str) -> Option<Located> {
        let index = self.index.lock();
        let record = index.manifest.get(key)?.clone();
        Some(match index.pending.get(&record.location) {
            Some(bytes) => {
                let (entity, location) = Self::loaded(bytes.as_ref().clone(), record);
                Located::InFlight(entity, location)
            }
            None => Located::File(record),
        })
    }

    fn loaded(bytes: Vec<u8>, record: ManifestRecord) -> (Entity, PathBuf) {
        let entity = Entity::from_bytes(bytes, Expiry::from_deadline(record.expire));
        (entity, record.location)
    }

    /// Copy of the manifest record for `key`
    pub fn record(&self, key: &str) -> Option<ManifestRecord> {
        self.index.lock().manifest.get(key).cloned()
    }

    /// Snapshot of the keys in the manifest
    pub fn all_keys(&self) -> impl Iterator<Item = String> {
        let keys: Vec<String> = self.index.lock().manifest.keys().cloned().collect();
        keys.into_iter()
    }

    /// Number of manifest records
    pub fn len(&self) -> usize {
        self.index.lock().manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of recorded file sizes
    pub fn total_size(&self) -> u64 {
        self.index.lock().manifest.values().map(|r| r.size).sum()
    }

    /// Block until every queued file operation has finished
    pub fn flush(&self) {
        self.io.flush();
    }

    /// Evict expired and over-budget entries and reap stray files.
    ///
    /// Eviction order is described in [`SweepPlan`].
    pub fn sweep(&self) -> SweepReport {
        let listing = match manifest::list_directory(&self.directory) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Cannot list cache directory {}: {}", self.directory.display(), e);
                Default::default()
            }
        };

        let (plan, strays) = {
            let mut index = self.index.lock();

            let referenced: HashSet<&PathBuf> = index
                .manifest
                .values()
                .map(|record| &record.location)
                .chain(index.pending.keys())
                .collect();
            let strays: HashSet<PathBuf> = listing
                .data_files
                .into_iter()
                .chain(
                    listing
                        .sidecars
                        .iter()
                        .filter_map(|sidecar| manifest::data_path_for_sidecar(sidecar)),
                )
                .filter(|path| !referenced.contains(path))
                .collect();

            let plan = SweepPlan::compute(
                index.manifest.values().cloned(),
                Utc::now(),
                self.config.byte_limit,
                self.config.count_limit,
            );
            for (record, reason) in &plan.evict {
                index.manifest.remove(&record.key);
                index.pending.remove(&record.location);
                debug!("Evicting disk entry ({}): {}", reason, record.key);
                self.io.submit(IoOp::Remove {
                    path: record.location.clone(),
                });
            }

            (plan, strays)
        };

        for path in &strays {
            debug!("Removing stray cache file {}", path.display());
            self.io.submit(IoOp::Remove { path: path.clone() });
        }

        let report = SweepReport {
            expired: plan.count(EvictionReason::Expired),
            over_budget: plan.count(EvictionReason::ByteLimit)
                + plan.count(EvictionReason::CountLimit),
            stray_files: strays.len(),
        };
        if report != SweepReport::default() {
            info!(
                "Swept disk tier '{}': {} expired, {} over budget, {} stray files",
                self.name, report.expired, report.over_budget, report.stray_files
            );
        }
        report
    }

    /// Forget a record whose file turned out to be unreadable, unless the key
    /// has been rewritten since
    fn drop_dangling(&self, record: &ManifestRecord) {
        let mut index = self.index.lock();
        let still_current = index
            .manifest
            .get(&record.key)
            .is_some_and(|current| current.location == record.location)
            && !index.pending.contains_key(&record.location);
        if still_current {
            index.manifest.remove(&record.key);
            warn!("Dropped manifest record with missing file: {}", record.key);
        }
    }
}

impl Tier for DiskTier {
    /// Blocks on the file read when the value is not still in flight
    fn get(&self, key: &str) -> Option<Entity> {
        self.lookup(key).map(|(entity, _)| entity)
    }

    fn set(&self, key: &str, mut entity: Entity) -> Result<()> {
        self.write(key, &mut entity).map(|_| ())
    }

    fn remove(&self, key: &str) {
        let mut index = self.index.lock();
        if let Some(record) = index.manifest.remove(key) {
            index.pending.remove(&record.location);
            self.io.submit(IoOp::Remove {
                path: record.location,
            });
            debug!("Removed disk entry: {}", key);
        }
    }

    fn remove_all(&self) {
        let mut index = self.index.lock();
        index.pending.clear();
        let count = index.manifest.len();
        index.manifest.clear();
        self.io.submit(IoOp::RemoveDir {
            path: self.directory.clone(),
        });
        drop(index);

        info!("Cleared {} entries from disk tier '{}'", count, self.name);
    }

    fn contains(&self, key: &str) -> bool {
        self.index
            .lock()
            .manifest
            .get(key)
            .is_some_and(|record| !record.is_expired(Utc::now()))
    }

    fn remove_all_expired(&self) {
        self.sweep();
    }
}

impl std::fmt::Debug for DiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskTier")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("entries", &self.len())
            .finish()
    }
}
