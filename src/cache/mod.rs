//! # Two-tier object cache
//!
//! [`AnyCache`] puts a bounded [`MemoryTier`] in front of a bounded
//! [`DiskTier`] behind one key-value contract.
//!
//! ## Reads
//!
//! The memory tier is checked first, then the disk tier; a disk hit is
//! promoted into memory. An expired entry is removed from both tiers and
//! reported as [`CacheError::Expired`].
//!
//! Values are stored type-erased. Asking for the type that was stored hands
//! back a clone. Asking for another type re-encodes the stored value and
//! decodes it as the requested type, and the tier keeps that new form: the
//! last type requested wins. Readers that alternate between two types for
//! the same key therefore keep re-decoding it.
//!
//! ## Writes
//!
//! A write updates the disk manifest synchronously, queues the file write,
//! mirrors the entity into memory and asks the trim scheduler for a sweep.
//! Bursts of writes collapse into one sweep after the debounce window; a
//! periodic sweep runs regardless.
//!
//! ## Locking
//!
//! Each tier has its own lock, and no tier lock is held while the other
//! tier is called. Removals touch the disk tier before memory, and a copy
//! placed in memory is kept only if the disk record it came from is still
//! current afterwards, so a key removed or rewritten on disk never stays
//! readable from memory.

mod scheduler;

use crate::config::{CacheConfig, DiskConfig, MemoryConfig};
use crate::entity::Entity;
use crate::error::{CacheError, Result};
use crate::expiry::Expiry;
use crate::serializable::{CacheSerializable, Codable};
use crate::stats::{CacheStats, StatsRecorder};
use crate::storage::{DiskTier, MemoryTier, SweepReport, Tier, WriteReceipt};
use scheduler::{Sweep, TrimScheduler};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// State shared between the facade and the trim thread
struct CacheCore {
    memory: MemoryTier,
    disk: DiskTier,
    stats: StatsRecorder,
}

impl CacheCore {
    /// Both tiers, disk first
    fn tiers(&self) -> [&dyn Tier; 2] {
        [&self.disk, &self.memory]
    }

    /// Drop an expired key from both tiers and build the error to return
    fn expire(&self, key: &str) -> CacheError {
        for tier in self.tiers() {
            tier.remove(key);
        }
        self.stats.expired();
        debug!("Cache entry expired: {}", key);
        CacheError::Expired {
            key: key.to_string(),
        }
    }

    fn miss(&self, key: &str) -> CacheError {
        self.stats.miss();
        debug!("Cache miss: {}", key);
        CacheError::NotFound {
            key: key.to_string(),
        }
    }

    /// Copy `entity`, read from or written to `location`, into memory.
    ///
    /// A refusal drops any older memory copy and only costs a future disk
    /// read. The copy is taken back out if the disk record no longer points
    /// at `location` once it is in place.
    fn mirror(&self, key: &str, entity: Entity, location: &Path) {
        if let Err(e) = self.memory.set(key, entity) {
            debug!("Not caching {} in memory: {}", key, e);
            return;
        }
        if !self.disk.is_current(key, location) {
            self.memory.remove(key);
            debug!("Dropped stale memory copy of {}", key);
        }
    }

    /// Resolve a disk hit as `T`, decoding in the memory tier when the
    /// promotion took
    fn resolve_disk_hit<T: CacheSerializable>(
        &self,
        key: &str,
        mut entity: Entity,
        location: &Path,
    ) -> Result<T> {
        if entity.is_expired() {
            return Err(self.expire(key));
        }

        self.stats.disk_hit();
        debug!("Disk cache hit: {}", key);
        self.mirror(key, entity.clone(), location);

        let resolved = self
            .memory
            .with_entity_mut(key, |stored| stored.coerce::<T>())
            .unwrap_or_else(|| entity.coerce::<T>());
        self.finish(key, resolved)
    }

    fn finish<T>(&self, key: &str, resolved: Result<(T, bool)>) -> Result<T> {
        let (value, redecoded) = resolved.map_err(|source| CacheError::TypeMismatch {
            key: key.to_string(),
            requested: std::any::type_name::<T>(),
            source: Box::new(source),
        })?;
        if redecoded {
            self.stats.redecoded();
            debug!("Re-decoded {} as {}", key, std::any::type_name::<T>());
        }
        Ok(value)
    }

    /// Look `key` up in memory. `Some(Err(Expired))` means the key has been
    /// dropped from both tiers.
    fn memory_lookup<T: CacheSerializable>(&self, key: &str) -> Option<Result<T>> {
        let found = self.memory.with_entity_mut(key, |stored| {
            if stored.is_expired() {
                None
            } else {
                Some(stored.coerce::<T>())
            }
        })?;

        Some(match found {
            Some(resolved) => {
                self.stats.memory_hit();
                debug!("Memory cache hit: {}", key);
                self.finish(key, resolved)
            }
            None => Err(self.expire(key)),
        })
    }

    fn sweep_all(&self) -> SweepReport {
        self.memory.remove_all_expired();
        let report = self.disk.sweep();
        self.stats.swept(report.evicted());
        report
    }
}

impl Sweep for CacheCore {
    fn sweep(&self) {
        self.sweep_all();
    }
}

/// Named two-tier cache
///
/// Files live under `<root_directory>/<name>/`. Cheap to share behind an
/// `Arc`; every method takes `&self`.
pub struct AnyCache {
    // declared first: the trim thread is joined before the tiers shut down
    scheduler: TrimScheduler,
    core: Arc<CacheCore>,
    name: String,
}

impl AnyCache {
    /// Open the cache called `name` with the default debounce and trim interval
    pub fn new(name: impl Into<String>, memory: MemoryConfig, disk: DiskConfig) -> Result<Self> {
        let config = CacheConfig {
            memory,
            disk,
            ..Default::default()
        };
        Self::with_config(name, config)
    }

    /// Open the cache called `name`
    pub fn with_config(name: impl Into<String>, config: CacheConfig) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        config.validate()?;

        info!("Opening cache '{}'", name);

        let memory = MemoryTier::new(name.clone(), config.memory);
        let disk = DiskTier::new(name.clone(), config.disk)?;
        let core = Arc::new(CacheCore {
            memory,
            disk,
            stats: StatsRecorder::default(),
        });
        let scheduler = TrimScheduler::spawn(
            &name,
            Arc::downgrade(&core),
            config.debounce,
            config.trim_interval,
        )?;

        Ok(Self {
            scheduler,
            core,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store `value` under `key`.
    ///
    /// On return the key is visible to every read; the file itself is still
    /// being written, and the returned receipt resolves once it has landed.
    /// A value that cannot be serialized leaves the cache unchanged.
    pub fn set_object<T: CacheSerializable>(
        &self,
        key: &str,
        value: T,
        expiry: Expiry,
    ) -> Result<WriteReceipt> {
        let mut entity = Entity::new(value, expiry);
        let receipt = self.core.disk.write(key, &mut entity)?;
        self.core.mirror(key, entity, receipt.location());

        self.scheduler.request();
        Ok(receipt)
    }

    /// The value stored under `key`, as `T`.
    ///
    /// Blocks on a file read when the value is only on disk; see
    /// [`object_async`](Self::object_async).
    pub fn object<T: CacheSerializable>(&self, key: &str) -> Result<T> {
        if let Some(result) = self.core.memory_lookup::<T>(key) {
            return result;
        }

        match self.core.disk.lookup(key) {
            Some((entity, location)) => self.core.resolve_disk_hit(key, entity, &location),
            None => Err(self.core.miss(key)),
        }
    }

    /// Like [`object`](Self::object), reading from disk on the I/O thread
    pub async fn object_async<T: CacheSerializable>(&self, key: &str) -> Result<T> {
        if let Some(result) = self.core.memory_lookup::<T>(key) {
            return result;
        }

        match self.core.disk.lookup_async(key).await {
            Some((entity, location)) => self.core.resolve_disk_hit(key, entity, &location),
            None => Err(self.core.miss(key)),
        }
    }

    /// A copy of the stored entity, without decoding its value
    pub fn entity(&self, key: &str) -> Result<Entity> {
        if let Some(entity) = self.core.memory.get(key) {
            if entity.is_expired() {
                return Err(self.core.expire(key));
            }
            self.core.stats.memory_hit();
            return Ok(entity);
        }

        let Some((entity, location)) = self.core.disk.lookup(key) else {
            return Err(self.core.miss(key));
        };
        if entity.is_expired() {
            return Err(self.core.expire(key));
        }
        self.core.stats.disk_hit();
        self.core.mirror(key, entity.clone(), &location);
        Ok(entity)
    }

    /// Store a `serde` value, encoded as JSON
    pub fn set_codable<T>(&self, key: &str, value: T, expiry: Expiry) -> Result<WriteReceipt>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.set_object(key, Codable(value), expiry)
    }

    /// Read a value stored with [`set_codable`](Self::set_codable)
    pub fn codable_object<T>(&self, key: &str) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.object::<Codable<T>>(key).map(Codable::into_inner)
    }

    pub async fn codable_object_async<T>(&self, key: &str) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.object_async::<Codable<T>>(key)
            .await
            .map(Codable::into_inner)
    }

    /// Present in either tier and not expired
    pub fn contains_object(&self, key: &str) -> bool {
        self.core.tiers().iter().any(|tier| tier.contains(key))
    }

    pub fn remove_object(&self, key: &str) {
        for tier in self.core.tiers() {
            tier.remove(key);
        }
    }

    /// Empty both tiers and delete the cache directory
    pub fn remove_all(&self) {
        for tier in self.core.tiers() {
            tier.remove_all();
        }
        info!("Cleared cache '{}'", self.name);
    }

    /// Every key on record. Expired keys are listed until the next sweep.
    pub fn all_keys(&self) -> Vec<String> {
        self.core.disk.all_keys().collect()
    }

    /// Release the memory tier, e.g. on a memory-pressure signal
    pub fn drop_all(&self) {
        self.core.memory.drop_all();
    }

    /// Sweep now, on the calling thread
    pub fn remove_all_expired(&self) -> SweepReport {
        self.core.sweep_all()
    }

    /// Block until queued file writes and deletions have finished
    pub fn flush(&self) {
        self.core.disk.flush();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.core.memory.len(),
            memory_bytes: self.core.memory.total_cost(),
            disk_entries: self.core.disk.len(),
            disk_bytes: self.core.disk.total_size(),
            ..self.core.stats.snapshot()
        }
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.core.memory
    }

    pub fn disk(&self) -> &DiskTier {
        &self.core.disk
    }
}

impl std::fmt::Debug for AnyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyCache")
            .field("name", &self.name)
            .field("memory", &self.core.memory.len())
            .field("disk", &self.core.disk)
            .finish()
    }
}

/// A cache name becomes a directory name, so it must be a single path component
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CacheError::ConfigError(format!(
            "cache name must be a single path component, got {:?}",
            name
        )));
    }
    Ok(())
}
