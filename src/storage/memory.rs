//! Bounded in-process tier
//!
//! Entities live in an [`lru::LruCache`] with a running cost total. When the
//! entry count or the total cost goes over its limit, least recently used
//! entries are dropped until both fit again. There is no expiry scan: expired
//! entities are found and removed lazily by the cache facade on read.

use crate::config::MemoryConfig;
use crate::entity::Entity;
use crate::error::{CacheError, Result};
use crate::storage::Tier;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, info};

/// In-memory tier with count and cost limits
pub struct MemoryTier {
    name: String,
    config: MemoryConfig,
    map: Mutex<BoundedMap>,
}

/// LRU map plus the sum of its entities' costs
struct BoundedMap {
    entries: LruCache<String, Entity>,
    total_cost: usize,
}

impl BoundedMap {
    fn insert(&mut self, key: String, entity: Entity) {
        self.total_cost = self.total_cost.saturating_add(entity.cost());
        if let Some((_, replaced)) = self.entries.push(key, entity) {
            self.total_cost = self.total_cost.saturating_sub(replaced.cost());
        }
    }

    fn remove(&mut self, key: &str) -> Option<Entity> {
        let entity = self.entries.pop(key)?;
        self.total_cost = self.total_cost.saturating_sub(entity.cost());
        Some(entity)
    }

    fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.total_cost = 0;
        count
    }

    /// Drop least recently used entries until both limits hold
    fn trim(&mut self, config: &MemoryConfig) -> usize {
        let count_limit = config.effective_count_limit();
        let byte_limit = config.effective_byte_limit();
        let mut evicted = 0;

        while self.entries.len() > count_limit || self.total_cost > byte_limit {
            match self.entries.pop_lru() {
                Some((key, entity)) => {
                    debug!("Evicting memory entry (LRU): {}", key);
                    self.total_cost = self.total_cost.saturating_sub(entity.cost());
                    evicted += 1;
                }
                None => break,
            }
        }

        evicted
    }
}

impl MemoryTier {
    /// Create an empty tier
    pub fn new(name: impl Into<String>, config: MemoryConfig) -> Self {
        let name = name.into();
        info!("Initializing memory tier '{}' with config: {:?}", name, config);

        Self {
            name,
            config,
            map: Mutex::new(BoundedMap {
                entries: LruCache::unbounded(),
                total_cost: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Run `f` on the stored entity in place, under the tier lock.
    ///
    /// Counts as a use for LRU purposes. Cost changes made by `f` are
    /// accounted for and may trigger eviction. `f` must not call back into
    /// this tier.
    pub(crate) fn with_entity_mut<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Entity) -> R,
    ) -> Option<R> {
        let mut guard = self.map.lock();
        let map = &mut *guard;

        let entity = map.entries.get_mut(key)?;
        let before = entity.cost();
        let result = f(entity);
        let after = entity.cost();

        map.total_cost = map.total_cost.saturating_sub(before).saturating_add(after);
        if after != before {
            map.trim(&self.config);
        }

        Some(result)
    }

    /// Drop every entity. Hook for host memory-pressure and backgrounding signals.
    pub fn drop_all(&self) {
        let count = self.map.lock().clear();
        info!("Memory tier '{}' dropped {} entries", self.name, count);
    }

    /// Number of entities held
    pub fn len(&self) -> usize {
        self.map.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of held entities' costs
    pub fn total_cost(&self) -> usize {
        self.map.lock().total_cost
    }
}

impl Tier for MemoryTier {
    fn get(&self, key: &str) -> Option<Entity> {
        self.map.lock().entries.get(key).cloned()
    }

    /// Fails with [`CacheError::StorageError`] when the entity alone is larger
    /// than the byte limit; any older entity for `key` is dropped either way.
    fn set(&self, key: &str, entity: Entity) -> Result<()> {
        let mut map = self.map.lock();

        if entity.cost() > self.config.effective_byte_limit() {
            map.remove(key);
            return Err(CacheError::StorageError(format!(
                "entity for '{}' costs {} bytes, over the memory limit of {}",
                key,
                entity.cost(),
                self.config.byte_limit
            )));
        }

        map.insert(key.to_string(), entity);
        map.trim(&self.config);
        Ok(())
    }

    fn remove(&self, key: &str) {
        if self.map.lock().remove(key).is_some() {
            debug!("Removed memory entry: {}", key);
        }
    }

    fn remove_all(&self) {
        let count = self.map.lock().clear();
        debug!("Cleared {} entries from memory tier '{}'", count, self.name);
    }

    fn contains(&self, key: &str) -> bool {
        self.map
            .lock()
            .entries
            .peek(key)
            .is_some_and(|entity| !entity.is_expired())
    }

    /// Expired entities are removed on read, so there is nothing to sweep
    fn remove_all_expired(&self) {}
}
