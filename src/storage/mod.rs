//! Storage tiers
//!
//! Both tiers implement [`Tier`]. Each guards its index with its own lock and
//! never calls into the other tier; keeping the two consistent for a key is
//! the job of [`AnyCache`](crate::AnyCache).

pub mod disk;
pub mod memory;

pub use disk::{DiskTier, EvictionReason, ManifestRecord, SweepPlan, SweepReport, WriteReceipt};
pub use memory::MemoryTier;

use crate::entity::Entity;
use crate::error::Result;

/// Contract shared by the memory and disk tiers
pub trait Tier: Send + Sync {
    /// Entity stored under `key`, expired or not
    fn get(&self, key: &str) -> Option<Entity>;

    /// Store `entity` under `key`, replacing any previous entity
    fn set(&self, key: &str, entity: Entity) -> Result<()>;

    fn remove(&self, key: &str);

    fn remove_all(&self);

    /// Present and not expired
    fn contains(&self, key: &str) -> bool;

    /// Eviction sweep
    fn remove_all_expired(&self);
}
