//! # AnyCache
//!
//! A two-tier object cache: a bounded in-process tier backed by a bounded
//! on-disk tier, unified behind one key-value contract with expiry, cost
//! accounting and automatic eviction.
//!
//! ## Features
//!
//! - **Any value**: anything implementing [`CacheSerializable`] can be
//!   stored; `serde` types go through [`Codable`]
//! - **Memory tier**: LRU eviction by entry count and total byte cost
//! - **Disk tier**: one file per entry, manifest rebuilt on startup, writes
//!   performed on a background I/O thread
//! - **Expiry**: never, after a duration, or at a deadline; expired entries
//!   are removed lazily on read and by periodic sweeps
//! - **Sweeps**: debounced after writes and on a fixed interval; the disk
//!   tier keeps the longest-lived entries that fit its budgets
//!
//! ## Example
//!
//! ```no_run
//! use anycache::{AnyCache, DiskConfig, Expiry, MemoryConfig};
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     let cache = AnyCache::new(
//!         "thumbnails",
//!         MemoryConfig::new(100, 16 * 1024 * 1024),
//!         DiskConfig::new("/tmp/cache", 0, 256 * 1024 * 1024),
//!     )?;
//!
//!     cache.set_object("avatar.png", vec![0u8; 1024], Expiry::after(Duration::from_secs(3600)))?;
//!
//!     let bytes: Vec<u8> = cache.object("avatar.png")?;
//!     println!("Cached {} bytes", bytes.len());
//!
//!     match cache.object::<Vec<u8>>("missing") {
//!         Err(e) if e.is_not_found() => println!("Not cached yet"),
//!         other => println!("{:?}", other.map(|v| v.len())),
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod expiry;
pub mod serializable;
pub mod stats;
pub mod storage;

// Re-export main types for convenience
pub use cache::AnyCache;
pub use config::{CacheConfig, CacheConfigBuilder, DiskConfig, MemoryConfig};
pub use entity::Entity;
pub use error::{CacheError, Result};
pub use expiry::Expiry;
pub use serializable::{CacheSerializable, Codable, ErasedValue};
pub use stats::CacheStats;
pub use storage::{
    DiskTier, EvictionReason, ManifestRecord, MemoryTier, SweepPlan, SweepReport, Tier,
    WriteReceipt,
};
