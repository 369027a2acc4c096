//! Hit, miss and eviction counters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a cache's counters and tier sizes
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Reads answered by the memory tier
    pub memory_hits: u64,

    /// Reads answered by the disk tier
    pub disk_hits: u64,

    /// Reads that found nothing
    pub misses: u64,

    /// Reads that found an expired entry
    pub expirations: u64,

    /// Reads that had to decode the value into a different type
    pub redecodes: u64,

    /// Completed disk sweeps
    pub sweeps: u64,

    /// Disk entries evicted by sweeps
    pub swept_entries: u64,

    /// Entries currently in the memory tier
    pub memory_entries: usize,

    /// Summed cost of the memory tier
    pub memory_bytes: usize,

    /// Entries currently in the disk manifest
    pub disk_entries: usize,

    /// Summed file size of the disk tier
    pub disk_bytes: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }

    /// Share of reads that returned a value, as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses + self.expirations;
        if total == 0 {
            0.0
        } else {
            (self.hits() as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {} (memory {}, disk {}), misses: {}, expired: {}, ",
            self.hits(),
            self.memory_hits,
            self.disk_hits,
            self.misses,
            self.expirations
        )?;
        write!(
            f,
            "hit_rate: {:.2}%, memory: {} entries / {} bytes, ",
            self.hit_rate(),
            self.memory_entries,
            self.memory_bytes
        )?;
        write!(
            f,
            "disk: {} entries / {} bytes, sweeps: {} ({} evicted) }}",
            self.disk_entries,
            self.disk_bytes,
            self.sweeps,
            self.swept_entries
        )
    }
}

/// Lock-free counters updated on every read and sweep
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    redecodes: AtomicU64,
    sweeps: AtomicU64,
    swept_entries: AtomicU64,
}

impl StatsRecorder {
    pub fn memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn expired(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn redecoded(&self) {
        self.redecodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn swept(&self, evicted: usize) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.swept_entries.fetch_add(evicted as u64, Ordering::Relaxed);
    }

    /// Counter values; tier sizes are left for the caller to fill in
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            redecodes: self.redecodes.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            swept_entries: self.swept_entries.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            memory_hits: 50,
            disk_hits: 25,
            misses: 20,
            expirations: 5,
            ..Default::default()
        };
        assert_eq!(stats.hits(), 75);
        assert_eq!(stats.hit_rate(), 75.0);
    }

    #[test]
    fn test_hit_rate_without_reads() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_recorder_snapshot() {
        let recorder = StatsRecorder::default();
        recorder.memory_hit();
        recorder.disk_hit();
        recorder.disk_hit();
        recorder.miss();
        recorder.swept(3);
        recorder.swept(0);

        let stats = recorder.snapshot();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.disk_hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sweeps, 2);
        assert_eq!(stats.swept_entries, 3);
        assert_eq!(stats.memory_entries, 0);
    }

    #[test]
    fn test_display() {
        let stats = CacheStats {
            memory_hits: 3,
            misses: 1,
            ..Default::default()
        };
        let display = stats.to_string();
        assert!(display.contains("hits: 3"));
        assert!(display.contains("hit_rate: 75.00%"));
    }
}
