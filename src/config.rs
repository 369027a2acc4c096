//! Configuration for the memory tier, the disk tier and the cache facade

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Directory created under the platform cache dir when no root is given
pub const DEFAULT_DIRECTORY_NAME: &str = "AnyCache";

/// Limits for the in-process tier
///
/// A limit of `0` means unlimited, same as `usize::MAX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of entries held in memory
    pub count_limit: usize,

    /// Maximum sum of entity costs in bytes
    pub byte_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            count_limit: usize::MAX,
            byte_limit: usize::MAX,
        }
    }
}

impl MemoryConfig {
    pub fn new(count_limit: usize, byte_limit: usize) -> Self {
        Self {
            count_limit,
            byte_limit,
        }
    }

    pub(crate) fn effective_count_limit(&self) -> usize {
        effective_limit(self.count_limit)
    }

    pub(crate) fn effective_byte_limit(&self) -> usize {
        effective_limit(self.byte_limit)
    }
}

/// Location and budgets of the persistent tier
///
/// Budgets are enforced by the eviction sweep, only when positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Root under which each named cache gets its own subdirectory
    pub root_directory: PathBuf,

    /// Maximum number of files kept after a sweep
    pub count_limit: usize,

    /// Maximum total file size in bytes kept after a sweep
    pub byte_limit: u64,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            root_directory: default_root_directory(),
            count_limit: usize::MAX,
            byte_limit: u64::MAX,
        }
    }
}

impl DiskConfig {
    pub fn new(root_directory: impl Into<PathBuf>, count_limit: usize, byte_limit: u64) -> Self {
        Self {
            root_directory: root_directory.into(),
            count_limit,
            byte_limit,
        }
    }

    /// Default limits rooted at `root_directory`
    pub fn in_directory(root_directory: impl Into<PathBuf>) -> Self {
        Self {
            root_directory: root_directory.into(),
            ..Default::default()
        }
    }
}

/// Platform cache directory joined with [`DEFAULT_DIRECTORY_NAME`]
pub fn default_root_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_DIRECTORY_NAME)
}

fn effective_limit(limit: usize) -> usize {
    if limit == 0 {
        usize::MAX
    } else {
        limit
    }
}

/// Full configuration of an [`AnyCache`](crate::AnyCache)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memory tier limits
    pub memory: MemoryConfig,

    /// Disk tier location and budgets
    pub disk: DiskConfig,

    /// Quiet period after the last write before a sweep runs
    pub debounce: Duration,

    /// Interval of the unconditional background sweep
    pub trim_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            disk: DiskConfig::default(),
            // Coalesce write bursts into one sweep
            debounce: Duration::from_millis(100),
            trim_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.debounce.is_zero() {
            return Err(CacheError::ConfigError(
                "debounce must be greater than 0".to_string(),
            ));
        }

        if self.trim_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "trim_interval must be greater than 0".to_string(),
            ));
        }

        if self.disk.root_directory.as_os_str().is_empty() {
            return Err(CacheError::ConfigError(
                "disk root_directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Preset configurations for common use cases
impl CacheConfig {
    /// No budgets on either tier
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Memory-constrained environments
    pub fn small() -> Self {
        Self {
            memory: MemoryConfig::new(100, 8 * 1024 * 1024), // 8 MB
            disk: DiskConfig {
                count_limit: 1_000,
                byte_limit: 64 * 1024 * 1024, // 64 MB
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Large media caches (decoded images, downloads)
    pub fn media() -> Self {
        Self {
            memory: MemoryConfig::new(500, 128 * 1024 * 1024), // 128 MB
            disk: DiskConfig {
                count_limit: 0,
                byte_limit: 1024 * 1024 * 1024, // 1 GB
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    memory_count_limit: Option<usize>,
    memory_byte_limit: Option<usize>,
    root_directory: Option<PathBuf>,
    disk_count_limit: Option<usize>,
    disk_byte_limit: Option<u64>,
    debounce: Option<Duration>,
    trim_interval: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set the memory tier entry limit
    pub fn memory_count_limit(mut self, limit: usize) -> Self {
        self.memory_count_limit = Some(limit);
        self
    }

    /// Set the memory tier cost limit in bytes
    pub fn memory_byte_limit(mut self, limit: usize) -> Self {
        self.memory_byte_limit = Some(limit);
        self
    }

    /// Set the root directory of the disk tier
    pub fn root_directory(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_directory = Some(root.into());
        self
    }

    /// Set the disk tier file count budget
    pub fn disk_count_limit(mut self, limit: usize) -> Self {
        self.disk_count_limit = Some(limit);
        self
    }

    /// Set the disk tier byte budget
    pub fn disk_byte_limit(mut self, limit: u64) -> Self {
        self.disk_byte_limit = Some(limit);
        self
    }

    /// Set the write debounce window
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = Some(window);
        self
    }

    /// Set the background sweep interval
    pub fn trim_interval(mut self, interval: Duration) -> Self {
        self.trim_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            memory: MemoryConfig {
                count_limit: self
                    .memory_count_limit
                    .unwrap_or(defaults.memory.count_limit),
                byte_limit: self.memory_byte_limit.unwrap_or(defaults.memory.byte_limit),
            },
            disk: DiskConfig {
                root_directory: self
                    .root_directory
                    .unwrap_or(defaults.disk.root_directory),
                count_limit: self.disk_count_limit.unwrap_or(defaults.disk.count_limit),
                byte_limit: self.disk_byte_limit.unwrap_or(defaults.disk.byte_limit),
            },
            debounce: self.debounce.unwrap_or(defaults.debounce),
            trim_interval: self.trim_interval.unwrap_or(defaults.trim_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(100));
        assert_eq!(config.trim_interval, Duration::from_secs(60));
        assert_eq!(config.memory.count_limit, usize::MAX);
        assert!(config.disk.root_directory.ends_with(DEFAULT_DIRECTORY_NAME));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CacheConfig::default();
        config.debounce = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = CacheConfig::default();
        config.trim_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = CacheConfig::default();
        config.disk.root_directory = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .memory_count_limit(10)
            .memory_byte_limit(1024)
            .root_directory("/tmp/anycache-test")
            .disk_count_limit(20)
            .disk_byte_limit(4096)
            .debounce(Duration::from_millis(5))
            .build();

        assert_eq!(config.memory, MemoryConfig::new(10, 1024));
        assert_eq!(config.disk, DiskConfig::new("/tmp/anycache-test", 20, 4096));
        assert_eq!(config.debounce, Duration::from_millis(5));
        assert_eq!(config.trim_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_zero_memory_limit_is_unlimited() {
        let config = MemoryConfig::new(0, 0);
        assert_eq!(config.effective_count_limit(), usize::MAX);
        assert_eq!(config.effective_byte_limit(), usize::MAX);
        assert_eq!(MemoryConfig::new(3, 9).effective_count_limit(), 3);
    }

    #[test]
    fn test_preset_configs() {
        assert_eq!(CacheConfig::small().memory.count_limit, 100);
        assert_eq!(CacheConfig::media().disk.byte_limit, 1024 * 1024 * 1024);
        assert_eq!(CacheConfig::unbounded(), CacheConfig::default());
    }

    #[test]
    fn test_config_serde() {
        let config = CacheConfig::builder().root_directory("/var/cache/app").build();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
