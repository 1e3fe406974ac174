//! Cache configuration.
//!
//! [`Config`] is a plain struct with a [`Default`] that works out of the
//! box, plus fluent `with_*` methods for the fields callers usually tune.
//! Validation happens once, in [`Config::validate`], which constructors
//! call before building anything.

use std::time::Duration;

use crate::codec::CompressionAlgorithm;
use crate::error::{CacheError, CacheResult};
use crate::strategy::EvictionPolicy;

/// Compression settings for stored values.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Master switch; when false, values are always stored plain.
    pub enabled: bool,
    /// Algorithm applied to values that clear the threshold.
    pub algorithm: CompressionAlgorithm,
    /// Minimum serialized size, in bytes, before compression is attempted.
    pub min_size: usize,
    /// Compression level, 0 (none) through 9 (best).
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: CompressionAlgorithm::None,
            min_size: 1024,
            level: 6,
        }
    }
}

impl CompressionConfig {
    /// Enabled compression with the given algorithm and threshold.
    #[must_use]
    pub fn new(algorithm: CompressionAlgorithm, min_size: usize) -> Self {
        Self {
            enabled: true,
            algorithm,
            min_size,
            level: 6,
        }
    }

    /// Sets the compression level (0-9).
    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }
}

/// Top-level cache configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name used in log events and metric labels.
    pub name: String,
    /// Maximum number of entries before the eviction policy kicks in.
    pub max_entries: usize,
    /// TTL applied by `set` and `warmup` when none is given. `None` = no expiry.
    pub default_ttl: Option<Duration>,
    /// Cadence of the background expired-entry sweeper. `None` disables it;
    /// expired entries are then only removed lazily on read.
    pub cleanup_interval: Option<Duration>,
    /// Which entry to evict when the cache is full.
    pub eviction_policy: EvictionPolicy,
    /// Transparent value compression.
    pub compression: CompressionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "cache".to_string(),
            max_entries: 1024,
            default_ttl: None,
            cleanup_interval: Some(Duration::from_secs(60)),
            eviction_policy: EvictionPolicy::Lru,
            compression: CompressionConfig::default(),
        }
    }
}

impl Config {
    /// Sets the cache name used in logs and metric labels.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the entry capacity.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the default TTL applied by `set` and `warmup`.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Sets the background sweeper cadence.
    #[must_use]
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Disables the background sweeper entirely.
    #[must_use]
    pub fn without_cleanup(mut self) -> Self {
        self.cleanup_interval = None;
        self
    }

    /// Selects the eviction policy.
    #[must_use]
    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Replaces the compression settings.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Checks the configuration for values that cannot work.
    pub fn validate(&self) -> CacheResult<()> {
        if self.max_entries == 0 {
            return Err(CacheError::Config(
                "max_entries must be positive".to_string(),
            ));
        }
        if self.compression.enabled {
            if self.compression.level > 9 {
                return Err(CacheError::Config(format!(
                    "compression level {} out of range 0-9",
                    self.compression.level
                )));
            }
            if self.compression.min_size == 0 {
                return Err(CacheError::Config(
                    "compression min_size must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}
