//! Cache statistics.
//!
//! Counters are plain atomics updated on the hot path; [`CacheStats`] is a
//! point-in-time snapshot. Each field is read atomically, but the snapshot
//! as a whole is not taken under a lock, so fields may be skewed by
//! concurrent operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative operation counters shared by a cache and its callbacks.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl Counters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, in_flight: usize, key_count: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            in_flight,
            key_count,
        }
    }
}

/// Point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing (or only an expired entry).
    pub misses: u64,
    /// Entries displaced by capacity pressure or TTL.
    pub evictions: u64,
    /// Caller-initiated removals.
    pub invalidations: u64,
    /// Single-flight computations currently running.
    pub in_flight: usize,
    /// Entries currently stored.
    pub key_count: usize,
}

impl CacheStats {
    /// Fraction of reads served from the cache, 0.0 when nothing was read.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
