//! Entry types for the cache storage layer.
//!
//! Defines [`Entry`], the value envelope stored by every
//! [`Strategy`](crate::strategy::Strategy), along with [`Payload`] and
//! [`CompressionInfo`].
//!
//! All expiry math uses [`Instant`] so TTL comparisons are monotonic;
//! wall-clock time never participates. Last-access and expiry are stored as
//! atomic nanosecond offsets from the creation instant, so entries can be
//! shared as `Arc<Entry<V>>` and touched by many concurrent readers without
//! a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::codec::CompressionAlgorithm;

/// The stored payload: either the caller's value or its compressed form.
#[derive(Debug, Clone)]
pub enum Payload<V> {
    /// The value as the caller provided it.
    Plain(V),
    /// Serialized and compressed bytes plus the metadata needed to restore.
    Compressed {
        /// Compressed serialized representation of the value.
        bytes: Bytes,
        /// Algorithm and size bookkeeping for this payload.
        info: CompressionInfo,
    },
}

/// Metadata recorded when a payload is stored compressed.
///
/// Both sizes are positive whenever this struct exists: the codec only
/// compresses non-empty serialized values and only keeps results that are
/// strictly smaller than the raw encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionInfo {
    /// Algorithm used to produce the compressed bytes.
    pub algorithm: CompressionAlgorithm,
    /// Size of the serialized value before compression, in bytes.
    pub original_size: u64,
    /// Size after compression, in bytes.
    pub compressed_size: u64,
}

impl CompressionInfo {
    /// Compressed size as a fraction of the original size.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.compressed_size as f64 / self.original_size as f64
    }

    /// Number of bytes saved by compressing.
    #[must_use]
    pub fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.compressed_size)
    }
}

/// Converts a duration to a u64 nanosecond count.
///
/// Saturates at `u64::MAX` (~584 years), far beyond any sane TTL.
fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// A stored value plus its lifetime metadata.
///
/// Timestamps are offsets in nanoseconds from `created`:
/// - `expires_nanos` of 0 means the entry never expires;
/// - `last_access_nanos` starts at 0 (creation counts as an access) and is
///   advanced with `fetch_max`, so concurrent touches race harmlessly to
///   the latest value and last-access can never precede creation.
#[derive(Debug)]
pub struct Entry<V> {
    payload: Payload<V>,
    created: Instant,
    expires_nanos: AtomicU64,
    last_access_nanos: AtomicU64,
}

impl<V> Entry<V> {
    /// Creates an entry holding `payload`, expiring after `ttl`.
    ///
    /// A `None` or zero TTL means the entry never expires.
    #[must_use]
    pub fn new(payload: Payload<V>, ttl: Option<Duration>) -> Self {
        let expires = ttl
            .filter(|ttl| !ttl.is_zero())
            .map_or(0, |ttl| duration_nanos(ttl).max(1));
        Self {
            payload,
            created: Instant::now(),
            expires_nanos: AtomicU64::new(expires),
            last_access_nanos: AtomicU64::new(0),
        }
    }

    /// Convenience constructor for an uncompressed value.
    #[must_use]
    pub fn plain(value: V, ttl: Option<Duration>) -> Self {
        Self::new(Payload::Plain(value), ttl)
    }

    /// The stored payload.
    #[must_use]
    pub fn payload(&self) -> &Payload<V> {
        &self.payload
    }

    /// Whether the payload is stored compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        matches!(self.payload, Payload::Compressed { .. })
    }

    /// Compression metadata, if the payload is compressed.
    #[must_use]
    pub fn compression_info(&self) -> Option<&CompressionInfo> {
        match &self.payload {
            Payload::Compressed { info, .. } => Some(info),
            Payload::Plain(_) => None,
        }
    }

    /// Nanoseconds elapsed since creation, clamped to u64.
    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.created.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Whether the entry's TTL has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let expires = self.expires_nanos.load(Ordering::Acquire);
        expires != 0 && self.elapsed_nanos() >= expires
    }

    /// Remaining time to live; zero if no TTL is set or it already passed.
    #[must_use]
    pub fn ttl_remaining(&self) -> Duration {
        let expires = self.expires_nanos.load(Ordering::Acquire);
        if expires == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(expires.saturating_sub(self.elapsed_nanos()))
    }

    /// Time since the entry was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Time since the entry was last touched (or created, if never touched).
    #[must_use]
    pub fn time_since_access(&self) -> Duration {
        let last = self.last_access_nanos.load(Ordering::Acquire);
        Duration::from_nanos(self.elapsed_nanos().saturating_sub(last))
    }

    /// Records a read access, advancing last-access to now.
    pub fn touch(&self) {
        self.last_access_nanos
            .fetch_max(self.elapsed_nanos(), Ordering::AcqRel);
    }

    /// Replaces the entry's TTL, measured from now.
    ///
    /// A `None` or zero TTL clears expiry entirely.
    pub fn update_expiry(&self, ttl: Option<Duration>) {
        let expires = ttl.filter(|ttl| !ttl.is_zero()).map_or(0, |ttl| {
            self.elapsed_nanos().saturating_add(duration_nanos(ttl)).max(1)
        });
        self.expires_nanos.store(expires, Ordering::Release);
    }
}
