//! `flightcache` -- in-process caching with single-flight loads.
//!
//! The crate wires three subsystems into one cache:
//!
//! - **Entry store** ([`store`]): a bounded concurrent map over a pluggable
//!   eviction strategy ([`strategy`]: LRU / LFU / FIFO) with per-entry TTL
//!   and a background sweeper for expired entries
//! - **Single-flight group** ([`singleflight`]): keyed deduplication of
//!   in-flight computations with synchronous waiting, channel delivery,
//!   and per-caller cancellation
//! - **Hook dispatch** ([`hooks`]): priority-ordered, conditionally-gated
//!   callbacks for hit / miss / evict / invalidate events
//!
//! [`Cache`] is the façade over all three, with transparent value
//! compression ([`codec`]) and operation metrics ([`metrics`]) on top.

pub mod cache;
pub mod codec;
pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod singleflight;
pub mod stats;
pub mod store;
pub mod strategy;

// Façade
pub use cache::Cache;

// Configuration
pub use config::{CompressionConfig, Config};

// Codec
pub use codec::{Codec, CompressionAlgorithm};

// Context
pub use context::Context;

// Entries
pub use entry::{CompressionInfo, Entry, Payload};

// Errors
pub use error::{CacheError, CacheResult};

// Hooks
pub use hooks::{Condition, EvictHook, HitHook, HookPriority, Hooks, InvalidateHook, MissHook};

// Metrics
pub use metrics::{Labels, MetricsExporter, NoopExporter, TracingExporter};

// Single-flight
pub use singleflight::{FlightResult, Group};

// Stats
pub use stats::CacheStats;

// Store
pub use store::{CleanupCallback, EvictCallback, EvictReason, MemoryStore, Store};

// Strategies
pub use strategy::{
    create_strategy, EvictionPolicy, FifoStrategy, LfuStrategy, LruStrategy, Strategy,
};
