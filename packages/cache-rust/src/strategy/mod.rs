//! Bounded eviction strategies.
//!
//! A [`Strategy`] is a capacity-bounded keyed container over shared cache
//! entries with a policy-specific ordering used to pick the victim when the
//! container is full:
//!
//! - [`LruStrategy`]: recency list, evicts the least recently used
//! - [`LfuStrategy`]: frequency index, evicts the least frequently used
//! - [`FifoStrategy`]: insertion queue, evicts the oldest insertion
//!
//! Strategies are plain data structures with `&mut` mutators; the store
//! layer provides the locking.

pub mod fifo;
pub mod lfu;
pub mod lru;

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{CacheError, CacheResult};

pub use fifo::FifoStrategy;
pub use lfu::LfuStrategy;
pub use lru::LruStrategy;

/// Which entry a full cache sacrifices on insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Least recently used.
    #[default]
    Lru,
    /// Least frequently used, ties broken by least recent.
    Lfu,
    /// First in, first out.
    Fifo,
}

impl EvictionPolicy {
    /// Stable display name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lru => "LRU",
            Self::Lfu => "LFU",
            Self::Fifo => "FIFO",
        }
    }
}

/// A bounded keyed container with policy-driven eviction.
///
/// Invariants after every public operation: `len() <= capacity()`, and the
/// policy ordering tracks exactly the keys present in the map.
///
/// `add` returns the evicted key *and entry* so the store layer can hand
/// the real value to eviction callbacks rather than a placeholder.
pub trait Strategy<V>: Send + Sync {
    /// Inserts or replaces `key`. Returns the entry evicted to make room,
    /// if any. Replacing an existing key is an update, never an eviction.
    fn add(&mut self, key: &str, entry: Arc<Entry<V>>) -> Option<(String, Arc<Entry<V>>)>;

    /// Looks up `key`, recording the access per the policy (LRU promotes,
    /// LFU counts, FIFO does nothing).
    fn get(&mut self, key: &str) -> Option<Arc<Entry<V>>>;

    /// Looks up `key` without disturbing the policy ordering. Used for TTL
    /// scans and metadata listing.
    fn peek(&self, key: &str) -> Option<Arc<Entry<V>>>;

    /// Removes `key`, returning its entry.
    fn remove(&mut self, key: &str) -> Option<Arc<Entry<V>>>;

    /// All keys currently present, in no particular order.
    fn keys(&self) -> Vec<String>;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether the container is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    fn capacity(&self) -> usize;

    /// Removes everything.
    fn clear(&mut self);
}

/// Builds the strategy for `policy` with the given capacity.
///
/// Fails with a configuration error when `capacity` is zero.
pub fn create_strategy<V: Send + Sync + 'static>(
    policy: EvictionPolicy,
    capacity: usize,
) -> CacheResult<Box<dyn Strategy<V>>> {
    if capacity == 0 {
        return Err(CacheError::Config(
            "strategy capacity must be positive".to_string(),
        ));
    }
    Ok(match policy {
        EvictionPolicy::Lru => Box::new(LruStrategy::new(capacity)?),
        EvictionPolicy::Lfu => Box::new(LfuStrategy::new(capacity)?),
        EvictionPolicy::Fifo => Box::new(FifoStrategy::new(capacity)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: u32) -> Arc<Entry<u32>> {
        Arc::new(Entry::plain(value, None))
    }

    #[test]
    fn factory_rejects_zero_capacity() {
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu, EvictionPolicy::Fifo] {
            match create_strategy::<u32>(policy, 0) {
                Err(err) => assert!(matches!(err, CacheError::Config(_))),
                Ok(_) => panic!("expected zero capacity to be rejected"),
            }
        }
    }

    #[test]
    fn factory_builds_each_policy() {
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu, EvictionPolicy::Fifo] {
            let mut strategy = create_strategy::<u32>(policy, 4).unwrap();
            assert_eq!(strategy.capacity(), 4);
            assert!(strategy.is_empty());

            strategy.add("a", entry(1));
            assert_eq!(strategy.len(), 1);
            assert!(strategy.peek("a").is_some());
        }
    }

    #[test]
    fn policy_names_are_stable() {
        assert_eq!(EvictionPolicy::Lru.as_str(), "LRU");
        assert_eq!(EvictionPolicy::Lfu.as_str(), "LFU");
        assert_eq!(EvictionPolicy::Fifo.as_str(), "FIFO");
    }

    /// Capacity invariant across a fixed mix of operations, for each policy.
    #[test]
    fn size_never_exceeds_capacity() {
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu, EvictionPolicy::Fifo] {
            let mut strategy = create_strategy::<u32>(policy, 3).unwrap();
            for i in 0_u32..50 {
                let key = format!("k{}", i % 7);
                strategy.add(&key, entry(i));
                if i % 3 == 0 {
                    strategy.get(&format!("k{}", i % 5));
                }
                if i % 11 == 0 {
                    strategy.remove(&format!("k{}", i % 4));
                }
                assert!(strategy.len() <= strategy.capacity());
                assert_eq!(strategy.keys().len(), strategy.len());
            }
        }
    }
}
