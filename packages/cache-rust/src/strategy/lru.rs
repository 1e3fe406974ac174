//! Least-recently-used eviction strategy.
//!
//! Backed by [`lru::LruCache`]: a doubly-linked recency list with a map of
//! keys to list nodes, giving O(1) add, get, peek, and evict. `add` evicts
//! the list tail when full; `get` moves the node to the head.

use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{CacheError, CacheResult};
use crate::strategy::Strategy;

/// LRU-ordered bounded container.
pub struct LruStrategy<V> {
    cache: lru::LruCache<String, Arc<Entry<V>>>,
}

impl<V> LruStrategy<V> {
    /// Creates an LRU strategy holding at most `capacity` entries.
    pub fn new(capacity: usize) -> CacheResult<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| CacheError::Config("strategy capacity must be positive".to_string()))?;
        Ok(Self {
            cache: lru::LruCache::new(capacity),
        })
    }
}

impl<V: Send + Sync> Strategy<V> for LruStrategy<V> {
    fn add(&mut self, key: &str, entry: Arc<Entry<V>>) -> Option<(String, Arc<Entry<V>>)> {
        match self.cache.push(key.to_string(), entry) {
            // push returns the old value for the same key (an update) or
            // the evicted least-recent pair (an eviction).
            Some((old_key, _)) if old_key == key => None,
            evicted => evicted,
        }
    }

    fn get(&mut self, key: &str) -> Option<Arc<Entry<V>>> {
        self.cache.get(key).cloned()
    }

    fn peek(&self, key: &str) -> Option<Arc<Entry<V>>> {
        self.cache.peek(key).cloned()
    }

    fn remove(&mut self, key: &str) -> Option<Arc<Entry<V>>> {
        self.cache.pop(key)
    }

    fn keys(&self) -> Vec<String> {
        self.cache.iter().map(|(key, _)| key.clone()).collect()
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    fn clear(&mut self) {
        self.cache.clear();
    }
}
