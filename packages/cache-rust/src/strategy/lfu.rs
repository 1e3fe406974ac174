//! Least-frequently-used eviction strategy.
//!
//! Entries carry an access frequency and a monotonic access sequence
//! number. A `BTreeMap` keyed by `(frequency, sequence)` orders candidates
//! so the victim lookup is the first element: the least frequent entry,
//! ties broken by least recent access. Touch and evict are O(log n).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{CacheError, CacheResult};
use crate::strategy::Strategy;

struct LfuSlot<V> {
    entry: Arc<Entry<V>>,
    frequency: u64,
    seq: u64,
}

/// LFU-ordered bounded container.
pub struct LfuStrategy<V> {
    capacity: usize,
    slots: HashMap<String, LfuSlot<V>>,
    order: BTreeMap<(u64, u64), String>,
    next_seq: u64,
}

impl<V> LfuStrategy<V> {
    /// Creates an LFU strategy holding at most `capacity` entries.
    pub fn new(capacity: usize) -> CacheResult<Self> {
        if capacity == 0 {
            return Err(CacheError::Config(
                "strategy capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            slots: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            next_seq: 0,
        })
    }

    fn bump(&mut self, key: &str) {
        let Some(slot) = self.slots.get_mut(key) else {
            return;
        };
        self.order.remove(&(slot.frequency, slot.seq));
        slot.frequency += 1;
        slot.seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((slot.frequency, slot.seq), key.to_string());
    }

    fn evict_least(&mut self) -> Option<(String, Arc<Entry<V>>)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.slots.remove(&key)?;
        Some((key, slot.entry))
    }
}

impl<V: Send + Sync> Strategy<V> for LfuStrategy<V> {
    fn add(&mut self, key: &str, entry: Arc<Entry<V>>) -> Option<(String, Arc<Entry<V>>)> {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.entry = entry;
            self.bump(key);
            return None;
        }

        let evicted = if self.slots.len() >= self.capacity {
            self.evict_least()
        } else {
            None
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(
            key.to_string(),
            LfuSlot {
                entry,
                frequency: 1,
                seq,
            },
        );
        self.order.insert((1, seq), key.to_string());

        evicted
    }

    fn get(&mut self, key: &str) -> Option<Arc<Entry<V>>> {
        if !self.slots.contains_key(key) {
            return None;
        }
        self.bump(key);
        self.slots.get(key).map(|slot| Arc::clone(&slot.entry))
    }

    fn peek(&self, key: &str) -> Option<Arc<Entry<V>>> {
        self.slots.get(key).map(|slot| Arc::clone(&slot.entry))
    }

    fn remove(&mut self, key: &str) -> Option<Arc<Entry<V>>> {
        let slot = self.slots.remove(key)?;
        self.order.remove(&(slot.frequency, slot.seq));
        Some(slot.entry)
    }

    fn keys(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }
}
