//! First-in-first-out eviction strategy.
//!
//! A map plus an insertion queue. Removals are lazy: the queue keeps a
//! `(insertion_id, key)` pair and eviction skips pairs whose id no longer
//! matches the map, so `remove` stays O(1) and re-added keys cannot be
//! confused with their stale queue positions. The queue is compacted once
//! stale pairs outnumber live ones, keeping amortized O(1) adds.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{CacheError, CacheResult};
use crate::strategy::Strategy;

struct FifoSlot<V> {
    entry: Arc<Entry<V>>,
    insert_id: u64,
}

/// FIFO-ordered bounded container.
pub struct FifoStrategy<V> {
    capacity: usize,
    slots: HashMap<String, FifoSlot<V>>,
    queue: VecDeque<(u64, String)>,
    next_id: u64,
}

impl<V> FifoStrategy<V> {
    /// Creates a FIFO strategy holding at most `capacity` entries.
    pub fn new(capacity: usize) -> CacheResult<Self> {
        if capacity == 0 {
            return Err(CacheError::Config(
                "strategy capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            slots: HashMap::with_capacity(capacity),
            queue: VecDeque::with_capacity(capacity),
            next_id: 0,
        })
    }

    fn evict_oldest(&mut self) -> Option<(String, Arc<Entry<V>>)> {
        while let Some((id, key)) = self.queue.pop_front() {
            let live = self
                .slots
                .get(&key)
                .is_some_and(|slot| slot.insert_id == id);
            if live {
                let slot = self.slots.remove(&key)?;
                return Some((key, slot.entry));
            }
            // Stale pair left behind by remove or clear; skip it.
        }
        None
    }

    fn maybe_compact(&mut self) {
        if self.queue.len() > 16 && self.queue.len() > self.slots.len() * 2 {
            let slots = &self.slots;
            self.queue
                .retain(|(id, key)| slots.get(key).is_some_and(|slot| slot.insert_id == *id));
        }
    }
}

impl<V: Send + Sync> Strategy<V> for FifoStrategy<V> {
    fn add(&mut self, key: &str, entry: Arc<Entry<V>>) -> Option<(String, Arc<Entry<V>>)> {
        if let Some(slot) = self.slots.get_mut(key) {
            // Update in place; the key keeps its queue position.
            slot.entry = entry;
            return None;
        }

        let evicted = if self.slots.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let id = self.next_id;
        self.next_id += 1;
        self.slots.insert(
            key.to_string(),
            FifoSlot {
                entry,
                insert_id: id,
            },
        );
        self.queue.push_back((id, key.to_string()));
        self.maybe_compact();

        evicted
    }

    fn get(&mut self, key: &str) -> Option<Arc<Entry<V>>> {
        // FIFO ignores accesses.
        self.peek(key)
    }

    fn peek(&self, key: &str) -> Option<Arc<Entry<V>>> {
        self.slots.get(key).map(|slot| Arc::clone(&slot.entry))
    }

    fn remove(&mut self, key: &str) -> Option<Arc<Entry<V>>> {
        self.slots.remove(key).map(|slot| slot.entry)
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
        self.queue.clear();
    }
}
