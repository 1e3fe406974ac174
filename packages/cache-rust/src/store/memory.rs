//! In-memory [`Store`] implementation backed by an eviction strategy.
//!
//! A single reader-writer lock guards the strategy. Reads peek under the
//! read lock and check TTL; expired entries are removed asynchronously off
//! the read path and never surface to callers. Policy bookkeeping for a hit
//! takes a short write lock after the read lock is released; the entry's
//! own last-access timestamp is atomic and needs no lock upgrade.
//!
//! An optional background sweeper wakes on a fixed cadence, scans with
//! `peek` (which does not disturb the policy ordering), and removes expired
//! entries. Eviction and cleanup callbacks always fire outside the lock and
//! are panic-isolated so a misbehaving callback cannot poison the store.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::entry::Entry;
use crate::error::{CacheError, CacheResult};
use crate::store::{CleanupCallback, EvictCallback, EvictReason, Store};
use crate::strategy::{create_strategy, EvictionPolicy, Strategy};

struct StoreInner<V> {
    strategy: RwLock<Box<dyn Strategy<V>>>,
    evict_callback: RwLock<Option<EvictCallback<V>>>,
    cleanup_callback: RwLock<Option<CleanupCallback<V>>>,
    closed: AtomicBool,
}

impl<V: Send + Sync + 'static> StoreInner<V> {
    fn notify_evict(&self, key: &str, entry: &Arc<Entry<V>>, reason: EvictReason) {
        let callback = self.evict_callback.read().clone();
        if let Some(callback) = callback {
            let caught =
                std::panic::catch_unwind(AssertUnwindSafe(|| callback(key, entry, reason)));
            if caught.is_err() {
                tracing::warn!(key, reason = reason.as_str(), "eviction callback panicked");
            }
        }
    }

    fn notify_cleanup(&self, key: &str, entry: &Arc<Entry<V>>) {
        let callback = self.cleanup_callback.read().clone();
        if let Some(callback) = callback {
            let caught = std::panic::catch_unwind(AssertUnwindSafe(|| callback(key, entry)));
            if caught.is_err() {
                tracing::warn!(key, "cleanup callback panicked");
            }
        }
    }

    /// Removes every expired entry, firing the cleanup callback for each.
    fn sweep(&self) -> usize {
        let removed = {
            let mut strategy = self.strategy.write();
            let keys = strategy.keys();
            let mut removed = Vec::new();
            for key in keys {
                let expired = strategy.peek(&key).is_some_and(|entry| entry.is_expired());
                if expired {
                    if let Some(entry) = strategy.remove(&key) {
                        removed.push((key, entry));
                    }
                }
            }
            removed
        };

        for (key, entry) in &removed {
            self.notify_cleanup(key, entry);
        }
        removed.len()
    }

    /// Removes `key` if it is still expired, firing the cleanup callback at
    /// most once, gated on the removal actually happening. Runs off the
    /// read path; two racing reads produce one removal and one no-op.
    fn remove_if_expired(this: &Arc<Self>, key: &str) {
        let inner = Arc::clone(this);
        let key = key.to_string();
        let remove = move || {
            let removed = {
                let mut strategy = inner.strategy.write();
                match strategy.peek(&key) {
                    Some(entry) if entry.is_expired() => strategy.remove(&key),
                    _ => None,
                }
            };
            if let Some(entry) = removed {
                inner.notify_cleanup(&key, &entry);
            }
        };

        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::spawn(async move { remove() });
        } else {
            remove();
        }
    }
}

/// Strategy-backed in-memory entry store.
pub struct MemoryStore<V> {
    inner: Arc<StoreInner<V>>,
    policy_reason: EvictReason,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V: Send + Sync + 'static> MemoryStore<V> {
    /// Creates a store with the given policy and capacity.
    ///
    /// When `cleanup_interval` is set and a Tokio runtime is available, a
    /// background sweeper is spawned at that cadence; without a runtime the
    /// store still works, removing expired entries lazily on read.
    pub fn new(
        policy: EvictionPolicy,
        capacity: usize,
        cleanup_interval: Option<Duration>,
    ) -> CacheResult<Self> {
        let strategy = create_strategy(policy, capacity)?;
        let inner = Arc::new(StoreInner {
            strategy: RwLock::new(strategy),
            evict_callback: RwLock::new(None),
            cleanup_callback: RwLock::new(None),
            closed: AtomicBool::new(false),
        });
        let (shutdown, _) = watch::channel(false);

        let policy_reason = match policy {
            EvictionPolicy::Lru => EvictReason::Lru,
            EvictionPolicy::Lfu => EvictReason::Lfu,
            EvictionPolicy::Fifo => EvictReason::Fifo,
        };

        let sweeper = cleanup_interval
            .filter(|interval| !interval.is_zero())
            .and_then(|interval| {
                if tokio::runtime::Handle::try_current().is_err() {
                    tracing::warn!(
                        "no tokio runtime; expired entries will only be removed lazily"
                    );
                    return None;
                }
                Some(Self::spawn_sweeper(&inner, &shutdown, interval))
            });

        Ok(Self {
            inner,
            policy_reason,
            shutdown,
            sweeper: Mutex::new(sweeper),
        })
    }

    fn spawn_sweeper(
        inner: &Arc<StoreInner<V>>,
        shutdown: &watch::Sender<bool>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(inner);
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; wait a full interval
            // before the first sweep.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = inner.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, "swept expired entries");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    }
}

impl<V: Send + Sync + 'static> Store<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<Arc<Entry<V>>> {
        let entry = { self.inner.strategy.read().peek(key) }?;

        if entry.is_expired() {
            StoreInner::remove_if_expired(&self.inner, key);
            return None;
        }

        entry.touch();
        // Policy bookkeeping under a short write lock, after the read lock
        // is gone. The peeked entry stays authoritative if the key was
        // concurrently removed.
        let _ = self.inner.strategy.write().get(key);
        Some(entry)
    }

    fn set(&self, key: &str, entry: Entry<V>) -> CacheResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CacheError::Storage("store is closed".to_string()));
        }

        let evicted = { self.inner.strategy.write().add(key, Arc::new(entry)) };
        if let Some((evicted_key, evicted_entry)) = evicted {
            self.inner
                .notify_evict(&evicted_key, &evicted_entry, self.policy_reason);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<Option<Arc<Entry<V>>>> {
        Ok(self.inner.strategy.write().remove(key))
    }

    fn peek(&self, key: &str) -> Option<Arc<Entry<V>>> {
        self.inner.strategy.read().peek(key)
    }

    fn keys(&self) -> Vec<String> {
        self.inner.strategy.read().keys()
    }

    fn len(&self) -> usize {
        self.inner.strategy.read().len()
    }

    fn capacity(&self) -> usize {
        self.inner.strategy.read().capacity()
    }

    fn clear(&self) -> CacheResult<()> {
        self.inner.strategy.write().clear();
        Ok(())
    }

    fn cleanup(&self) -> usize {
        if self.inner.closed.load(Ordering::Acquire) {
            return 0;
        }
        self.inner.sweep()
    }

    fn close(&self) -> CacheResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            // Double-close is tolerated.
            return Ok(());
        }
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.inner.strategy.write().clear();
        Ok(())
    }

    fn set_evict_callback(&self, callback: Option<EvictCallback<V>>) {
        *self.inner.evict_callback.write() = callback;
    }

    fn set_cleanup_callback(&self, callback: Option<CleanupCallback<V>>) {
        *self.inner.cleanup_callback.write() = callback;
    }
}

impl<V> Drop for MemoryStore<V> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::entry::Payload;

    fn store(policy: EvictionPolicy, capacity: usize) -> MemoryStore<u32> {
        MemoryStore::new(policy, capacity, None).unwrap()
    }

    fn value_of(entry: &Arc<Entry<u32>>) -> u32 {
        match entry.payload() {
            Payload::Plain(v) => *v,
            Payload::Compressed { .. } => unreachable!("test entries are plain"),
        }
    }

    #[test]
    fn set_get_delete_round_trip() {
        let store = store(EvictionPolicy::Lru, 4);

        store.set("a", Entry::plain(1, None)).unwrap();
        assert_eq!(value_of(&store.get("a").unwrap()), 1);
        assert_eq!(store.len(), 1);

        let removed = store.delete("a").unwrap().unwrap();
        assert_eq!(value_of(&removed), 1);
        assert!(store.get("a").is_none());
        assert!(store.delete("a").unwrap().is_none());
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let store = store(EvictionPolicy::Lru, 3);
        for i in 0..20 {
            store.set(&format!("k{i}"), Entry::plain(i, None)).unwrap();
            assert!(store.len() <= store.capacity());
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn eviction_callback_gets_real_value_and_policy_reason() {
        let store = store(EvictionPolicy::Lru, 2);
        let seen: Arc<parking_lot::Mutex<Vec<(String, u32, EvictReason)>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        store.set_evict_callback(Some(Arc::new(move |key, entry, reason| {
            sink.lock().push((key.to_string(), value_of(entry), reason));
        })));

        store.set("a", Entry::plain(1, None)).unwrap();
        store.set("b", Entry::plain(2, None)).unwrap();
        store.set("c", Entry::plain(3, None)).unwrap();

        let events = seen.lock();
        assert_eq!(events.as_slice(), &[("a".to_string(), 1, EvictReason::Lru)]);
    }

    #[test]
    fn get_promotes_through_the_store() {
        let store = store(EvictionPolicy::Lru, 2);
        store.set("a", Entry::plain(1, None)).unwrap();
        store.set("b", Entry::plain(2, None)).unwrap();

        assert!(store.get("a").is_some());
        store.set("c", Entry::plain(3, None)).unwrap();

        assert!(store.peek("a").is_some());
        assert!(store.peek("b").is_none());
    }

    #[tokio::test]
    async fn expired_entries_never_surface_and_are_removed_once() {
        let store = store(EvictionPolicy::Lru, 4);
        let cleanups = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&cleanups);
        store.set_cleanup_callback(Some(Arc::new(move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        })));

        store
            .set("k", Entry::plain(42, Some(Duration::from_millis(10))))
            .unwrap();
        assert!(store.get("k").is_some());

        tokio::time::sleep(Duration::from_millis(30)).await;

        // Two racing reads both observe expiry; only one removal happens.
        assert!(store.get("k").is_none());
        assert!(store.get("k").is_none());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.len(), 0);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanup_sweeps_only_expired_entries() {
        let store = store(EvictionPolicy::Lru, 8);
        let cleaned: Arc<parking_lot::Mutex<Vec<String>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&cleaned);
        store.set_cleanup_callback(Some(Arc::new(move |key, _| {
            sink.lock().push(key.to_string());
        })));

        store
            .set("short", Entry::plain(1, Some(Duration::from_millis(5))))
            .unwrap();
        store.set("forever", Entry::plain(2, None)).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.cleanup(), 1);

        assert_eq!(cleaned.lock().as_slice(), &["short".to_string()]);
        assert_eq!(store.len(), 1);
        assert!(store.peek("forever").is_some());
    }

    #[tokio::test]
    async fn background_sweeper_removes_expired_entries() {
        let store: MemoryStore<u32> = MemoryStore::new(
            EvictionPolicy::Lru,
            8,
            Some(Duration::from_millis(20)),
        )
        .unwrap();

        store
            .set("k", Entry::plain(7, Some(Duration::from_millis(10))))
            .unwrap();
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.len(), 0);

        store.close().unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_drains() {
        let store: MemoryStore<u32> = MemoryStore::new(
            EvictionPolicy::Fifo,
            4,
            Some(Duration::from_millis(50)),
        )
        .unwrap();
        store.set("a", Entry::plain(1, None)).unwrap();

        store.close().unwrap();
        store.close().unwrap();

        assert_eq!(store.len(), 0);
        assert!(matches!(
            store.set("b", Entry::plain(2, None)),
            Err(CacheError::Storage(_))
        ));
        assert_eq!(store.cleanup(), 0);
    }

    #[test]
    fn panicking_callbacks_do_not_poison_the_store() {
        let store = store(EvictionPolicy::Lru, 1);
        store.set_evict_callback(Some(Arc::new(|_, _, _| panic!("misbehaving callback"))));

        store.set("a", Entry::plain(1, None)).unwrap();
        store.set("b", Entry::plain(2, None)).unwrap();

        // The eviction callback panicked, but the store keeps working.
        assert_eq!(store.len(), 1);
        assert_eq!(value_of(&store.get("b").unwrap()), 2);
    }
}
