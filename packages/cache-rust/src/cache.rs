//! The cache façade.
//!
//! [`Cache`] wires the entry store, hook registry, single-flight group,
//! compression codec, and counters into the public surface. Store-level
//! eviction and cleanup callbacks are translated into evict-hook dispatches
//! here, with policy reasons collapsed to `Capacity` for hook consumers and
//! the *real* displaced value decoded and handed to the hooks.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::config::Config;
use crate::context::Context;
use crate::entry::{Entry, Payload};
use crate::error::CacheResult;
use crate::hooks::Hooks;
use crate::metrics::MetricsExporter;
use crate::singleflight::Group;
use crate::stats::{CacheStats, Counters};
use crate::store::{EvictReason, MemoryStore, Store};

/// Args marker attached to hit-hook dispatches for deduplicated loads.
const SHARED_ARG: &str = "shared=true";

fn build_entry<V: Serialize>(
    codec: &Codec,
    value: V,
    ttl: Option<Duration>,
) -> CacheResult<Entry<V>> {
    match codec.encode(&value)? {
        Some((bytes, info)) => Ok(Entry::new(Payload::Compressed { bytes, info }, ttl)),
        None => Ok(Entry::new(Payload::Plain(value), ttl)),
    }
}

fn decode_entry<V: Clone + DeserializeOwned>(
    codec: &Codec,
    entry: &Entry<V>,
) -> CacheResult<V> {
    match entry.payload() {
        Payload::Plain(value) => Ok(value.clone()),
        Payload::Compressed { bytes, info } => codec.decode(bytes, info),
    }
}

fn dispatch_evict<V: Clone + DeserializeOwned>(
    codec: &Codec,
    hooks: &Hooks<V>,
    key: &str,
    entry: &Arc<Entry<V>>,
    reason: EvictReason,
) {
    match decode_entry(codec, entry) {
        Ok(value) => {
            hooks.invoke_on_evict(&Context::background(), key, &value, reason.for_hooks(), &[]);
        }
        Err(err) => {
            tracing::warn!(key, %err, "failed to decode evicted entry for hooks");
        }
    }
}

/// Concurrent, bounded, TTL-aware cache with hooks and single-flight loads.
///
/// `V` needs serde bounds because the transparent compression codec
/// serializes values; the store and strategy layers underneath are
/// serde-free.
pub struct Cache<V> {
    store: Arc<dyn Store<V>>,
    hooks: Arc<Hooks<V>>,
    flight: Group<V>,
    codec: Codec,
    config: Config,
    counters: Arc<Counters>,
    exporter: Option<Arc<dyn MetricsExporter>>,
    labels: Vec<(String, String)>,
    closed: AtomicBool,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Creates a cache backed by an in-memory [`MemoryStore`].
    pub fn new(config: Config) -> CacheResult<Self> {
        config.validate()?;
        let store = Arc::new(MemoryStore::new(
            config.eviction_policy,
            config.max_entries,
            config.cleanup_interval,
        )?);
        Self::with_store(config, store)
    }

    /// Creates a cache over a caller-provided store implementation.
    ///
    /// The cache installs its own eviction and cleanup callbacks on the
    /// store; anything previously installed is replaced.
    pub fn with_store(config: Config, store: Arc<dyn Store<V>>) -> CacheResult<Self> {
        config.validate()?;

        let hooks = Arc::new(Hooks::new());
        let counters = Arc::new(Counters::default());
        let codec = Codec::new(config.compression.clone());

        {
            let hooks = Arc::clone(&hooks);
            let counters = Arc::clone(&counters);
            let codec = codec.clone();
            store.set_evict_callback(Some(Arc::new(move |key, entry, reason| {
                counters.record_eviction();
                dispatch_evict(&codec, &hooks, key, entry, reason);
            })));
        }
        {
            let hooks = Arc::clone(&hooks);
            let counters = Arc::clone(&counters);
            let codec = codec.clone();
            store.set_cleanup_callback(Some(Arc::new(move |key, entry| {
                counters.record_eviction();
                dispatch_evict(&codec, &hooks, key, entry, EvictReason::Ttl);
            })));
        }

        let labels = vec![
            ("cache".to_string(), config.name.clone()),
            (
                "policy".to_string(),
                config.eviction_policy.as_str().to_string(),
            ),
        ];

        Ok(Self {
            store,
            hooks,
            flight: Group::new(),
            codec,
            config,
            counters,
            exporter: None,
            labels,
            closed: AtomicBool::new(false),
        })
    }

    /// Attaches a metrics exporter receiving operation timings and, on
    /// close, a final stats snapshot.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Arc<dyn MetricsExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// The hook registry; registration is expected at setup time but is
    /// safe at any point.
    #[must_use]
    pub fn hooks(&self) -> &Hooks<V> {
        &self.hooks
    }

    fn record_operation(&self, operation: &str, started: Instant) {
        if let Some(exporter) = &self.exporter {
            exporter.record_cache_operation(operation, started.elapsed(), &self.labels);
        }
    }

    /// Looks up `key`. Never errors: decode failures are logged and
    /// reported as misses.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_with_context(&Context::background(), key)
    }

    /// Looks up `key`, threading `ctx` through hook dispatch.
    #[must_use]
    pub fn get_with_context(&self, ctx: &Context, key: &str) -> Option<V> {
        let started = Instant::now();
        let found = match self.store.get(key) {
            Some(entry) => match decode_entry(&self.codec, &entry) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(key, %err, "failed to decode cached entry; treating as miss");
                    None
                }
            },
            None => None,
        };

        match &found {
            Some(value) => {
                self.counters.record_hit();
                self.hooks.invoke_on_hit(ctx, key, value, &[]);
            }
            None => {
                self.counters.record_miss();
                self.hooks.invoke_on_miss(ctx, key, &[]);
            }
        }
        self.record_operation("get", started);
        found
    }

    /// Stores `value` under `key` with the configured default TTL.
    pub fn set(&self, key: &str, value: V) -> CacheResult<()> {
        self.set_with_ttl(key, value, self.config.default_ttl)
    }

    /// Stores `value` under `key` with an explicit TTL (`None` = no expiry).
    ///
    /// Capacity evictions this causes dispatch evict hooks with reason
    /// `Capacity` and the displaced entry's real value.
    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Option<Duration>) -> CacheResult<()> {
        let started = Instant::now();
        let entry = build_entry(&self.codec, value, ttl)?;
        self.store.set(key, entry)?;
        self.record_operation("set", started);
        Ok(())
    }

    /// Removes `key`, firing invalidate hooks if it was present.
    pub fn invalidate(&self, key: &str) -> CacheResult<()> {
        let started = Instant::now();
        let removed = self.store.delete(key)?;
        if removed.is_some() {
            self.counters.record_invalidation();
            self.hooks
                .invoke_on_invalidate(&Context::background(), key, &[]);
        }
        self.record_operation("invalidate", started);
        Ok(())
    }

    /// Preloads `key` with the default TTL, firing no hooks and touching no
    /// counters. Warming an existing key overwrites it and resets its TTL.
    pub fn warmup(&self, key: &str, value: V) -> CacheResult<()> {
        let entry = build_entry(&self.codec, value, self.config.default_ttl)?;
        self.store.set(key, entry)
    }

    /// Removes every entry without firing per-entry hooks.
    pub fn clear(&self) -> CacheResult<()> {
        self.store.clear()
    }

    /// Whether `key` holds a live entry. No hooks, no policy bookkeeping.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.store
            .peek(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// All keys currently stored (possibly including not-yet-swept expired
    /// ones).
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// A point-in-time counter snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters
            .snapshot(self.flight.in_flight(), self.store.len())
    }

    /// Stops background work and releases resources. Idempotent.
    pub fn close(&self) -> CacheResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.store.close()?;
        if let Some(exporter) = &self.exporter {
            exporter.export_stats(&self.stats(), &self.labels);
            exporter.close();
        }
        Ok(())
    }

    /// Returns the cached value for `key`, or runs `loader` through the
    /// single-flight group to produce and cache it.
    ///
    /// Concurrent calls for the same key collapse into one `loader`
    /// execution; only that execution populates the cache, and its error
    /// (if any) is delivered to every caller and never cached. When a call
    /// was deduplicated, hit hooks fire once per caller with the
    /// `"shared=true"` arg as observational metadata.
    pub async fn get_or_load<F, Fut>(&self, key: &str, loader: F) -> CacheResult<V>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = CacheResult<V>> + Send,
    {
        let ctx = Context::background();
        if let Some(value) = self.get_with_context(&ctx, key) {
            return Ok(value);
        }

        let started = Instant::now();
        let task = async {
            let value = loader().await?;
            self.store_loaded(key, value.clone());
            Ok(value)
        };
        let (result, shared) = self.flight.run(key, task).await;
        self.record_operation("load", started);

        if shared {
            if let Ok(value) = &result {
                self.hooks
                    .invoke_on_hit(&ctx, key, value, &[SHARED_ARG.to_string()]);
            }
        }
        result
    }

    /// Like [`get_or_load`](Self::get_or_load), but raced against the
    /// context's cancellation.
    ///
    /// Cancellation only affects this caller: the loader keeps running on
    /// its own task, still populates the cache, and still delivers its
    /// result to other joiners.
    pub async fn get_or_load_with_context<F, Fut>(
        &self,
        ctx: &Context,
        key: &str,
        loader: F,
    ) -> CacheResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CacheResult<V>> + Send + 'static,
    {
        if let Some(value) = self.get_with_context(ctx, key) {
            return Ok(value);
        }

        let started = Instant::now();
        let store = Arc::clone(&self.store);
        let codec = self.codec.clone();
        let ttl = self.config.default_ttl;
        let task_key = key.to_string();
        let task = async move {
            let value = loader().await?;
            store_loaded_with(&store, &codec, &task_key, value.clone(), ttl);
            Ok(value)
        };

        let (result, shared) = self.flight.run_with_context(ctx, key, task).await;
        self.record_operation("load", started);

        if shared {
            if let Ok(value) = &result {
                self.hooks
                    .invoke_on_hit(ctx, key, value, &[SHARED_ARG.to_string()]);
            }
        }
        result
    }

    /// Stores a freshly loaded value; storage failures are logged, not
    /// surfaced, so a successful computation is never failed by a cache
    /// write hiccup.
    fn store_loaded(&self, key: &str, value: V) {
        store_loaded_with(
            &self.store,
            &self.codec,
            key,
            value,
            self.config.default_ttl,
        );
    }
}

fn store_loaded_with<V>(
    store: &Arc<dyn Store<V>>,
    codec: &Codec,
    key: &str,
    value: V,
    ttl: Option<Duration>,
) where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    match build_entry(codec, value, ttl) {
        Ok(entry) => {
            if let Err(err) = store.set(key, entry) {
                tracing::warn!(key, %err, "failed to store loaded value");
            }
        }
        Err(err) => {
            tracing::warn!(key, %err, "failed to encode loaded value");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use parking_lot::Mutex;

    use super::*;
    use crate::codec::CompressionAlgorithm;
    use crate::config::CompressionConfig;
    use crate::error::CacheError;
    use crate::strategy::EvictionPolicy;

    fn cache(config: Config) -> Cache<u64> {
        Cache::new(config.without_cleanup()).unwrap()
    }

    #[tokio::test]
    async fn get_set_invalidate_round_trip() {
        let cache = cache(Config::default());

        assert!(cache.get("k").is_none());
        cache.set("k", 42).unwrap();
        assert_eq!(cache.get("k"), Some(42));
        assert!(cache.contains("k"));

        cache.invalidate("k").unwrap();
        assert!(cache.get("k").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.invalidations, 1);
    }

    #[tokio::test]
    async fn hit_and_miss_hooks_fire() {
        let cache = cache(Config::default());
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&log);
        cache
            .hooks()
            .add_on_hit(move |key, value| sink.lock().push(format!("hit:{key}={value}")));
        let sink = Arc::clone(&log);
        cache
            .hooks()
            .add_on_miss(move |key| sink.lock().push(format!("miss:{key}")));

        cache.set("k", 1).unwrap();
        cache.get("k");
        cache.get("absent");

        assert_eq!(
            log.lock().as_slice(),
            &["hit:k=1".to_string(), "miss:absent".to_string()]
        );
    }

    #[tokio::test]
    async fn capacity_eviction_dispatches_hooks_with_real_value() {
        let cache = cache(Config::default().with_max_entries(2));
        let evicted: Arc<Mutex<Vec<(String, u64, EvictReason)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&evicted);
        cache.hooks().add_on_evict(move |key, value, reason| {
            sink.lock().push((key.to_string(), *value, reason));
        });

        cache.set("a", 1).unwrap();
        cache.set("b", 2).unwrap();
        cache.set("c", 3).unwrap();

        assert_eq!(
            evicted.lock().as_slice(),
            &[("a".to_string(), 1, EvictReason::Capacity)]
        );
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn invalidate_hooks_fire_only_for_present_keys() {
        let cache = cache(Config::default());
        let invalidated = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&invalidated);
        cache.hooks().add_on_invalidate(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        cache.invalidate("missing").unwrap();
        cache.set("k", 1).unwrap();
        cache.invalidate("k").unwrap();

        assert_eq!(invalidated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn warmup_fires_no_hooks_and_resets_ttl() {
        let config = Config::default().with_default_ttl(Duration::from_secs(60));
        let cache = cache(config);
        let fired = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&fired);
        cache.hooks().add_on_hit(move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        let sink = Arc::clone(&fired);
        cache.hooks().add_on_miss(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        cache.warmup("k", 1).unwrap();
        cache.warmup("k", 2).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.stats().misses, 0);
        assert!(cache.contains("k"));
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test]
    async fn clear_purges_without_per_entry_hooks() {
        let cache = cache(Config::default());
        let evicted = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&evicted);
        cache.hooks().add_on_evict(move |_, _, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        cache.set("a", 1).unwrap();
        cache.set("b", 2).unwrap();
        cache.clear().unwrap();

        assert!(cache.is_empty());
        assert_eq!(evicted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn compressed_values_round_trip_through_the_cache() {
        let config = Config::default().with_compression(CompressionConfig::new(
            CompressionAlgorithm::Gzip,
            64,
        ));
        let cache: Cache<String> = Cache::new(config.without_cleanup()).unwrap();

        let big = "x".repeat(10 * 1024);
        cache.set("big", big.clone()).unwrap();
        cache.set("small", "tiny".to_string()).unwrap();

        assert_eq!(cache.get("big").as_deref(), Some(big.as_str()));
        assert_eq!(cache.get("small").as_deref(), Some("tiny"));
    }

    #[tokio::test]
    async fn get_or_load_populates_once() {
        let cache = Arc::new(cache(Config::default()));
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("k", move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(7)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("k"), Some(7));

        // A later call is a plain cache hit; the loader does not run again.
        let loads_again = Arc::clone(&loads);
        let value = cache
            .get_or_load("k", move || async move {
                loads_again.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loader_errors_are_not_cached() {
        let cache = cache(Config::default());
        let attempts = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let attempts = Arc::clone(&attempts);
            let result = cache
                .get_or_load("k", move || async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(CacheError::Loader("flaky".to_string()))
                })
                .await;
            assert_eq!(result.unwrap_err(), CacheError::Loader("flaky".to_string()));
        }

        // Both calls re-executed; nothing was stored.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(cache.get("k").is_none());
    }

    #[tokio::test]
    async fn shared_loads_dispatch_hit_hooks_with_marker() {
        let cache = Arc::new(cache(Config::default()));
        let shared_args: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&shared_args);
        cache.hooks().add_on_hit_ctx(move |_, _, _, args| {
            if !args.is_empty() {
                sink.lock().push(args.to_vec());
            }
        });

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_load("k", || async {
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        Ok(5)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = cache.get_or_load("k", || async { Ok(99) }).await.unwrap();

        assert_eq!(second, 5);
        assert_eq!(first.await.unwrap().unwrap(), 5);

        let args = shared_args.lock();
        assert!(!args.is_empty());
        assert!(args
            .iter()
            .all(|a| a.as_slice() == [SHARED_ARG.to_string()]));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let cache = cache(Config::default());
        cache.set("k", 1).unwrap();

        cache.close().unwrap();
        cache.close().unwrap();
        assert!(matches!(cache.set("x", 2), Err(CacheError::Storage(_))));
    }

    #[tokio::test]
    async fn exporter_receives_operation_timings_and_final_stats() {
        #[derive(Default)]
        struct CountingExporter {
            operations: Mutex<Vec<String>>,
            stats_exports: AtomicUsize,
            closes: AtomicUsize,
        }

        impl MetricsExporter for CountingExporter {
            fn export_stats(&self, _stats: &CacheStats, _labels: &crate::metrics::Labels) {
                self.stats_exports.fetch_add(1, Ordering::SeqCst);
            }
            fn record_cache_operation(
                &self,
                operation: &str,
                _duration: Duration,
                _labels: &crate::metrics::Labels,
            ) {
                self.operations.lock().push(operation.to_string());
            }
            fn increment_counter(&self, _: &str, _: u64, _: &crate::metrics::Labels) {}
            fn record_histogram(&self, _: &str, _: f64, _: &crate::metrics::Labels) {}
            fn set_gauge(&self, _: &str, _: f64, _: &crate::metrics::Labels) {}
            fn close(&self) {
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
        }

        let exporter = Arc::new(CountingExporter::default());
        let cache: Cache<u64> = Cache::new(Config::default().without_cleanup())
            .unwrap()
            .with_exporter(Arc::clone(&exporter) as Arc<dyn MetricsExporter>);

        cache.set("k", 1).unwrap();
        cache.get("k");
        cache.invalidate("k").unwrap();
        cache.close().unwrap();

        assert_eq!(
            exporter.operations.lock().as_slice(),
            &["set".to_string(), "get".to_string(), "invalidate".to_string()]
        );
        assert_eq!(exporter.stats_exports.load(Ordering::SeqCst), 1);
        assert_eq!(exporter.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stats_reflect_policy_and_flight_state() {
        let cache = cache(Config::default().with_eviction_policy(EvictionPolicy::Fifo));
        cache.set("a", 1).unwrap();
        cache.set("b", 2).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.key_count, 2);
        assert_eq!(stats.in_flight, 0);
        assert!((stats.hit_rate() - 0.0).abs() < f64::EPSILON);
    }
}
