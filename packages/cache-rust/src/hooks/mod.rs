//! Priority-ordered, conditionally-gated event hooks.
//!
//! [`Hooks`] keeps one registry per event kind (hit, miss, evict,
//! invalidate). Simple callbacks are adapted into the canonical
//! context-aware shape at registration, so a single list per kind carries
//! both forms and dispatch order is global: descending priority, ties by
//! registration order.
//!
//! Registries live in `ArcSwap`ed vectors: dispatch loads a snapshot and
//! iterates it, so hooks registered mid-dispatch never crash a running
//! dispatch (they are picked up by the next one). Every hook and condition
//! runs under `catch_unwind`; a failing hook is logged and never prevents
//! later hooks or fails the cache operation that triggered it.

pub mod conditions;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::context::Context;
use crate::store::EvictReason;

/// Dispatch priority of a hook within its event kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookPriority {
    /// Runs after Medium and High.
    Low,
    /// The default.
    #[default]
    Medium,
    /// Runs first.
    High,
}

/// Context-aware hit callback: `(ctx, key, value, args)`.
pub type HitHook<V> = Arc<dyn Fn(&Context, &str, &V, &[String]) + Send + Sync>;
/// Context-aware miss callback: `(ctx, key, args)`.
pub type MissHook = Arc<dyn Fn(&Context, &str, &[String]) + Send + Sync>;
/// Context-aware eviction callback: `(ctx, key, value, reason, args)`.
pub type EvictHook<V> = Arc<dyn Fn(&Context, &str, &V, EvictReason, &[String]) + Send + Sync>;
/// Context-aware invalidation callback: `(ctx, key, args)`.
pub type InvalidateHook = Arc<dyn Fn(&Context, &str, &[String]) + Send + Sync>;

/// Activation predicate evaluated before a conditional hook runs.
pub type Condition = Arc<dyn Fn(&Context, &str, &[String]) -> bool + Send + Sync>;

struct Registered<F> {
    hook: F,
    priority: HookPriority,
    condition: Option<Condition>,
    seq: u64,
}

impl<F: Clone> Clone for Registered<F> {
    fn clone(&self) -> Self {
        Self {
            hook: self.hook.clone(),
            priority: self.priority,
            condition: self.condition.clone(),
            seq: self.seq,
        }
    }
}

struct HookSet<F> {
    entries: ArcSwap<Vec<Registered<F>>>,
}

impl<F: Clone> HookSet<F> {
    fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    fn register(&self, hook: F, priority: HookPriority, condition: Option<Condition>, seq: u64) {
        self.entries.rcu(|current| {
            let mut next: Vec<Registered<F>> = current.as_ref().clone();
            next.push(Registered {
                hook: hook.clone(),
                priority,
                condition: condition.clone(),
                seq,
            });
            next.sort_by_key(|reg| (std::cmp::Reverse(reg.priority), reg.seq));
            next
        });
    }

    fn snapshot(&self) -> Arc<Vec<Registered<F>>> {
        self.entries.load_full()
    }
}

/// Evaluates a hook's condition; a panicking condition counts as false.
fn passes(condition: Option<&Condition>, ctx: &Context, key: &str, args: &[String]) -> bool {
    let Some(condition) = condition else {
        return true;
    };
    match std::panic::catch_unwind(AssertUnwindSafe(|| condition(ctx, key, args))) {
        Ok(pass) => pass,
        Err(_) => {
            tracing::warn!(key, "hook condition panicked; treating as false");
            false
        }
    }
}

/// Runs one hook invocation, absorbing panics.
fn run_hook(kind: &'static str, key: &str, invoke: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(invoke)).is_err() {
        tracing::warn!(kind, key, "hook panicked; continuing dispatch");
    }
}

/// Registries for the four cache event kinds.
pub struct Hooks<V> {
    hit: HookSet<HitHook<V>>,
    miss: HookSet<MissHook>,
    evict: HookSet<EvictHook<V>>,
    invalidate: HookSet<InvalidateHook>,
    next_seq: AtomicU64,
}

impl<V> Default for Hooks<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Hooks<V> {
    /// Creates an empty hook registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hit: HookSet::new(),
            miss: HookSet::new(),
            evict: HookSet::new(),
            invalidate: HookSet::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    // --- Hit registration ---

    /// Registers a hit hook at the default priority.
    pub fn add_on_hit(&self, hook: impl Fn(&str, &V) + Send + Sync + 'static) {
        self.add_on_hit_with_priority(hook, HookPriority::default());
    }

    /// Registers a hit hook at `priority`.
    pub fn add_on_hit_with_priority(
        &self,
        hook: impl Fn(&str, &V) + Send + Sync + 'static,
        priority: HookPriority,
    ) {
        let adapted: HitHook<V> = Arc::new(move |_ctx, key, value, _args| hook(key, value));
        self.hit.register(adapted, priority, None, self.next_seq());
    }

    /// Registers a context-aware hit hook.
    pub fn add_on_hit_ctx(&self, hook: impl Fn(&Context, &str, &V, &[String]) + Send + Sync + 'static) {
        self.hit
            .register(Arc::new(hook), HookPriority::default(), None, self.next_seq());
    }

    /// Registers a context-aware hit hook gated by `condition`.
    pub fn add_on_hit_ctx_if(
        &self,
        hook: impl Fn(&Context, &str, &V, &[String]) + Send + Sync + 'static,
        condition: Condition,
    ) {
        self.hit.register(
            Arc::new(hook),
            HookPriority::default(),
            Some(condition),
            self.next_seq(),
        );
    }

    // --- Miss registration ---

    /// Registers a miss hook at the default priority.
    pub fn add_on_miss(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.add_on_miss_with_priority(hook, HookPriority::default());
    }

    /// Registers a miss hook at `priority`.
    pub fn add_on_miss_with_priority(
        &self,
        hook: impl Fn(&str) + Send + Sync + 'static,
        priority: HookPriority,
    ) {
        let adapted: MissHook = Arc::new(move |_ctx, key, _args| hook(key));
        self.miss.register(adapted, priority, None, self.next_seq());
    }

    /// Registers a context-aware miss hook.
    pub fn add_on_miss_ctx(&self, hook: impl Fn(&Context, &str, &[String]) + Send + Sync + 'static) {
        self.miss
            .register(Arc::new(hook), HookPriority::default(), None, self.next_seq());
    }

    /// Registers a context-aware miss hook gated by `condition`.
    pub fn add_on_miss_ctx_if(
        &self,
        hook: impl Fn(&Context, &str, &[String]) + Send + Sync + 'static,
        condition: Condition,
    ) {
        self.miss.register(
            Arc::new(hook),
            HookPriority::default(),
            Some(condition),
            self.next_seq(),
        );
    }

    // --- Evict registration ---

    /// Registers an eviction hook at the default priority.
    pub fn add_on_evict(&self, hook: impl Fn(&str, &V, EvictReason) + Send + Sync + 'static) {
        self.add_on_evict_with_priority(hook, HookPriority::default());
    }

    /// Registers an eviction hook at `priority`.
    pub fn add_on_evict_with_priority(
        &self,
        hook: impl Fn(&str, &V, EvictReason) + Send + Sync + 'static,
        priority: HookPriority,
    ) {
        let adapted: EvictHook<V> =
            Arc::new(move |_ctx, key, value, reason, _args| hook(key, value, reason));
        self.evict.register(adapted, priority, None, self.next_seq());
    }

    /// Registers a context-aware eviction hook.
    pub fn add_on_evict_ctx(
        &self,
        hook: impl Fn(&Context, &str, &V, EvictReason, &[String]) + Send + Sync + 'static,
    ) {
        self.evict
            .register(Arc::new(hook), HookPriority::default(), None, self.next_seq());
    }

    /// Registers a context-aware eviction hook gated by `condition`.
    pub fn add_on_evict_ctx_if(
        &self,
        hook: impl Fn(&Context, &str, &V, EvictReason, &[String]) + Send + Sync + 'static,
        condition: Condition,
    ) {
        self.evict.register(
            Arc::new(hook),
            HookPriority::default(),
            Some(condition),
            self.next_seq(),
        );
    }

    // --- Invalidate registration ---

    /// Registers an invalidation hook at the default priority.
    pub fn add_on_invalidate(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.add_on_invalidate_with_priority(hook, HookPriority::default());
    }

    /// Registers an invalidation hook at `priority`.
    pub fn add_on_invalidate_with_priority(
        &self,
        hook: impl Fn(&str) + Send + Sync + 'static,
        priority: HookPriority,
    ) {
        let adapted: InvalidateHook = Arc::new(move |_ctx, key, _args| hook(key));
        self.invalidate
            .register(adapted, priority, None, self.next_seq());
    }

    /// Registers a context-aware invalidation hook.
    pub fn add_on_invalidate_ctx(
        &self,
        hook: impl Fn(&Context, &str, &[String]) + Send + Sync + 'static,
    ) {
        self.invalidate
            .register(Arc::new(hook), HookPriority::default(), None, self.next_seq());
    }

    /// Registers a context-aware invalidation hook gated by `condition`.
    pub fn add_on_invalidate_ctx_if(
        &self,
        hook: impl Fn(&Context, &str, &[String]) + Send + Sync + 'static,
        condition: Condition,
    ) {
        self.invalidate.register(
            Arc::new(hook),
            HookPriority::default(),
            Some(condition),
            self.next_seq(),
        );
    }

    // --- Dispatch ---

    /// Dispatches hit hooks in priority order.
    pub fn invoke_on_hit(&self, ctx: &Context, key: &str, value: &V, args: &[String]) {
        for reg in self.hit.snapshot().iter() {
            if passes(reg.condition.as_ref(), ctx, key, args) {
                run_hook("hit", key, || (reg.hook)(ctx, key, value, args));
            }
        }
    }

    /// Dispatches miss hooks in priority order.
    pub fn invoke_on_miss(&self, ctx: &Context, key: &str, args: &[String]) {
        for reg in self.miss.snapshot().iter() {
            if passes(reg.condition.as_ref(), ctx, key, args) {
                run_hook("miss", key, || (reg.hook)(ctx, key, args));
            }
        }
    }

    /// Dispatches eviction hooks in priority order.
    pub fn invoke_on_evict(
        &self,
        ctx: &Context,
        key: &str,
        value: &V,
        reason: EvictReason,
        args: &[String],
    ) {
        for reg in self.evict.snapshot().iter() {
            if passes(reg.condition.as_ref(), ctx, key, args) {
                run_hook("evict", key, || (reg.hook)(ctx, key, value, reason, args));
            }
        }
    }

    /// Dispatches invalidation hooks in priority order.
    pub fn invoke_on_invalidate(&self, ctx: &Context, key: &str, args: &[String]) {
        for reg in self.invalidate.snapshot().iter() {
            if passes(reg.condition.as_ref(), ctx, key, args) {
                run_hook("invalidate", key, || (reg.hook)(ctx, key, args));
            }
        }
    }
}
