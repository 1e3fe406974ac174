//! Standard hook conditions and composition utilities.
//!
//! Conditions are plain predicates over `(ctx, key, args)`. The composers
//! here cover the common cases: key prefixes, context-value equality, and
//! boolean combination. The `gate_*` helpers adapt an unconditional hook
//! plus a predicate into a conditional hook; the `combine_*` helpers fuse
//! several hooks into one that calls them in declaration order.

use std::sync::Arc;

use crate::context::Context;
use crate::hooks::{Condition, EvictHook, HitHook, InvalidateHook, MissHook};

/// Matches keys that start with `prefix`.
#[must_use]
pub fn key_prefix(prefix: impl Into<String>) -> Condition {
    let prefix = prefix.into();
    Arc::new(move |_ctx: &Context, key: &str, _args: &[String]| key.starts_with(&prefix))
}

/// Matches when the context value `name` equals `expected`.
#[must_use]
pub fn context_value(name: impl Into<String>, expected: impl Into<String>) -> Condition {
    let name = name.into();
    let expected = expected.into();
    Arc::new(move |ctx: &Context, _key: &str, _args: &[String]| {
        ctx.value(&name) == Some(expected.as_str())
    })
}

/// Matches when both conditions match.
#[must_use]
pub fn and(a: Condition, b: Condition) -> Condition {
    Arc::new(move |ctx: &Context, key: &str, args: &[String]| {
        a(ctx, key, args) && b(ctx, key, args)
    })
}

/// Matches when either condition matches.
#[must_use]
pub fn or(a: Condition, b: Condition) -> Condition {
    Arc::new(move |ctx: &Context, key: &str, args: &[String]| {
        a(ctx, key, args) || b(ctx, key, args)
    })
}

/// Wraps a hit hook so it only runs when `condition` matches.
#[must_use]
pub fn gate_hit<V: 'static>(hook: HitHook<V>, condition: Condition) -> HitHook<V> {
    Arc::new(move |ctx, key, value, args| {
        if condition(ctx, key, args) {
            hook(ctx, key, value, args);
        }
    })
}

/// Wraps a miss hook so it only runs when `condition` matches.
#[must_use]
pub fn gate_miss(hook: MissHook, condition: Condition) -> MissHook {
    Arc::new(move |ctx, key, args| {
        if condition(ctx, key, args) {
            hook(ctx, key, args);
        }
    })
}

/// Wraps an eviction hook so it only runs when `condition` matches.
#[must_use]
pub fn gate_evict<V: 'static>(hook: EvictHook<V>, condition: Condition) -> EvictHook<V> {
    Arc::new(move |ctx, key, value, reason, args| {
        if condition(ctx, key, args) {
            hook(ctx, key, value, reason, args);
        }
    })
}

/// Wraps an invalidation hook so it only runs when `condition` matches.
#[must_use]
pub fn gate_invalidate(hook: InvalidateHook, condition: Condition) -> InvalidateHook {
    Arc::new(move |ctx, key, args| {
        if condition(ctx, key, args) {
            hook(ctx, key, args);
        }
    })
}

/// A single hit hook that calls `hooks` sequentially in declaration order.
#[must_use]
pub fn combine_hit<V: 'static>(hooks: Vec<HitHook<V>>) -> HitHook<V> {
    Arc::new(move |ctx, key, value, args| {
        for hook in &hooks {
            hook(ctx, key, value, args);
        }
    })
}

/// A single miss hook that calls `hooks` sequentially in declaration order.
#[must_use]
pub fn combine_miss(hooks: Vec<MissHook>) -> MissHook {
    Arc::new(move |ctx, key, args| {
        for hook in &hooks {
            hook(ctx, key, args);
        }
    })
}

/// A single eviction hook that calls `hooks` sequentially in declaration order.
#[must_use]
pub fn combine_evict<V: 'static>(hooks: Vec<EvictHook<V>>) -> EvictHook<V> {
    Arc::new(move |ctx, key, value, reason, args| {
        for hook in &hooks {
            hook(ctx, key, value, reason, args);
        }
    })
}

/// A single invalidation hook that calls `hooks` sequentially in declaration order.
#[must_use]
pub fn combine_invalidate(hooks: Vec<InvalidateHook>) -> InvalidateHook {
    Arc::new(move |ctx, key, args| {
        for hook in &hooks {
            hook(ctx, key, args);
        }
    })
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn key_prefix_matches_only_prefixed_keys() {
        let cond = key_prefix("user:");
        let ctx = Context::background();
        assert!(cond(&ctx, "user:42", &[]));
        assert!(!cond(&ctx, "order:42", &[]));
        assert!(!cond(&ctx, "use", &[]));
    }

    #[test]
    fn context_value_matches_exact_value() {
        let cond = context_value("tenant", "acme");
        let matching = Context::background().with_value("tenant", "acme");
        let wrong = Context::background().with_value("tenant", "globex");
        let missing = Context::background();

        assert!(cond(&matching, "k", &[]));
        assert!(!cond(&wrong, "k", &[]));
        assert!(!cond(&missing, "k", &[]));
    }

    #[test]
    fn and_requires_both() {
        let cond = and(key_prefix("user:"), context_value("tenant", "acme"));
        let ctx = Context::background().with_value("tenant", "acme");

        assert!(cond(&ctx, "user:1", &[]));
        assert!(!cond(&ctx, "order:1", &[]));
        assert!(!cond(&Context::background(), "user:1", &[]));
    }

    #[test]
    fn or_accepts_either() {
        let cond = or(key_prefix("a:"), key_prefix("b:"));
        let ctx = Context::background();

        assert!(cond(&ctx, "a:1", &[]));
        assert!(cond(&ctx, "b:1", &[]));
        assert!(!cond(&ctx, "c:1", &[]));
    }

    #[test]
    fn gate_runs_hook_only_on_match() {
        let fired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let hook: MissHook = Arc::new(move |_, key, _| sink.lock().push(key.to_string()));
        let gated = gate_miss(hook, key_prefix("hot:"));

        let ctx = Context::background();
        gated(&ctx, "hot:1", &[]);
        gated(&ctx, "cold:1", &[]);

        assert_eq!(fired.lock().as_slice(), &["hot:1".to_string()]);
    }

    #[test]
    fn combine_calls_in_declaration_order() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&log);
        let second = Arc::clone(&log);
        let combined: HitHook<u32> = combine_hit(vec![
            Arc::new(move |_, _, _, _| first.lock().push("first")),
            Arc::new(move |_, _, _, _| second.lock().push("second")),
        ]);

        combined(&Context::background(), "k", &1, &[]);
        assert_eq!(log.lock().as_slice(), &["first", "second"]);
    }
}
