//! Per-operation context carrying caller metadata and cancellation.
//!
//! A [`Context`] travels with hook dispatch (conditions can match on its
//! values) and bounds context-aware single-flight calls through a
//! cancellation token and an optional deadline.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CacheError;

/// Per-operation context: string-keyed values, an optional deadline, and a
/// cancellation token.
///
/// Contexts are cheap to clone; the value map is shared behind an `Arc` and
/// builder-style methods copy-on-write. The default context carries no
/// values, no deadline, and a token that never fires.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Arc<HashMap<String, String>>,
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates an empty context that is never cancelled.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a copy with `name` set to `value`.
    #[must_use]
    pub fn with_value(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut values = HashMap::clone(&self.values);
        values.insert(name.into(), value.into());
        Self {
            values: Arc::new(values),
            token: self.token.clone(),
            deadline: self.deadline,
        }
    }

    /// Returns a copy that is cancelled once `timeout` elapses.
    #[must_use]
    pub fn with_timeout(&self, timeout: std::time::Duration) -> Self {
        Self {
            values: Arc::clone(&self.values),
            token: self.token.clone(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Returns a copy cancelled by `token`, shared with the caller.
    #[must_use]
    pub fn with_token(&self, token: CancellationToken) -> Self {
        Self {
            values: Arc::clone(&self.values),
            token,
            deadline: self.deadline,
        }
    }

    /// Looks up a context value by name.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Cancels the context's token, waking anything blocked in [`done`](Self::done).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` if the token fired or the deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The context's error, if it is already cancelled or past its deadline.
    #[must_use]
    pub fn err(&self) -> Option<CacheError> {
        if self.token.is_cancelled() {
            return Some(CacheError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(CacheError::DeadlineExceeded);
        }
        None
    }

    /// Resolves when the context is cancelled, yielding the matching error.
    ///
    /// Never resolves for a context without a deadline whose token is never
    /// cancelled; callers race it against useful work with `tokio::select!`.
    pub async fn done(&self) -> CacheError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => CacheError::Cancelled,
                    () = tokio::time::sleep_until(deadline) => CacheError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CacheError::Cancelled
            }
        }
    }
}
