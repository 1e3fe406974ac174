//! Keyed suppression of duplicate in-flight computations.
//!
//! A [`Group`] guarantees at most one running computation per key: the
//! first caller leads and actually runs the work; everyone else joins and
//! waits for the lead's result. Results are written once, before the
//! completion signal fires, and every joiner observes the same value or
//! error.
//!
//! One mutex guards the in-flight map. It is never held while the
//! computation runs or across an await point; leads run the work on their
//! own task ([`Group::run`]) or on a spawned task ([`Group::run_channel`]).
//! A lead that panics or is dropped mid-flight still finalizes its call
//! record, so a completion signal can never be lost.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::context::Context;
use crate::error::{CacheError, CacheResult};

/// Outcome of a deduplicated computation, as delivered on channels.
#[derive(Debug, Clone)]
pub struct FlightResult<T> {
    /// The computation's value or error, identical for every caller.
    pub result: CacheResult<T>,
    /// Whether the result was shared between multiple callers.
    pub shared: bool,
}

/// Per-key in-flight call record.
struct Call<T> {
    /// Completion signal; flips to `true` exactly once.
    done: watch::Sender<bool>,
    /// The outcome, written before `done` fires.
    result: OnceLock<CacheResult<T>>,
    /// Callers that joined after the lead.
    waiters: AtomicUsize,
    /// Delivery channels for channel-style joiners; buffered(1), single-use.
    channels: Mutex<Vec<mpsc::Sender<FlightResult<T>>>>,
}

impl<T> Call<T> {
    fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            done,
            result: OnceLock::new(),
            waiters: AtomicUsize::new(0),
            channels: Mutex::new(Vec::new()),
        }
    }
}

enum Role<T> {
    Lead(Arc<Call<T>>),
    Join(Arc<Call<T>>),
}

/// Finalizes the call record if the lead never did (panic already handled
/// separately; this covers the lead future being dropped mid-flight).
struct LeadGuard<T: Clone> {
    group: Group<T>,
    key: String,
    call: Arc<Call<T>>,
    armed: bool,
}

impl<T: Clone> LeadGuard<T> {
    fn complete(mut self, result: CacheResult<T>) -> bool {
        self.armed = false;
        self.group.finalize(&self.key, &self.call, result)
    }
}

impl<T: Clone> Drop for LeadGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            self.group.finalize(
                &self.key,
                &self.call,
                Err(CacheError::Internal(
                    "in-flight computation was dropped before completing".to_string(),
                )),
            );
        }
    }
}

/// Keyed execution deduplicator.
///
/// Cheap to clone; clones share the same in-flight map.
pub struct Group<T> {
    calls: Arc<Mutex<HashMap<String, Arc<Call<T>>>>>,
}

impl<T> Clone for Group<T> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T> Default for Group<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Group<T> {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of keys currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Detaches `key` from its in-flight call.
    ///
    /// A subsequent call for the same key starts a fresh computation even
    /// if the previous one is still running; the previous call's joiners
    /// are unaffected and still receive its eventual result.
    pub fn forget(&self, key: &str) {
        self.calls.lock().remove(key);
    }

    fn claim(&self, key: &str) -> Role<T> {
        let mut calls = self.calls.lock();
        match calls.get(key) {
            Some(existing) => {
                existing.waiters.fetch_add(1, Ordering::AcqRel);
                Role::Join(Arc::clone(existing))
            }
            None => {
                let call = Arc::new(Call::new());
                calls.insert(key.to_string(), Arc::clone(&call));
                Role::Lead(call)
            }
        }
    }
}

impl<T: Clone> Group<T> {
    async fn wait(call: &Arc<Call<T>>) -> CacheResult<T> {
        let mut done = call.done.subscribe();
        if done.wait_for(|fired| *fired).await.is_err() {
            return Err(CacheError::Internal(
                "completion signal lost".to_string(),
            ));
        }
        call.result.get().cloned().unwrap_or_else(|| {
            Err(CacheError::Internal(
                "completed call has no result".to_string(),
            ))
        })
    }

    /// Publishes the result, detaches the record, fires the completion
    /// signal, and delivers to channel joiners. Returns whether the result
    /// was shared.
    fn finalize(&self, key: &str, call: &Arc<Call<T>>, result: CacheResult<T>) -> bool {
        // Result must be readable before the signal fires.
        let _ = call.result.set(result.clone());

        let channels = {
            let mut calls = self.calls.lock();
            let still_current = calls
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, call));
            if still_current {
                calls.remove(key);
            }
            std::mem::take(&mut *call.channels.lock())
        };

        let shared = call.waiters.load(Ordering::Acquire) > 0;
        let _ = call.done.send(true);
        for sender in channels {
            let _ = sender.try_send(FlightResult {
                result: result.clone(),
                shared,
            });
        }
        shared
    }
}

impl<T: Clone + Send + Sync + 'static> Group<T> {
    /// Runs `task` for `key`, collapsing concurrent calls into one
    /// execution.
    ///
    /// The first caller runs `task` on its own task; concurrent callers for
    /// the same key block on the completion signal instead. Returns the
    /// shared outcome and whether it was shared: joiners always report
    /// `true`, the lead reports `true` iff at least one joiner attached.
    ///
    /// A panicking `task` still finalizes the record (joiners receive an
    /// internal error) and then the panic resumes on the lead's task.
    pub async fn run<F>(&self, key: &str, task: F) -> (CacheResult<T>, bool)
    where
        F: Future<Output = CacheResult<T>> + Send,
    {
        match self.claim(key) {
            Role::Join(call) => (Self::wait(&call).await, true),
            Role::Lead(call) => {
                let guard = LeadGuard {
                    group: self.clone(),
                    key: key.to_string(),
                    call,
                    armed: true,
                };
                match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(result) => {
                        let shared = guard.complete(result.clone());
                        (result, shared)
                    }
                    Err(panic) => {
                        guard.complete(Err(CacheError::Internal(
                            "in-flight computation panicked".to_string(),
                        )));
                        std::panic::resume_unwind(panic);
                    }
                }
            }
        }
    }

    /// Channel-style variant of [`run`](Self::run).
    ///
    /// The computation runs on a spawned task; the caller does not block.
    /// Every caller receives exactly one [`FlightResult`] on its own
    /// buffered channel. The channel is single-use and never closed by the
    /// group.
    pub fn run_channel<F>(&self, key: &str, task: F) -> mpsc::Receiver<FlightResult<T>>
    where
        F: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(1);

        let call = {
            let mut calls = self.calls.lock();
            if let Some(existing) = calls.get(key) {
                existing.waiters.fetch_add(1, Ordering::AcqRel);
                existing.channels.lock().push(sender);
                return receiver;
            }
            let call = Arc::new(Call::new());
            call.channels.lock().push(sender);
            calls.insert(key.to_string(), Arc::clone(&call));
            call
        };

        let group = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Internal(
                    "in-flight computation panicked".to_string(),
                )),
            };
            group.finalize(&key, &call, result);
        });

        receiver
    }

    /// Like [`run_channel`](Self::run_channel), but raced against the
    /// context's cancellation.
    ///
    /// If cancellation wins, the caller gets the context's error with
    /// `shared = false`; the computation is *not* aborted and other joiners
    /// still receive its result.
    pub async fn run_with_context<F>(
        &self,
        ctx: &Context,
        key: &str,
        task: F,
    ) -> (CacheResult<T>, bool)
    where
        F: Future<Output = CacheResult<T>> + Send + 'static,
    {
        if let Some(err) = ctx.err() {
            return (Err(err), false);
        }

        let mut receiver = self.run_channel(key, task);
        tokio::select! {
            err = ctx.done() => (Err(err), false),
            delivered = receiver.recv() => match delivered {
                Some(flight) => (flight.result, flight.shared),
                None => (
                    Err(CacheError::Internal(
                        "in-flight call dropped without delivering".to_string(),
                    )),
                    false,
                ),
            },
        }
    }

}
