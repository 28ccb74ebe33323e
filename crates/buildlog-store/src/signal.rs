//! One-Shot Completion Signal
//!
//! This module implements the generic notification primitive every status
//! entity reports "finished" through: log files, build steps, builds, and
//! build sets all carry one (build sets carry two).
//!
//! ## Semantics
//!
//! A `Completion<T>` starts unresolved, holds at most one value, and
//! transitions unresolved → resolved exactly once. Any number of waiters may
//! register before or after resolution:
//!
//! - Waiters registered before `resolve` are woken in registration order.
//! - Waiters registered after `resolve` still observe the value
//!   asynchronously — the value is handed over through a channel the caller
//!   has to poll, never inside the registering call itself. This is what
//!   prevents the reentrancy interleavings where resolving code and reacting
//!   code run inside each other.
//!
//! Resolving twice is a contract violation (panic), not an error value: it
//! means the owning component fired a terminal transition twice.
//!
//! ## Usage
//!
//! ```ignore
//! use buildlog_store::Completion;
//!
//! let signal: Completion<u32> = Completion::new();
//!
//! let waiter = tokio::spawn({
//!     let signal = signal.clone();
//!     async move { signal.wait().await }
//! });
//!
//! signal.resolve(42);
//! assert_eq!(waiter.await.unwrap(), 42);
//! ```

use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// A one-shot, multi-waiter completion signal.
///
/// Cheap to clone; clones share the same underlying state.
#[derive(Debug, Clone)]
pub struct Completion<T: Clone + Send> {
    inner: Arc<Mutex<State<T>>>,
}

#[derive(Debug)]
enum State<T> {
    Pending(Vec<oneshot::Sender<T>>),
    Resolved(T),
}

impl<T: Clone + Send> Completion<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(State::Pending(Vec::new()))),
        }
    }

    /// Wait for the signal's value.
    ///
    /// If already resolved, the value is delivered at the caller's next
    /// poll, never synchronously inside this call.
    pub async fn wait(&self) -> T {
        let rx = {
            let mut state = self.lock();
            let (tx, rx) = oneshot::channel();
            match &mut *state {
                State::Pending(waiters) => waiters.push(tx),
                State::Resolved(value) => {
                    let _ = tx.send(value.clone());
                }
            }
            rx
        };
        // The sender lives in our shared state (or the value was already
        // sent above), so the channel cannot close before delivering.
        rx.await.expect("completion state dropped mid-wait")
    }

    /// Resolve the signal, waking all registered waiters in registration
    /// order.
    ///
    /// # Panics
    ///
    /// Panics if the signal was already resolved.
    pub fn resolve(&self, value: T) {
        let waiters = {
            let mut state = self.lock();
            match &mut *state {
                State::Pending(waiters) => {
                    let waiters = std::mem::take(waiters);
                    *state = State::Resolved(value.clone());
                    waiters
                }
                State::Resolved(_) => panic!("completion signal resolved twice"),
            }
        };
        for waiter in waiters {
            let _ = waiter.send(value.clone());
        }
    }

    /// Whether the signal has been resolved.
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.lock(), State::Resolved(_))
    }

    /// The resolved value, if any, without waiting.
    pub fn try_get(&self) -> Option<T> {
        match &*self.lock() {
            State::Resolved(value) => Some(value.clone()),
            State::Pending(_) => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}
