//! Build Set Status
//!
//! A build set groups the builds triggered by one change across several
//! builders and reports two distinct facts about them:
//!
//! - **finished**: every constituent build reported a terminal result; the
//!   set's overall result is the worst of them.
//! - **success decided**: whether the set can still succeed. This resolves
//!   *before* the strict finish as soon as one build guarantees overall
//!   failure while others are still pending, letting observers distinguish
//!   "early failure known" from "fully finished".
//!
//! Both facts are ordinary completion signals, so the usual multi-waiter /
//! already-resolved semantics apply.

use crate::results::BuildResult;
use buildlog_store::Completion;
use std::sync::Mutex;
use tracing::debug;

struct SetInner {
    expected: usize,
    reported: usize,
    worst: Option<BuildResult>,
    /// Whether `success_decided` has been claimed by some reporter.
    success_fired: bool,
}

/// Status record for one build set.
pub struct BuildSetStatus {
    inner: Mutex<SetInner>,
    finished: Completion<BuildResult>,
    success_decided: Completion<bool>,
}

impl BuildSetStatus {
    /// Create a set expecting `expected` constituent builds.
    ///
    /// An empty set is vacuously successful and resolves both signals
    /// immediately.
    pub fn new(expected: usize) -> Self {
        let set = Self {
            inner: Mutex::new(SetInner {
                expected,
                reported: 0,
                worst: None,
                success_fired: expected == 0,
            }),
            finished: Completion::new(),
            success_decided: Completion::new(),
        };
        if expected == 0 {
            set.success_decided.resolve(true);
            set.finished.resolve(BuildResult::Success);
        }
        set
    }

    /// Report one constituent build's terminal result.
    ///
    /// # Panics
    ///
    /// Panics if more results are reported than the set expects (the strict
    /// finish signal would otherwise resolve twice).
    pub fn build_finished(&self, result: BuildResult) {
        let (failure_known, decide_at_finish, overall) = {
            let mut inner = self.lock();
            assert!(
                inner.reported < inner.expected,
                "build reported to an already-finished build set"
            );
            inner.reported += 1;
            inner.worst = Some(match inner.worst {
                Some(worst) => worst.worst(result),
                None => result,
            });
            let failure_known = result.is_failure() && !inner.success_fired;
            if failure_known {
                inner.success_fired = true;
            }
            let overall = if inner.reported == inner.expected {
                inner.worst
            } else {
                None
            };
            let decide_at_finish = overall.is_some() && !inner.success_fired;
            if decide_at_finish {
                inner.success_fired = true;
            }
            (failure_known, decide_at_finish, overall)
        };

        if failure_known {
            debug!(result = ?result, "build set can no longer succeed");
            self.success_decided.resolve(false);
        }
        if let Some(overall) = overall {
            if decide_at_finish {
                self.success_decided.resolve(!overall.is_failure());
            }
            self.finished.resolve(overall);
        }
    }

    /// Wait for every constituent build; yields the worst result.
    pub async fn wait_until_finished(&self) -> BuildResult {
        self.finished.wait().await
    }

    /// Wait until success or failure of the whole set is decided.
    ///
    /// Yields `false` as soon as one build guarantees failure - possibly
    /// well before the strict finish - or `true` at finish if success held.
    pub async fn wait_until_success_decided(&self) -> bool {
        self.success_decided.wait().await
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_resolved()
    }

    /// The set's overall result, if finished.
    pub fn result(&self) -> Option<BuildResult> {
        self.finished.try_get()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SetInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
