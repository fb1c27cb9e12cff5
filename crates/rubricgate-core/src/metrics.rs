//! Process-global validation counters.
//!
//! Counters are bumped silently at the call site; [`Metrics::flush`] emits the
//! current values as one `info!` event, typically at the end of a batch.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

/// Atomic counters. No allocation, no locking.
pub struct Metrics {
    attempts: AtomicU64,
    judge_calls: AtomicU64,
    judge_unavailable: AtomicU64,
    judge_malformed: AtomicU64,
    accepted: AtomicU64,
    exhausted: AtomicU64,
    aborted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! counter {
    ($inc:ident, $get:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = stringify!($field), "counter incremented");
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            judge_calls: AtomicU64::new(0),
            judge_unavailable: AtomicU64::new(0),
            judge_malformed: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    counter!(inc_attempts, attempts, attempts);
    counter!(inc_judge_calls, judge_calls, judge_calls);
    counter!(inc_judge_unavailable, judge_unavailable, judge_unavailable);
    counter!(inc_judge_malformed, judge_malformed, judge_malformed);
    counter!(inc_accepted, accepted, accepted);
    counter!(inc_exhausted, exhausted, exhausted);
    counter!(inc_aborted, aborted, aborted);

    /// Emit every counter as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            attempts = self.attempts(),
            judge_calls = self.judge_calls(),
            judge_unavailable = self.judge_unavailable(),
            judge_malformed = self.judge_malformed(),
            accepted = self.accepted(),
            exhausted = self.exhausted(),
            aborted = self.aborted(),
        );
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        for counter in [
            &self.attempts,
            &self.judge_calls,
            &self.judge_unavailable,
            &self.judge_malformed,
            &self.accepted,
            &self.exhausted,
            &self.aborted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
