//! Lock-free worker population accounting

use std::sync::atomic::{AtomicI32, Ordering};

/// Shared worker population counter.
///
/// The counter is the source of truth for how many workers are alive. All
/// spawn-vs-retire arbitration goes through the two bounded compare-and-swap
/// loops below, which keep the count within `[0, max]` under arbitrary
/// interleavings of concurrent spawners and retirees.
#[derive(Debug)]
pub(crate) struct WorkerCount(AtomicI32);

impl WorkerCount {
    pub(crate) fn new() -> Self {
        Self(AtomicI32::new(0))
    }

    /// Current population. May be stale by the time the caller acts on it,
    /// but never outside the configured bounds.
    pub(crate) fn get(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Increment the population iff it is currently below `max`.
    pub(crate) fn increment_below(&self, max: i32) -> bool {
        let mut current = self.0.load(Ordering::Relaxed);
        while current < max {
            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Decrement the population iff it is currently above `min`.
    pub(crate) fn decrement_above(&self, min: i32) -> bool {
        let mut current = self.0.load(Ordering::Relaxed);
        while current > min {
            match self.0.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Unconditional decrement. Only the worker exit guard uses this, exactly
    /// once per exiting worker whose slot has not already been released by
    /// [`WorkerCount::decrement_above`].
    pub(crate) fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
