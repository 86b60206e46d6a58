//! Pool observability counters
//!
//! Five counters per pool, labeled by the pool name: workers started and
//! stopped, work enqueued, dequeued and dropped. Recording is a single
//! relaxed atomic add, so it can never block a publisher or a worker.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for a single pool.
#[derive(Debug)]
pub struct PoolMetrics {
    name: String,
    workers_started: AtomicU64,
    workers_stopped: AtomicU64,
    work_enqueued: AtomicU64,
    work_dequeued: AtomicU64,
    work_dropped: AtomicU64,
}

impl PoolMetrics {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workers_started: AtomicU64::new(0),
            workers_stopped: AtomicU64::new(0),
            work_enqueued: AtomicU64::new(0),
            work_dequeued: AtomicU64::new(0),
            work_dropped: AtomicU64::new(0),
        }
    }

    /// The pool name these counters are labeled with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn worker_started(&self) {
        self.workers_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_stopped(&self) {
        self.workers_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn work_enqueued(&self) {
        self.work_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn work_dequeued(&self) {
        self.work_dequeued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn work_dropped(&self) {
        self.work_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_stopped: self.workers_stopped.load(Ordering::Relaxed),
            work_enqueued: self.work_enqueued.load(Ordering::Relaxed),
            work_dequeued: self.work_dequeued.load(Ordering::Relaxed),
            work_dropped: self.work_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Counter values captured by [`PoolMetrics::snapshot`].
///
/// For a drained, settled pool: `work_enqueued == work_dequeued`, and
/// `work_dropped` accounts for every publish that returned pool-full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub workers_started: u64,
    pub workers_stopped: u64,
    pub work_enqueued: u64,
    pub work_dequeued: u64,
    pub work_dropped: u64,
}
