//! Worker state machine
//!
//! Each worker loops over a four-way select: pool shutdown, its own task
//! token, the idle timer, and the queue. The idle sleep is re-created on
//! every iteration, so it measures consecutive quiet time rather than time
//! since the worker started.

use std::sync::Arc;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::pool::{Handler, PoolCore, WorkerPoolError};

/// Releases the worker's population slot exactly once when it exits.
///
/// Retirement already gives the slot back through `decrement_above`, so that
/// path disarms the guard; every other exit (shutdown, task cancellation,
/// a panicking handler unwinding through the loop) decrements here.
struct ExitGuard<T> {
    core: Arc<PoolCore<T>>,
    decrement: bool,
}

impl<T> ExitGuard<T> {
    fn new(core: Arc<PoolCore<T>>) -> Self {
        Self {
            core,
            decrement: true,
        }
    }

    fn retired(&mut self) {
        self.decrement = false;
    }
}

impl<T> Drop for ExitGuard<T> {
    fn drop(&mut self) {
        if self.decrement {
            self.core.workers.decrement();
        }
        self.core.metrics.worker_stopped();
    }
}

/// Runs one worker until it retires, the pool shuts down, or its task token
/// is cancelled.
pub(crate) async fn worker_loop<T: Send + 'static>(
    core: Arc<PoolCore<T>>,
    mut handler: Handler<T>,
    cancellation: CancellationToken,
) -> Result<(), WorkerPoolError> {
    core.metrics.worker_started();
    debug!(pool = %core.config.name, "worker started");

    let mut guard = ExitGuard::new(Arc::clone(&core));

    loop {
        tokio::select! {
            _ = core.root.cancelled() => {
                debug!(pool = %core.config.name, "worker stopping: pool closed");
                return Err(WorkerPoolError::Closed);
            }

            _ = cancellation.cancelled() => {
                debug!(pool = %core.config.name, "worker stopping: task cancelled");
                return Err(WorkerPoolError::Cancelled);
            }

            _ = time::sleep(core.config.worker_idle_timeout) => {
                if core.workers.decrement_above(core.config.min_workers) {
                    guard.retired();
                    debug!(pool = %core.config.name, "worker retired after idling");
                    return Ok(());
                }
            }

            received = core.queue.pop() => {
                let Some(item) = received else {
                    return Ok(());
                };
                core.metrics.work_dequeued();
                trace!(pool = %core.config.name, "work dequeued");
                (handler)(item.ctx, item.item).await;
            }
        }
    }
}
