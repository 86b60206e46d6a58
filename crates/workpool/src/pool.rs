//! Dynamic worker pool
//!
//! A [`WorkerPool`] dispatches published items to a dynamically sized set of
//! long-lived worker tasks. Workers are created on demand from the publish
//! path, live while work keeps arriving, and retire after idling, never
//! below the configured floor or above the ceiling. A full queue does
//! not block publishers indefinitely: after one spawn attempt the publisher
//! waits a bounded time, then the item is dropped and a pool-full error
//! returned.

use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::config::PoolConfig;
use crate::context::{ContextAdapter, DetachingAdapter, TaskContext};
use crate::counter::WorkerCount;
use crate::host::{RestartPolicy, TaskBackoff, TaskConfig, TaskFn, TaskHost};
use crate::metrics::{MetricsSnapshot, PoolMetrics};
use crate::queue::{ContextualItem, WorkQueue};
use crate::worker::worker_loop;
use crate::BoxError;

/// Per-worker consumer invoked once per item.
///
/// The context passed in is the one captured at publish time, not the
/// worker's own.
pub type Handler<T> = Box<dyn FnMut(TaskContext, T) -> BoxFuture<'static, ()> + Send>;

/// Factory producing a fresh [`Handler`] for every spawned worker. Handlers
/// are never shared between workers.
pub type HandlerFactory<T> = Arc<dyn Fn() -> Result<Handler<T>, BoxError> + Send + Sync>;

/// Builds a [`HandlerFactory`] that hands every worker its own clone of the
/// same async function.
pub fn handler_fn<T, F, Fut>(f: F) -> HandlerFactory<T>
where
    T: Send + 'static,
    F: Fn(TaskContext, T) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move || {
        let f = f.clone();
        let handler: Handler<T> = Box::new(move |ctx, item| f(ctx, item).boxed());
        Ok(handler)
    })
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// The pool's root lifetime has ended.
    #[error("worker pool is shutting down")]
    Closed,

    /// The caller's context ended before the item could be enqueued.
    #[error("publish was cancelled by the caller")]
    Cancelled,

    /// The queue stayed full past the busy timeout.
    #[error("the worker pool is full")]
    PoolFull,

    /// The handler factory failed while spawning a worker.
    #[error("failed to create worker handler: {0}")]
    Handler(#[source] BoxError),
}

/// State shared between the pool handle and its workers.
pub(crate) struct PoolCore<T> {
    pub(crate) config: PoolConfig,
    pub(crate) root: CancellationToken,
    pub(crate) queue: WorkQueue<T>,
    pub(crate) workers: WorkerCount,
    pub(crate) metrics: Arc<PoolMetrics>,
}

/// A dynamic pool of workers to which work items can be published.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use workpool::{handler_fn, PoolConfig, TaskContext, TokioTaskHost, WorkerPool};
///
/// let root = CancellationToken::new();
/// let pool = WorkerPool::new(
///     Arc::new(TokioTaskHost::new()),
///     root.clone(),
///     handler_fn(|_ctx, uplink: Uplink| async move {
///         process(uplink).await;
///     }),
///     PoolConfig::new("uplinks").with_max_workers(16).with_queue_size(64),
/// )?;
///
/// pool.publish(&TaskContext::new(), uplink).await?;
/// ```
pub struct WorkerPool<T> {
    core: Arc<PoolCore<T>>,
    host: Arc<dyn TaskHost>,
    adapter: Arc<dyn ContextAdapter>,
    create_handler: HandlerFactory<T>,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            host: Arc::clone(&self.host),
            adapter: Arc::clone(&self.adapter),
            create_handler: Arc::clone(&self.create_handler),
        }
    }
}

impl<T> fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.core.config.name)
            .field("workers", &self.core.workers.get())
            .field("queued", &self.core.queue.len())
            .finish()
    }
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool and eagerly spawn its minimum worker population.
    ///
    /// The configuration is normalized first (see [`PoolConfig`]). Workers
    /// run as tasks on `host` under the `root` lifetime; cancelling `root`
    /// stops every worker and fails all further publishes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerPoolError::Handler`] if the factory fails during the
    /// eager spawns.
    #[instrument(skip_all, fields(pool = %config.name))]
    pub fn new(
        host: Arc<dyn TaskHost>,
        root: CancellationToken,
        create_handler: HandlerFactory<T>,
        config: PoolConfig,
    ) -> Result<Self, WorkerPoolError> {
        let config = config.normalized();

        debug!(
            min_workers = config.min_workers,
            max_workers = config.max_workers,
            queue_size = config.queue_size,
            "creating worker pool"
        );

        let core = Arc::new(PoolCore {
            metrics: Arc::new(PoolMetrics::new(config.name.clone())),
            queue: WorkQueue::new(config.queue_size as usize),
            workers: WorkerCount::new(),
            root,
            config,
        });

        let pool = Self {
            core,
            host,
            adapter: Arc::new(DetachingAdapter),
            create_handler,
        };

        for _ in 0..pool.core.config.min_workers {
            pool.spawn_worker()?;
        }

        Ok(pool)
    }

    /// Replace the default detaching context adapter.
    pub fn with_context_adapter(mut self, adapter: Arc<dyn ContextAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    /// Publish an item to be processed by one worker.
    ///
    /// Never blocks indefinitely: if the queue has no free capacity the pool
    /// first tries to grow the worker population, then waits at most the
    /// configured busy timeout before dropping the item.
    ///
    /// # Errors
    ///
    /// - [`WorkerPoolError::Closed`]: the root lifetime ended.
    /// - [`WorkerPoolError::Cancelled`]: `ctx` ended first.
    /// - [`WorkerPoolError::PoolFull`]: the item was dropped; the handler
    ///   will never see it.
    /// - [`WorkerPoolError::Handler`]: the factory failed during the spawn
    ///   attempt.
    pub async fn publish(&self, ctx: &TaskContext, item: T) -> Result<(), WorkerPoolError> {
        let core = &self.core;

        if core.root.is_cancelled() {
            return Err(WorkerPoolError::Closed);
        }
        if ctx.is_cancelled() {
            return Err(WorkerPoolError::Cancelled);
        }

        let item = ContextualItem {
            ctx: self.adapter.from_request_context(ctx),
            item,
        };

        // Fast path: free capacity right now.
        let item = match core.queue.try_push(item) {
            Ok(()) => {
                core.metrics.work_enqueued();
                trace!(pool = %core.config.name, "work enqueued");
                return Ok(());
            }
            Err(rejected) => rejected,
        };

        // The queue is full: try to grow the population before waiting.
        self.spawn_worker()?;

        tokio::select! {
            biased;

            _ = core.root.cancelled() => Err(WorkerPoolError::Closed),

            _ = ctx.cancelled() => Err(WorkerPoolError::Cancelled),

            pushed = core.queue.push(item) => match pushed {
                Ok(()) => {
                    core.metrics.work_enqueued();
                    trace!(pool = %core.config.name, "work enqueued");
                    Ok(())
                }
                Err(_) => Err(WorkerPoolError::Closed),
            },

            _ = time::sleep(core.config.worker_busy_timeout) => {
                core.metrics.work_dropped();
                debug!(pool = %core.config.name, "work dropped: pool full");
                Err(WorkerPoolError::PoolFull)
            }
        }
    }

    /// Attempt to grow the worker population by one.
    ///
    /// The handler factory runs before the counter is touched, so a factory
    /// failure never inflates the population. Returns without spawning when
    /// the population is already at the ceiling.
    fn spawn_worker(&self) -> Result<(), WorkerPoolError> {
        let handler = (self.create_handler)().map_err(WorkerPoolError::Handler)?;

        if !self.core.workers.increment_below(self.core.config.max_workers) {
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let mut handler = Some(handler);
        let func: TaskFn = Box::new(move |cancellation| {
            // Workers never restart; a second invocation has nothing to run.
            match handler.take() {
                Some(handler) => worker_loop(Arc::clone(&core), handler, cancellation)
                    .map(|result| result.map_err(BoxError::from))
                    .boxed(),
                None => future::ready(Ok(())).boxed(),
            }
        });

        self.host.start_task(TaskConfig {
            id: self.core.config.name.clone(),
            cancellation: self.core.root.clone(),
            func,
            restart: RestartPolicy::Never,
            backoff: TaskBackoff::default(),
        });

        Ok(())
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.core.config.name
    }

    /// Number of live workers. May be stale by the time it is read, but
    /// never outside `[0, max_workers]`.
    pub fn worker_count(&self) -> i32 {
        self.core.workers.get()
    }

    /// Items currently queued and not yet picked up by a worker.
    pub fn queued_items(&self) -> usize {
        self.core.queue.len()
    }

    /// Point-in-time counters for this pool.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::host::TokioTaskHost;

    fn noop_factory() -> HandlerFactory<u32> {
        handler_fn(|_ctx, _item: u32| async {})
    }

    /// Host that records submissions instead of running them.
    struct RecordingHost {
        submitted: Mutex<Vec<(String, RestartPolicy)>>,
    }

    impl RecordingHost {
        fn new() -> Self {
            Self {
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    impl TaskHost for RecordingHost {
        fn start_task(&self, config: TaskConfig) {
            self.submitted
                .lock()
                .unwrap()
                .push((config.id, config.restart));
        }
    }

    #[tokio::test]
    async fn test_eager_spawns_request_never_restart() {
        let host = Arc::new(RecordingHost::new());

        let pool = WorkerPool::new(
            Arc::clone(&host) as Arc<dyn TaskHost>,
            CancellationToken::new(),
            noop_factory(),
            PoolConfig::new("eager").with_min_workers(3).with_max_workers(4),
        )
        .unwrap();

        assert_eq!(pool.worker_count(), 3);

        let submitted = host.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 3);
        for (id, restart) in submitted.iter() {
            assert_eq!(id, "eager");
            assert_eq!(*restart, RestartPolicy::Never);
        }
    }

    #[tokio::test]
    async fn test_factory_failure_aborts_construction() {
        let calls = Arc::new(AtomicU32::new(0));
        let factory: HandlerFactory<u32> = {
            let calls = Arc::clone(&calls);
            Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("no handler for you".into())
            })
        };

        let result = WorkerPool::new(
            Arc::new(TokioTaskHost::new()),
            CancellationToken::new(),
            factory,
            PoolConfig::new("broken"),
        );

        assert!(matches!(result, Err(WorkerPoolError::Handler(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_after_root_cancelled_fails_closed() {
        let root = CancellationToken::new();
        let pool = WorkerPool::new(
            Arc::new(TokioTaskHost::new()),
            root.clone(),
            noop_factory(),
            PoolConfig::new("closing").with_queue_size(4),
        )
        .unwrap();

        root.cancel();

        let err = pool.publish(&TaskContext::new(), 1).await.unwrap_err();
        assert!(matches!(err, WorkerPoolError::Closed));
    }

    #[tokio::test]
    async fn test_publish_with_cancelled_caller_fails_cancelled() {
        let pool = WorkerPool::new(
            Arc::new(TokioTaskHost::new()),
            CancellationToken::new(),
            noop_factory(),
            PoolConfig::new("cancelled").with_queue_size(4),
        )
        .unwrap();

        let ctx = TaskContext::new();
        ctx.cancel();

        let err = pool.publish(&ctx, 1).await.unwrap_err();
        assert!(matches!(err, WorkerPoolError::Cancelled));
    }
}
