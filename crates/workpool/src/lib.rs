//! # Workpool
//!
//! An elastic worker pool for dispatching work items to a dynamically sized
//! set of long-lived worker tasks.
//!
//! ## Features
//!
//! - **Demand-driven spawning**: workers are created from the publish path
//!   when the queue is full, up to a configured ceiling
//! - **Idle retirement**: workers that stay quiet past the idle timeout give
//!   their slot back, down to a configured floor
//! - **Bounded backpressure**: publishers never block indefinitely; sustained
//!   overload surfaces as dropped publishes, not unbounded growth
//! - **Context propagation**: handlers receive the context captured at
//!   publish time, detached from the request's cancellation
//! - **Lock-free coordination**: spawn-vs-retire arbitration is two bounded
//!   compare-and-swap loops over one atomic counter; no mutexes anywhere
//!
//! ## Architecture
//!
//! ```text
//!  publish(ctx, item)
//!        │
//!        ▼
//!  ┌──────────────────────────────────────────────────────────┐
//!  │ try_push ──full──► spawn_worker ──► bounded wait ──► drop │
//!  └──────┬───────────────────┬───────────────────────────────┘
//!         │                   │ TaskHost::start_task (restart: never)
//!         ▼                   ▼
//!  ┌─────────────┐     ┌─────────────────────────────────────┐
//!  │  WorkQueue  │◄────┤ worker: select { root / task token /│
//!  │ (bounded)   │ pop │          idle retire / dequeue }    │
//!  └─────────────┘     └─────────────────────────────────────┘
//!                             │
//!                       WorkerCount (AtomicI32, CAS bounds)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use workpool::prelude::*;
//!
//! let root = CancellationToken::new();
//! let pool = WorkerPool::new(
//!     Arc::new(TokioTaskHost::new()),
//!     root.clone(),
//!     handler_fn(|ctx: TaskContext, event: Event| async move {
//!         deliver(ctx, event).await;
//!     }),
//!     PoolConfig::new("events")
//!         .with_min_workers(1)
//!         .with_max_workers(16)
//!         .with_queue_size(128),
//! )?;
//!
//! pool.publish(&request_ctx, event).await?;
//! ```

pub mod config;
pub mod context;
mod counter;
pub mod host;
pub mod metrics;
pub mod pool;
mod queue;
mod worker;

/// Boxed error returned by collaborator callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{PoolConfig, DEFAULT_WORKER_BUSY_TIMEOUT, DEFAULT_WORKER_IDLE_TIMEOUT};
    pub use crate::context::{ContextAdapter, DetachingAdapter, TaskContext, TraceContext};
    pub use crate::host::{RestartPolicy, TaskBackoff, TaskConfig, TaskHost, TokioTaskHost};
    pub use crate::metrics::{MetricsSnapshot, PoolMetrics};
    pub use crate::pool::{handler_fn, Handler, HandlerFactory, WorkerPool, WorkerPoolError};
}

// Re-export key types at crate root
pub use config::{PoolConfig, DEFAULT_WORKER_BUSY_TIMEOUT, DEFAULT_WORKER_IDLE_TIMEOUT};
pub use context::{ContextAdapter, DetachingAdapter, TaskContext, TraceContext};
pub use host::{
    RestartPolicy, TaskBackoff, TaskConfig, TaskFn, TaskFuture, TaskHost, TokioTaskHost,
};
pub use metrics::{MetricsSnapshot, PoolMetrics};
pub use pool::{handler_fn, Handler, HandlerFactory, WorkerPool, WorkerPoolError};
