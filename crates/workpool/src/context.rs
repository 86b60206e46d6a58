//! Request and item contexts
//!
//! A [`TaskContext`] bundles the two things the pool cares about: a
//! cancellation token (the lifetime the work is tied to) and the values that
//! should survive asynchronous dispatch, such as trace identifiers. The
//! [`ContextAdapter`] derives the context that travels with a queued item
//! from the publisher's request context.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Trace identifiers carried across asynchronous boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub trace_flags: u8,
}

/// Cancellation plus carried values.
///
/// Contexts are cheap to clone: the token is a shared handle and the trace
/// data is cloned by value.
///
/// # Example
///
/// ```ignore
/// use tokio_util::sync::CancellationToken;
/// use workpool::{TaskContext, TraceContext};
///
/// let request_token = CancellationToken::new();
/// let ctx = TaskContext::new()
///     .with_cancellation(request_token.clone())
///     .with_trace(TraceContext {
///         trace_id: "4bf92f35".into(),
///         span_id: "00f067aa".into(),
///         trace_flags: 1,
///     });
/// ```
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    cancellation: CancellationToken,
    trace: Option<TraceContext>,
}

impl TaskContext {
    /// A fresh context with its own cancellation token and no carried values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the context to an existing cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attach trace identifiers.
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    /// The carried trace identifiers, if any.
    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    /// The cancellation token governing this context.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancel this context.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// True once this context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when this context is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// A context that keeps the carried values but none of the cancellation.
    pub fn detached(&self) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            trace: self.trace.clone(),
        }
    }
}

/// Derives the context queued alongside an item from the publisher's request
/// context.
///
/// Queued work must not die with the request that published it (the response
/// may already have been sent) nor live under the worker that executes it
/// (workers are ephemeral). The adapter yields the third lifetime: one that
/// carries the request's values without its cancellation policy.
pub trait ContextAdapter: Send + Sync {
    fn from_request_context(&self, ctx: &TaskContext) -> TaskContext;
}

/// Default adapter: values survive, cancellation does not.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachingAdapter;

impl ContextAdapter for DetachingAdapter {
    fn from_request_context(&self, ctx: &TaskContext) -> TaskContext {
        ctx.detached()
    }
}
