//! Bounded FIFO of contextual work items

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use crate::context::TaskContext;

/// A work item paired with the context captured at publish time.
///
/// The item's context, not the worker's, is what the handler receives; that
/// keeps per-request scope (trace identifiers, cancellation observable by the
/// handler) attached to the item through asynchronous dispatch.
#[derive(Debug)]
pub(crate) struct ContextualItem<T> {
    pub(crate) ctx: TaskContext,
    pub(crate) item: T,
}

/// Bounded multi-producer multi-consumer FIFO of [`ContextualItem`]s.
///
/// A configured capacity of zero means direct handoff: a push is admitted
/// only while some worker is parked in [`WorkQueue::pop`]. The channel
/// itself cannot be allocated with zero slots, so handoff mode runs over a
/// one-slot channel gated on the parked-receiver count. A slot filled in the
/// instant a parked worker departs is drained by the next worker iteration;
/// the pool's worker floor guarantees there always is one.
pub(crate) struct WorkQueue<T> {
    tx: async_channel::Sender<ContextualItem<T>>,
    rx: async_channel::Receiver<ContextualItem<T>>,
    capacity: usize,
    /// Receivers currently parked in `pop`. Only consulted in handoff mode.
    parked: AtomicUsize,
    /// Signaled every time a receiver parks.
    handoff: Notify,
}

impl<T> WorkQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            capacity,
            parked: AtomicUsize::new(0),
            handoff: Notify::new(),
        }
    }

    /// Items currently buffered and not yet picked up by a worker.
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    /// Push without waiting. On failure the item is handed back.
    pub(crate) fn try_push(&self, item: ContextualItem<T>) -> Result<(), ContextualItem<T>> {
        if self.capacity == 0 && self.parked.load(Ordering::SeqCst) == 0 {
            return Err(item);
        }
        self.tx.try_send(item).map_err(|err| err.into_inner())
    }

    /// Push, waiting for capacity (or, in handoff mode, for a worker to
    /// park). The caller bounds the wait by racing this future in a select.
    /// On channel closure the item is handed back.
    pub(crate) async fn push(&self, item: ContextualItem<T>) -> Result<(), ContextualItem<T>> {
        if self.capacity > 0 {
            return self.tx.send(item).await.map_err(|err| err.0);
        }

        let mut item = item;
        loop {
            let notified = self.handoff.notified();
            tokio::pin!(notified);
            // Register for the next park signal before checking, so a worker
            // parking between the check and the await is not missed.
            notified.as_mut().enable();

            match self.try_push(item) {
                Ok(()) => return Ok(()),
                Err(rejected) => item = rejected,
            }

            notified.await;
        }
    }

    /// Receive the next item. Returns `None` once the queue is closed and
    /// drained. Cancellation-safe: dropping the future mid-wait consumes
    /// nothing and unparks cleanly.
    pub(crate) async fn pop(&self) -> Option<ContextualItem<T>> {
        if self.capacity == 0 {
            self.parked.fetch_add(1, Ordering::SeqCst);
            let _unpark = ParkGuard(&self.parked);
            self.handoff.notify_waiters();
            self.rx.recv().await.ok()
        } else {
            self.rx.recv().await.ok()
        }
    }
}

struct ParkGuard<'a>(&'a AtomicUsize);

impl Drop for ParkGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
