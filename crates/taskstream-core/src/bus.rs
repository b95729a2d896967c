//! Typed, synchronous publish/subscribe dispatcher for `StreamEvent`s.
//!
//! Handlers are keyed by `EventKind` and invoked in subscription order on the
//! publishing thread. Dispatch iterates a snapshot of the handler list, so
//! handlers may subscribe, unsubscribe or publish from inside a callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::trace;

use crate::stream::{EventKind, StreamEvent};

type Handler = dyn Fn(&StreamEvent) + Send + Sync;

struct HandlerEntry {
    id: u64,
    active: AtomicBool,
    handler: Box<Handler>,
}

#[derive(Default)]
struct BusInner {
    handlers: DashMap<EventKind, Vec<Arc<HandlerEntry>>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, kind: EventKind, id: u64) {
        if let Some(mut entries) = self.handlers.get_mut(&kind) {
            entries.retain(|entry| entry.id != id);
        }
    }
}

/// Process-wide event dispatcher. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every handler currently registered for its kind.
    pub fn publish(&self, event: &StreamEvent) {
        let kind = event.kind();
        let snapshot: Vec<Arc<HandlerEntry>> = match self.inner.handlers.get(&kind) {
            Some(entries) => entries.clone(),
            None => return,
        };
        trace!(
            event = "bus.publish",
            kind = %kind,
            task_id = %event.task_id(),
            handlers = snapshot.len() as u64
        );
        for entry in snapshot {
            if entry.active.load(Ordering::Acquire) {
                (entry.handler)(event);
            }
        }
    }

    /// Registers `handler` for events of `kind`.
    ///
    /// The handler stays registered until the returned `Subscription` is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(HandlerEntry {
            id,
            active: AtomicBool::new(true),
            handler: Box::new(handler),
        });
        self.inner
            .handlers
            .entry(kind)
            .or_default()
            .push(Arc::clone(&entry));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            entry: Some(entry),
        }
    }

    /// Number of live handlers for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .get(&kind)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

/// Registration handle returned by `EventBus::subscribe`.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    entry: Option<Arc<HandlerEntry>>,
}

impl Subscription {
    /// Deregisters the handler. Takes effect immediately, including for a
    /// dispatch already in progress on another handler.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        entry.active.store(false, Ordering::Release);
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.kind, entry.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
