//! Sequential status notification delivery.
//!
//! Transitions are enqueued while the status lock is held, so the queue
//! order is the transition order. A single delivery task then invokes
//! listeners one at a time — listener code never observes reordered or
//! duplicated events, and never runs under the session's locks.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::trace;

use super::SessionStatus;

type Listener = Arc<dyn Fn(SessionStatus) + Send + Sync>;

/// Fan-out point for session status changes.
pub(crate) struct StatusNotifier {
    tx: mpsc::UnboundedSender<SessionStatus>,
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl StatusNotifier {
    /// Create the notifier and spawn its delivery task. Must be called
    /// within a Tokio runtime.
    pub(crate) fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionStatus>();
        let listeners: Arc<Mutex<Vec<Listener>>> = Arc::default();

        let delivery = listeners.clone();
        tokio::spawn(async move {
            while let Some(status) = rx.recv().await {
                trace!(%status, "delivering status notification");
                // Snapshot so listener callbacks run without the lock.
                let snapshot: Vec<Listener> = delivery
                    .lock()
                    .expect("listener lock poisoned")
                    .clone();
                for listener in snapshot {
                    listener(status);
                }
            }
        });

        Self { tx, listeners }
    }

    /// Register a listener. Applies to transitions enqueued afterwards.
    pub(crate) fn add_listener(&self, listener: impl Fn(SessionStatus) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(Arc::new(listener));
    }

    /// Enqueue one transition for delivery. Non-blocking; called while
    /// the status lock is held so enqueue order equals transition order.
    pub(crate) fn notify(&self, status: SessionStatus) {
        // Delivery task gone means the runtime is shutting down; nothing
        // left to notify.
        let _ = self.tx.send(status);
    }
}
