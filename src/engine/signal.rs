//! Cancellable completion signals.
//!
//! A [`CompletionSignal`] is a promise settled exactly once: completed,
//! cancelled, or failed with an error. Any number of waiters may hold a
//! [`CompletionWaiter`]; cancellation on session teardown unblocks all of
//! them, so nobody waits past close.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::StreamError;

/// How a signal settled.
#[derive(Debug, Clone)]
pub enum SignalOutcome {
    /// The awaited event happened.
    Completed,
    /// The session was torn down before the event happened.
    Cancelled,
    /// The awaited work failed.
    Failed(Arc<StreamError>),
}

#[derive(Debug, Clone)]
enum SignalState {
    Pending,
    Settled(SignalOutcome),
}

/// A promise settled exactly once.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<SignalState>>,
}

impl CompletionSignal {
    /// Create a pending signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SignalState::Pending);
        Self { tx: Arc::new(tx) }
    }

    fn settle(&self, outcome: SignalOutcome) -> bool {
        self.tx.send_if_modified(|state| {
            if matches!(state, SignalState::Pending) {
                *state = SignalState::Settled(outcome);
                true
            } else {
                false
            }
        })
    }

    /// Fulfill the signal. Returns false if it was already settled.
    pub fn complete(&self) -> bool {
        self.settle(SignalOutcome::Completed)
    }

    /// Resolve the signal via cancellation. No-op if already settled.
    pub fn cancel(&self) {
        self.settle(SignalOutcome::Cancelled);
    }

    /// Resolve the signal with a failure. No-op if already settled.
    pub fn fail(&self, error: Arc<StreamError>) {
        self.settle(SignalOutcome::Failed(error));
    }

    /// Whether the signal has settled as completed.
    pub fn is_completed(&self) -> bool {
        matches!(
            &*self.tx.borrow(),
            SignalState::Settled(SignalOutcome::Completed)
        )
    }

    /// Whether the signal settled with a failure.
    pub fn is_failed(&self) -> bool {
        matches!(
            &*self.tx.borrow(),
            SignalState::Settled(SignalOutcome::Failed(_))
        )
    }

    /// Obtain a waiter on this signal.
    pub fn waiter(&self) -> CompletionWaiter {
        CompletionWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// One consumer's handle on a [`CompletionSignal`].
#[derive(Debug, Clone)]
pub struct CompletionWaiter {
    rx: watch::Receiver<SignalState>,
}

impl CompletionWaiter {
    /// Suspend until the signal settles.
    pub async fn wait(&mut self) -> SignalOutcome {
        loop {
            if let SignalState::Settled(outcome) = &*self.rx.borrow() {
                return outcome.clone();
            }
            if self.rx.changed().await.is_err() {
                // Signal dropped while pending: indistinguishable from
                // teardown for the waiter.
                return SignalOutcome::Cancelled;
            }
        }
    }
}
