//! Stream feature negotiation engine.
//!
//! Owns the ordered queue of not-yet-negotiated features, dispatches
//! inbound elements to negotiators in registration order, and tracks
//! completion through cancellable signals. All queue and negotiator
//! mutation is serialized behind one per-connection lock, so negotiators
//! are never invoked concurrently even though the session's callers are
//! many.

mod signal;

pub use signal::{CompletionSignal, CompletionWaiter, SignalOutcome};

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{Result, StreamError};
use crate::feature::{
    negotiation_order, Begin, FeatureKind, FeatureNegotiator, NegotiationOutcome, StreamFeature,
};
use crate::proto::Element;
use crate::transport::StreamTransport;

/// Result of offering an inbound element to the engine.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// A negotiator consumed the element.
    Consumed,
    /// No negotiator owned the element; the caller may route it elsewhere.
    NotConsumed,
    /// Negotiation failed; the stream is no longer usable.
    Failed(Arc<StreamError>),
}

struct EngineInner {
    negotiators: Vec<Box<dyn FeatureNegotiator>>,
    queue: VecDeque<StreamFeature>,
    advertised: HashMap<FeatureKind, StreamFeature>,
    /// An opening element has been sent and its response is pending.
    in_flight: bool,
    /// A feature advertisement has been seen on the current stream.
    advertised_seen: bool,
    cancelled: bool,
}

struct SignalTable {
    features: HashMap<FeatureKind, CompletionSignal>,
    all: CompletionSignal,
    cancelled: bool,
}

/// The feature negotiation engine for one stream connection.
pub struct NegotiationEngine {
    transport: Arc<dyn StreamTransport>,
    inner: Mutex<EngineInner>,
    signals: StdMutex<SignalTable>,
}

impl NegotiationEngine {
    /// Create an engine over the given transport with the negotiators to
    /// try, in dispatch order.
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        negotiators: Vec<Box<dyn FeatureNegotiator>>,
    ) -> Self {
        Self {
            transport,
            inner: Mutex::new(EngineInner {
                negotiators,
                queue: VecDeque::new(),
                advertised: HashMap::new(),
                in_flight: false,
                advertised_seen: false,
                cancelled: false,
            }),
            signals: StdMutex::new(SignalTable {
                features: HashMap::new(),
                all: CompletionSignal::new(),
                cancelled: false,
            }),
        }
    }

    /// Replace the pending queue with a fresh feature advertisement and
    /// immediately begin negotiating the queue head.
    pub async fn on_features_advertised(&self, mut features: Vec<StreamFeature>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.cancelled {
            return Err(StreamError::SessionClosed);
        }

        negotiation_order(&mut features);

        // A lone encryption-upgrade offer is compulsory by protocol
        // convention, whatever the wire flag said.
        if features.len() == 1 && features[0].kind == FeatureKind::StartTls {
            features[0].mandatory = true;
        }

        debug!(count = features.len(), "features advertised");
        inner.advertised = features
            .iter()
            .map(|f| (f.kind.clone(), f.clone()))
            .collect();
        inner.queue = features.into();
        inner.in_flight = false;
        inner.advertised_seen = true;
        self.refresh_all_signal_if_failed();

        if let Err(err) = self.advance(&mut inner).await {
            let (shared, _) = self.settle_failure(&mut inner, err);
            return Err(StreamError::NegotiationFailed(shared.to_string()));
        }
        Ok(())
    }

    /// Offer one inbound element to the registered negotiators.
    pub async fn on_element(&self, element: &Element) -> Dispatch {
        let mut inner = self.inner.lock().await;
        if inner.cancelled {
            return Dispatch::NotConsumed;
        }

        for i in 0..inner.negotiators.len() {
            let reaction = match inner.negotiators[i].handle(element) {
                Ok(reaction) => reaction,
                Err(err) => {
                    let (shared, recoverable) = self.settle_failure(&mut inner, err);
                    return if recoverable {
                        Dispatch::Consumed
                    } else {
                        Dispatch::Failed(shared)
                    };
                }
            };

            match reaction.outcome {
                NegotiationOutcome::Ignored => {}
                NegotiationOutcome::Incomplete => {
                    trace!(negotiator = ?inner.negotiators[i].kind(), "exchange continues");
                    if let Some(reply) = reaction.reply {
                        if let Err(err) = self.transport.send(reply).await {
                            let (shared, _) = self.settle_failure(&mut inner, err);
                            return Dispatch::Failed(shared);
                        }
                    }
                    return Dispatch::Consumed;
                }
                NegotiationOutcome::Succeeded | NegotiationOutcome::RestartRequired => {
                    let kind = inner.negotiators[i].kind();
                    if let Some(reply) = reaction.reply {
                        if let Err(err) = self.transport.send(reply).await {
                            let (shared, _) = self.settle_failure(&mut inner, err);
                            return Dispatch::Failed(shared);
                        }
                    }
                    let restart = match self.finish_feature(&mut inner, &kind, reaction.outcome) {
                        Ok(restart) => restart,
                        Err(err) => {
                            let (shared, _) = self.settle_failure(&mut inner, err);
                            return Dispatch::Failed(shared);
                        }
                    };
                    let follow_up = if restart {
                        self.restart(&mut inner).await
                    } else {
                        self.advance(&mut inner).await
                    };
                    if let Err(err) = follow_up {
                        let (shared, _) = self.settle_failure(&mut inner, err);
                        return Dispatch::Failed(shared);
                    }
                    return Dispatch::Consumed;
                }
            }
        }

        Dispatch::NotConsumed
    }

    /// Signal fulfilled once negotiation of the given feature type begins
    /// (or completes vacuously). Resolved via cancellation if the feature
    /// is never advertised before the session closes.
    pub fn await_feature(&self, kind: &FeatureKind) -> CompletionWaiter {
        self.feature_signal(kind).waiter()
    }

    /// Idempotently re-kick negotiation of the current queue head if none
    /// is in flight, and return a waiter on the all-negotiated signal.
    pub async fn complete_all(&self) -> CompletionWaiter {
        let mut inner = self.inner.lock().await;
        if !inner.cancelled {
            self.refresh_all_signal_if_failed();
            if !inner.in_flight {
                if let Err(err) = self.advance(&mut inner).await {
                    self.settle_failure(&mut inner, err);
                }
            }
        }
        self.all_signal().waiter()
    }

    /// Whether every advertised feature has finished negotiating.
    pub fn is_complete(&self) -> bool {
        self.all_signal().is_completed()
    }

    /// Whether negotiation of the given feature type has begun on this
    /// connection (including vacuous completion).
    pub fn feature_begun(&self, kind: &FeatureKind) -> bool {
        self.feature_signal(kind).is_completed()
    }

    /// What the current stream advertised for the given feature type.
    pub async fn advertised(&self, kind: &FeatureKind) -> Option<StreamFeature> {
        self.inner.lock().await.advertised.get(kind).cloned()
    }

    /// Resolve every outstanding signal via cancellation and stop
    /// negotiating. Invoked on session teardown.
    pub async fn cancel(&self) {
        let mut inner = self.inner.lock().await;
        inner.cancelled = true;
        inner.queue.clear();
        inner.advertised.clear();
        inner.in_flight = false;
        drop(inner);

        let mut table = self.signals.lock().expect("signal table lock poisoned");
        table.cancelled = true;
        for signal in table.features.values() {
            signal.cancel();
        }
        table.all.cancel();
    }

    fn feature_signal(&self, kind: &FeatureKind) -> CompletionSignal {
        let mut table = self.signals.lock().expect("signal table lock poisoned");
        let signal = table
            .features
            .entry(kind.clone())
            .or_insert_with(CompletionSignal::new)
            .clone();
        if table.cancelled {
            signal.cancel();
        }
        signal
    }

    fn all_signal(&self) -> CompletionSignal {
        self.signals
            .lock()
            .expect("signal table lock poisoned")
            .all
            .clone()
    }

    /// After a recoverable failure the settled all-signal must not strand
    /// the next attempt: install a fresh one.
    fn refresh_all_signal_if_failed(&self) {
        let mut table = self.signals.lock().expect("signal table lock poisoned");
        if table.all.is_failed() && !table.cancelled {
            table.all = CompletionSignal::new();
        }
    }

    /// Pop the completed feature and fulfill its signal. Returns whether a
    /// stream restart must follow.
    fn finish_feature(
        &self,
        inner: &mut EngineInner,
        kind: &FeatureKind,
        outcome: NegotiationOutcome,
    ) -> Result<bool> {
        let position = inner
            .queue
            .iter()
            .position(|f| &f.kind == kind)
            .ok_or_else(|| {
                StreamError::Protocol(format!("negotiator for {kind:?} completed off-queue"))
            })?;
        let feature = inner.queue.remove(position).expect("position just found");
        self.feature_signal(kind).complete();
        inner.in_flight = false;
        debug!(kind = ?kind, "feature negotiated");

        Ok(outcome == NegotiationOutcome::RestartRequired || feature.restart)
    }

    /// Discard all pre-restart state and ask the transport for a fresh
    /// stream. The remote endpoint re-advertises afterwards, which
    /// re-enters at [`Self::on_features_advertised`].
    async fn restart(&self, inner: &mut EngineInner) -> Result<()> {
        debug!(dropped = inner.queue.len(), "stream restart, discarding pending queue");
        inner.queue.clear();
        inner.advertised.clear();
        inner.in_flight = false;
        inner.advertised_seen = false;
        self.transport.restart_stream().await
    }

    /// Begin negotiating from the queue head until something is in flight,
    /// a negotiator defers, or the queue drains. Bounded by the remaining
    /// queue length.
    async fn advance(&self, inner: &mut EngineInner) -> Result<()> {
        loop {
            let Some(feature) = inner.queue.front().cloned() else {
                if inner.advertised_seen && self.all_signal().complete() {
                    debug!("all features negotiated");
                }
                return Ok(());
            };

            // Negotiation of this feature type has begun.
            self.feature_signal(&feature.kind).complete();

            let Some(negotiator) = inner
                .negotiators
                .iter_mut()
                .find(|n| n.kind() == feature.kind)
            else {
                // No negotiator registered: vacuously complete so the
                // rest of the queue is not blocked.
                trace!(kind = ?feature.kind, "no negotiator, vacuously complete");
                inner.queue.pop_front();
                continue;
            };

            match negotiator.begin(&feature)? {
                Begin::Send(element) => {
                    debug!(kind = ?feature.kind, "negotiating");
                    inner.in_flight = true;
                    return self.transport.send(element).await;
                }
                Begin::Deferred => {
                    trace!(kind = ?feature.kind, "negotiator deferred");
                    inner.in_flight = false;
                    return Ok(());
                }
                Begin::Done => {
                    inner.queue.pop_front();
                    continue;
                }
            }
        }
    }

    /// Record a negotiation failure: fail the all-negotiated signal and,
    /// unless the failure is recoverable (authentication rejection), drop
    /// the queue. Returns the shared error and whether it was recoverable.
    fn settle_failure(
        &self,
        inner: &mut EngineInner,
        error: StreamError,
    ) -> (Arc<StreamError>, bool) {
        let recoverable = error.is_recoverable();
        inner.in_flight = false;
        if !recoverable {
            inner.queue.clear();
            inner.advertised.clear();
            // The stream is dead; a later re-kick must not mistake the
            // drained queue for completed negotiation.
            inner.advertised_seen = false;
        }
        let shared = Arc::new(error);
        warn!(error = %shared, recoverable, "negotiation failure");
        self.all_signal().fail(shared.clone());
        (shared, recoverable)
    }
}
