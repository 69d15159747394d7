//! The session itself.
//!
//! Every entry point performs a guarded compare-and-set on the status
//! field: exactly one caller wins each transition, the winner runs the
//! long work outside the lock, and losers either no-op, wait on the
//! winner's completion signal, or fail fast — per operation.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::notify::StatusNotifier;
use super::SessionStatus;
use crate::config::Config;
use crate::engine::{
    CompletionSignal, CompletionWaiter, Dispatch, NegotiationEngine, SignalOutcome,
};
use crate::error::{Result, StreamError};
use crate::feature::{
    BindNegotiator, CompressionNegotiator, Credentials, FeatureKind, FeatureNegotiator, Plain,
    SaslNegotiator, SessionEstablishmentNegotiator, StartTlsNegotiator, StreamFeature,
};
use crate::proto::Element;
use crate::transport::StreamTransport;

/// One client session over one stream connection.
///
/// Construction requires a running Tokio runtime (a background task
/// delivers status notifications). The session is terminal once closed;
/// reconnecting means constructing a fresh one.
pub struct Session {
    id: String,
    transport: Arc<dyn StreamTransport>,
    engine: Arc<NegotiationEngine>,
    status: Mutex<SessionStatus>,
    notifier: StatusNotifier,
    /// Signal for the in-flight connect attempt, if any.
    connect_signal: Mutex<Option<CompletionSignal>>,
    close_signal: CompletionSignal,
    credentials: Arc<Mutex<Option<Credentials>>>,
    bound: Arc<Mutex<Option<String>>>,
    require_encryption: bool,
}

impl Session {
    /// Create a session over the given transport with the default
    /// negotiator set: encryption upgrade, authentication (PLAIN),
    /// compression, resource binding, legacy session establishment.
    pub fn new(config: &Config, transport: Arc<dyn StreamTransport>) -> Self {
        let credentials: Arc<Mutex<Option<Credentials>>> = Arc::default();
        let bound: Arc<Mutex<Option<String>>> = Arc::default();

        let negotiators: Vec<Box<dyn FeatureNegotiator>> = vec![
            Box::new(StartTlsNegotiator::new()),
            Box::new(SaslNegotiator::new(Box::new(Plain), credentials.clone())),
            Box::new(CompressionNegotiator::new(
                config.connection.compression_method.clone(),
            )),
            Box::new(BindNegotiator::new(
                config.connection.resource.clone(),
                bound.clone(),
            )),
            Box::new(SessionEstablishmentNegotiator::new()),
        ];

        let id = Uuid::new_v4().to_string();
        debug!(session = %id, domain = %config.connection.domain, "session created");

        Self {
            id,
            engine: Arc::new(NegotiationEngine::new(transport.clone(), negotiators)),
            transport,
            status: Mutex::new(SessionStatus::Initial),
            notifier: StatusNotifier::new(),
            connect_signal: Mutex::new(None),
            close_signal: CompletionSignal::new(),
            credentials,
            bound,
            require_encryption: config.negotiation.require_encryption,
        }
    }

    /// Session id, for logging and correlation.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.status.lock().expect("status lock poisoned")
    }

    /// Register a status listener. Listeners are invoked one at a time,
    /// in transition order, never under the session's locks.
    pub fn add_status_listener(&self, listener: impl Fn(SessionStatus) + Send + Sync + 'static) {
        self.notifier.add_listener(listener);
    }

    /// Whether every advertised feature has finished negotiating.
    pub fn is_negotiation_complete(&self) -> bool {
        self.engine.is_complete()
    }

    /// Waiter fulfilled once negotiation of the given feature type begins.
    /// Resolved via cancellation if the feature is never advertised before
    /// the session closes.
    pub fn await_feature(&self, kind: &FeatureKind) -> CompletionWaiter {
        self.engine.await_feature(kind)
    }

    /// The server-assigned full address, once resource binding completed.
    pub fn bound_address(&self) -> Option<String> {
        self.bound.lock().expect("bound address lock poisoned").clone()
    }

    /// Establish the stream and negotiate it up to authentication.
    ///
    /// Exactly one concurrent caller opens the transport; the rest wait on
    /// the winner's outcome. Idempotent once connected; fails fast once
    /// closing or closed.
    pub async fn connect(&self) -> Result<()> {
        let waiter = {
            let mut status = self.status.lock().expect("status lock poisoned");
            match *status {
                SessionStatus::Initial => {
                    self.set_status(&mut status, SessionStatus::Connecting);
                    let signal = CompletionSignal::new();
                    *self
                        .connect_signal
                        .lock()
                        .expect("connect signal lock poisoned") = Some(signal);
                    None
                }
                SessionStatus::Connecting => {
                    let signal = self
                        .connect_signal
                        .lock()
                        .expect("connect signal lock poisoned");
                    Some(
                        signal
                            .as_ref()
                            .expect("connecting status implies a connect signal")
                            .waiter(),
                    )
                }
                current if current.is_connected() => return Ok(()),
                current => {
                    return Err(StreamError::InvalidState {
                        status: current,
                        operation: "connect",
                    })
                }
            }
        };

        match waiter {
            Some(mut waiter) => match waiter.wait().await {
                SignalOutcome::Completed => Ok(()),
                SignalOutcome::Cancelled => Err(StreamError::SessionClosed),
                SignalOutcome::Failed(err) => {
                    Err(StreamError::NegotiationFailed(err.to_string()))
                }
            },
            None => self.run_connect().await,
        }
    }

    /// Authenticate the connected stream and finish negotiation.
    ///
    /// Exactly one concurrent caller drives authentication; the rest fail
    /// fast. An authentication rejection reverts to connected so a new
    /// attempt with different credentials may follow.
    pub async fn login(&self, credentials: Credentials) -> Result<()> {
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            match *status {
                SessionStatus::Connected => {
                    self.set_status(&mut status, SessionStatus::Authenticating);
                }
                SessionStatus::Authenticating => {
                    return Err(StreamError::AlreadyInProgress("login"))
                }
                current => {
                    return Err(StreamError::InvalidState {
                        status: current,
                        operation: "login",
                    })
                }
            }
        }

        *self
            .credentials
            .lock()
            .expect("credentials lock poisoned") = Some(credentials);

        let mut all = self.engine.complete_all().await;
        match all.wait().await {
            SignalOutcome::Completed => {
                let mut status = self.status.lock().expect("status lock poisoned");
                if *status != SessionStatus::Authenticating {
                    return Err(StreamError::SessionClosed);
                }
                self.set_status(&mut status, SessionStatus::Authenticated);
                drop(status);
                info!(session = %self.id, "authenticated");
                Ok(())
            }
            SignalOutcome::Failed(err) => match &*err {
                StreamError::AuthenticationFailed(condition) => {
                    let mut status = self.status.lock().expect("status lock poisoned");
                    if *status == SessionStatus::Authenticating {
                        self.set_status(&mut status, SessionStatus::Connected);
                    }
                    Err(StreamError::AuthenticationFailed(condition.clone()))
                }
                _ => {
                    self.close().await;
                    Err(StreamError::NegotiationFailed(err.to_string()))
                }
            },
            SignalOutcome::Cancelled => Err(StreamError::SessionClosed),
        }
    }

    /// Tear the session down. Never fails; idempotent. Losers of the
    /// close race wait for the in-flight close to finish.
    pub async fn close(&self) {
        let winner = {
            let mut status = self.status.lock().expect("status lock poisoned");
            match *status {
                SessionStatus::Closed => return,
                SessionStatus::Closing => false,
                _ => {
                    self.set_status(&mut status, SessionStatus::Closing);
                    true
                }
            }
        };

        if !winner {
            let _ = self.close_signal.waiter().wait().await;
            return;
        }

        // Unblock everything before touching the transport: no waiter may
        // outlive the session.
        self.engine.cancel().await;
        if let Some(signal) = self
            .connect_signal
            .lock()
            .expect("connect signal lock poisoned")
            .take()
        {
            signal.cancel();
        }

        if let Err(err) = self.transport.close().await {
            warn!(session = %self.id, error = %err, "transport close failed");
        }

        {
            let mut status = self.status.lock().expect("status lock poisoned");
            self.set_status(&mut status, SessionStatus::Closed);
        }
        self.close_signal.complete();
        info!(session = %self.id, "closed");
    }

    /// Inbound entry point: a fresh feature advertisement from the remote
    /// endpoint. Invoked by the transport driver.
    pub async fn handle_features(&self, features: Vec<StreamFeature>) -> Result<()> {
        if self.require_encryption
            && !self.engine.feature_begun(&FeatureKind::StartTls)
            && !features.iter().any(|f| f.kind == FeatureKind::StartTls)
        {
            let err =
                StreamError::NegotiationFailed("server offered no encryption upgrade".into());
            self.close().await;
            return Err(err);
        }

        match self.engine.on_features_advertised(features).await {
            Ok(()) => Ok(()),
            Err(StreamError::SessionClosed) => Err(StreamError::SessionClosed),
            Err(err) => {
                self.close().await;
                Err(err)
            }
        }
    }

    /// Inbound entry point: one protocol element from the remote endpoint.
    /// Returns the element back when no negotiator consumed it, so the
    /// caller can route it to the application layer.
    pub async fn handle_element(&self, element: Element) -> Result<Option<Element>> {
        match self.engine.on_element(&element).await {
            Dispatch::Consumed => Ok(None),
            Dispatch::NotConsumed => Ok(Some(element)),
            Dispatch::Failed(err) => {
                self.close().await;
                Err(StreamError::NegotiationFailed(err.to_string()))
            }
        }
    }

    /// Winner half of `connect()`.
    async fn run_connect(&self) -> Result<()> {
        match self.drive_connect().await {
            Ok(()) => {
                {
                    let mut status = self.status.lock().expect("status lock poisoned");
                    if *status != SessionStatus::Connecting {
                        // close() raced the tail of the attempt
                        drop(status);
                        self.settle_connect(|signal| signal.cancel());
                        return Err(StreamError::SessionClosed);
                    }
                    self.set_status(&mut status, SessionStatus::Connected);
                }
                info!(session = %self.id, transport = self.transport.name(), "connected");
                self.settle_connect(|signal| {
                    signal.complete();
                });
                Ok(())
            }
            Err(err) => {
                if matches!(err, StreamError::SessionClosed) {
                    self.settle_connect(|signal| signal.cancel());
                } else {
                    let shared = Arc::new(StreamError::NegotiationFailed(err.to_string()));
                    self.settle_connect(|signal| signal.fail(shared));
                }
                self.close().await;
                Err(err)
            }
        }
    }

    async fn drive_connect(&self) -> Result<()> {
        self.transport.open().await?;

        // Negotiation reaches its stable point when authentication begins
        // (it defers until credentials arrive at login) or when every
        // advertised feature finished (nothing to authenticate).
        let mut auth_begun = self.engine.await_feature(&FeatureKind::Authentication);
        let mut all = self.engine.complete_all().await;

        let outcome = tokio::select! {
            outcome = auth_begun.wait() => outcome,
            outcome = all.wait() => outcome,
        };
        match outcome {
            SignalOutcome::Completed => Ok(()),
            SignalOutcome::Cancelled => Err(StreamError::SessionClosed),
            SignalOutcome::Failed(err) => Err(StreamError::NegotiationFailed(err.to_string())),
        }
    }

    /// Transition the status and enqueue its notification while the lock
    /// is held, so notification order is transition order.
    fn set_status(&self, status: &mut SessionStatus, next: SessionStatus) {
        debug!(session = %self.id, from = %*status, to = %next, "status transition");
        *status = next;
        self.notifier.notify(next);
    }

    fn settle_connect(&self, settle: impl FnOnce(CompletionSignal)) {
        if let Some(signal) = self
            .connect_signal
            .lock()
            .expect("connect signal lock poisoned")
            .take()
        {
            settle(signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;

    fn session() -> Session {
        let (transport, _events) = LocalTransport::new();
        Session::new(&Config::default(), Arc::new(transport))
    }

    #[tokio::test]
    async fn test_login_before_connect_fails_fast() {
        let session = session();
        let err = session
            .login(Credentials::new("alice", "secret"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::InvalidState {
                status: SessionStatus::Initial,
                operation: "login"
            }
        ));
    }

    #[tokio::test]
    async fn test_close_is_safe_on_fresh_session() {
        let session = session();
        session.close().await;
        assert_eq!(session.status(), SessionStatus::Closed);

        // And silent on an already-closed one.
        session.close().await;
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    #[tokio::test]
    async fn test_connect_after_close_fails_fast() {
        let session = session();
        session.close().await;

        let err = session.connect().await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::InvalidState {
                status: SessionStatus::Closed,
                operation: "connect"
            }
        ));
    }

    #[tokio::test]
    async fn test_await_feature_cancelled_by_close() {
        let session = session();
        let mut waiter = session.await_feature(&FeatureKind::Bind);
        session.close().await;
        assert!(matches!(waiter.wait().await, SignalOutcome::Cancelled));
    }
}
