//! Authentication negotiator.
//!
//! Multi-round challenge/response. The byte-level mechanism logic lives
//! behind [`SaslMechanism`]; this module drives the element exchange:
//! `<auth/>` out, then any number of `<challenge/>`/`<response/>` rounds,
//! ending in `<success/>` or `<failure/>`.
//!
//! Credentials arrive through a slot shared with the session: `login()`
//! stages them, then re-kicks the engine. Until then the negotiator defers
//! so connection establishment can finish ahead of authentication.

use std::fmt;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

use super::{Begin, FeatureKind, FeatureNegotiator, Reaction, StreamFeature};
use crate::error::{Result, StreamError};
use crate::proto::{ns, Element};

/// Upper bound on challenge rounds before the exchange is declared broken.
const MAX_ROUNDS: u32 = 10;

/// Authentication credentials.
#[derive(Clone)]
pub struct Credentials {
    /// Account name (localpart).
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One authentication mechanism's byte-level logic.
pub trait SaslMechanism: Send {
    /// Mechanism name as advertised on the wire.
    fn name(&self) -> &'static str;

    /// Initial response sent with `<auth/>`, if the mechanism has one.
    fn initial_response(&mut self, credentials: &Credentials) -> Result<Option<Vec<u8>>>;

    /// Response to a server challenge.
    fn respond(&mut self, challenge: &[u8], credentials: &Credentials) -> Result<Vec<u8>>;
}

/// The PLAIN mechanism: single initial response, no challenges.
#[derive(Debug, Default)]
pub struct Plain;

impl SaslMechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn initial_response(&mut self, credentials: &Credentials) -> Result<Option<Vec<u8>>> {
        let mut payload = Vec::with_capacity(
            credentials.username.len() + credentials.password.len() + 2,
        );
        payload.push(0);
        payload.extend_from_slice(credentials.username.as_bytes());
        payload.push(0);
        payload.extend_from_slice(credentials.password.as_bytes());
        Ok(Some(payload))
    }

    fn respond(&mut self, _challenge: &[u8], _credentials: &Credentials) -> Result<Vec<u8>> {
        Err(StreamError::Protocol(
            "PLAIN mechanism received an unexpected challenge".into(),
        ))
    }
}

/// Negotiator for the authentication feature.
pub struct SaslNegotiator {
    mechanism: Box<dyn SaslMechanism>,
    credentials: Arc<Mutex<Option<Credentials>>>,
    in_progress: bool,
    rounds: u32,
}

impl SaslNegotiator {
    /// Create a negotiator over the given mechanism. The credentials slot
    /// is shared with the session, which fills it on `login()`.
    pub fn new(
        mechanism: Box<dyn SaslMechanism>,
        credentials: Arc<Mutex<Option<Credentials>>>,
    ) -> Self {
        Self {
            mechanism,
            credentials,
            in_progress: false,
            rounds: 0,
        }
    }

    fn staged_credentials(&self) -> Option<Credentials> {
        self.credentials.lock().expect("credentials lock poisoned").clone()
    }
}

impl FeatureNegotiator for SaslNegotiator {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Authentication
    }

    fn begin(&mut self, _feature: &StreamFeature) -> Result<Begin> {
        let Some(credentials) = self.staged_credentials() else {
            debug!("authentication advertised, waiting for credentials");
            return Ok(Begin::Deferred);
        };

        self.in_progress = true;
        self.rounds = 0;

        let mut auth = Element::new("auth")
            .with_namespace(ns::SASL)
            .with_attribute("mechanism", self.mechanism.name());
        if let Some(initial) = self.mechanism.initial_response(&credentials)? {
            auth = auth.with_text(BASE64.encode(initial));
        }
        Ok(Begin::Send(auth))
    }

    fn handle(&mut self, element: &Element) -> Result<Reaction> {
        if !element.in_namespace(ns::SASL) || !self.in_progress {
            return Ok(Reaction::ignored());
        }

        match element.name() {
            "challenge" => {
                self.rounds += 1;
                if self.rounds > MAX_ROUNDS {
                    return Err(StreamError::Protocol(format!(
                        "authentication exceeded {MAX_ROUNDS} challenge rounds"
                    )));
                }
                let credentials = self.staged_credentials().ok_or_else(|| {
                    StreamError::Protocol("challenge received with no credentials staged".into())
                })?;
                let challenge = BASE64
                    .decode(element.text().unwrap_or_default())
                    .map_err(|e| StreamError::Protocol(format!("bad challenge payload: {e}")))?;
                let response = self.mechanism.respond(&challenge, &credentials)?;
                debug!(round = self.rounds, "answering authentication challenge");
                Ok(Reaction::incomplete(
                    Element::new("response")
                        .with_namespace(ns::SASL)
                        .with_text(BASE64.encode(response)),
                ))
            }
            "success" => {
                self.in_progress = false;
                debug!(rounds = self.rounds, "authentication accepted");
                Ok(Reaction::succeeded())
            }
            "failure" => {
                self.in_progress = false;
                let condition = element
                    .children()
                    .first()
                    .map_or("not-authorized", Element::name);
                Err(StreamError::AuthenticationFailed(condition.to_string()))
            }
            other => Err(StreamError::Protocol(format!(
                "unexpected element <{other}> during authentication"
            ))),
        }
    }
}
