//! Shared test harness: a scripted remote endpoint driving a session over
//! the in-memory transport.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::mpsc;

use xstream::proto::ns;
use xstream::transport::TransportEvent;
use xstream::{Config, Element, FeatureKind, LocalTransport, Session, StreamFeature};

/// What the scripted remote endpoint offers and accepts.
pub struct RemoteScript {
    /// Advertise the encryption upgrade on the initial stream.
    pub offer_tls: bool,
    /// The password the remote accepts.
    pub accept_password: String,
}

impl Default for RemoteScript {
    fn default() -> Self {
        Self {
            offer_tls: true,
            accept_password: "secret".to_string(),
        }
    }
}

/// A session wired to a scripted remote endpoint.
pub struct Harness {
    pub session: Arc<Session>,
    /// Names of elements the session sent, in order.
    pub sent_log: Arc<Mutex<Vec<String>>>,
}

/// Install the test log subscriber once; `RUST_LOG` filters output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a session over a [`LocalTransport`] and spawn the scripted remote.
pub fn harness(config: &Config, script: RemoteScript) -> Harness {
    init_tracing();
    let (transport, events) = LocalTransport::new();
    let session = Arc::new(Session::new(config, Arc::new(transport)));
    let sent_log = Arc::new(Mutex::new(Vec::new()));
    spawn_remote(session.clone(), events, script, sent_log.clone());
    Harness { session, sent_log }
}

/// Default harness: TLS offered, password "secret" accepted.
pub fn default_harness() -> Harness {
    harness(&Config::default(), RemoteScript::default())
}

fn spawn_remote(
    session: Arc<Session>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    script: RemoteScript,
    sent_log: Arc<Mutex<Vec<String>>>,
) {
    tokio::spawn(async move {
        let mut tls_done = false;
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Opened => {
                    let features = if script.offer_tls {
                        // Deliberately advertised optional: a lone
                        // encryption offer must be treated as mandatory.
                        vec![StreamFeature::new(FeatureKind::StartTls)]
                    } else {
                        vec![
                            StreamFeature::new(FeatureKind::Authentication).mandatory(),
                            StreamFeature::new(FeatureKind::Bind).mandatory(),
                        ]
                    };
                    let _ = session.handle_features(features).await;
                }
                TransportEvent::Restarted => {
                    let features = if tls_done {
                        // Post-compression stream.
                        vec![
                            StreamFeature::new(FeatureKind::Bind).mandatory(),
                            StreamFeature::new(FeatureKind::Session),
                        ]
                    } else {
                        tls_done = true;
                        vec![
                            StreamFeature::new(FeatureKind::Authentication).mandatory(),
                            StreamFeature::new(FeatureKind::Compression),
                            StreamFeature::new(FeatureKind::Bind).mandatory(),
                            StreamFeature::new(FeatureKind::Session),
                        ]
                    };
                    let _ = session.handle_features(features).await;
                }
                TransportEvent::Sent(element) => {
                    sent_log
                        .lock()
                        .unwrap()
                        .push(element.name().to_string());
                    if let Some(reply) = reply_for(&element, &script.accept_password) {
                        let _ = session.handle_element(reply).await;
                    }
                }
                TransportEvent::Closed => break,
            }
        }
    });
}

fn reply_for(element: &Element, accept_password: &str) -> Option<Element> {
    if element.is("starttls", ns::TLS) {
        return Some(Element::new("proceed").with_namespace(ns::TLS));
    }

    if element.is("auth", ns::SASL) {
        let payload = BASE64.decode(element.text().unwrap_or_default()).ok()?;
        let mut parts = payload.split(|b| *b == 0);
        let _authzid = parts.next();
        let _username = parts.next();
        let password = parts.next().unwrap_or_default();
        return Some(if password == accept_password.as_bytes() {
            Element::new("success").with_namespace(ns::SASL)
        } else {
            Element::new("failure")
                .with_namespace(ns::SASL)
                .with_child(Element::new("not-authorized"))
        });
    }

    if element.is("compress", ns::COMPRESS) {
        return Some(Element::new("compressed").with_namespace(ns::COMPRESS));
    }

    if element.name() == "iq" {
        let id = element.attribute("id")?;
        if element.child_ns("bind", ns::BIND).is_some() {
            let resource = element
                .child_ns("bind", ns::BIND)
                .and_then(|b| b.child("resource"))
                .and_then(Element::text)
                .unwrap_or("generated");
            return Some(
                Element::new("iq")
                    .with_attribute("type", "result")
                    .with_attribute("id", id)
                    .with_child(
                        Element::new("bind").with_namespace(ns::BIND).with_child(
                            Element::new("jid")
                                .with_text(format!("alice@example.org/{resource}")),
                        ),
                    ),
            );
        }
        if element.child_ns("session", ns::SESSION).is_some() {
            return Some(
                Element::new("iq")
                    .with_attribute("type", "result")
                    .with_attribute("id", id),
            );
        }
    }

    None
}
