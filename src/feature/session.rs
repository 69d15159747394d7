//! Legacy session establishment negotiator.
//!
//! Single iq round-trip kept for servers that still advertise it. No
//! payload comes back; a `result` completes the feature.

use tracing::debug;
use uuid::Uuid;

use super::{Begin, FeatureKind, FeatureNegotiator, Reaction, StreamFeature};
use crate::error::{Result, StreamError};
use crate::proto::{ns, Element};

/// Negotiator for the legacy session establishment feature.
#[derive(Debug, Default)]
pub struct SessionEstablishmentNegotiator {
    request_id: Option<String>,
}

impl SessionEstablishmentNegotiator {
    /// Create a new negotiator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureNegotiator for SessionEstablishmentNegotiator {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Session
    }

    fn begin(&mut self, _feature: &StreamFeature) -> Result<Begin> {
        let id = Uuid::new_v4().to_string();
        self.request_id = Some(id.clone());
        Ok(Begin::Send(
            Element::new("iq")
                .with_attribute("type", "set")
                .with_attribute("id", id)
                .with_child(Element::new("session").with_namespace(ns::SESSION)),
        ))
    }

    fn handle(&mut self, element: &Element) -> Result<Reaction> {
        let Some(request_id) = &self.request_id else {
            return Ok(Reaction::ignored());
        };
        if element.name() != "iq" || element.attribute("id") != Some(request_id.as_str()) {
            return Ok(Reaction::ignored());
        }

        match element.attribute("type") {
            Some("result") => {
                debug!("legacy session established");
                self.request_id = None;
                Ok(Reaction::succeeded())
            }
            Some("error") => Err(StreamError::NegotiationFailed(
                "server refused session establishment".into(),
            )),
            _ => Err(StreamError::Protocol(
                "unexpected iq type in session response".into(),
            )),
        }
    }
}
