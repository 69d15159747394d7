//! Resource binding negotiator.
//!
//! Single iq round-trip: request a binding (optionally naming a preferred
//! resource), receive the server-assigned full address. The address lands
//! in a slot shared with the session so `bound_address()` can expose it.

use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

use super::{Begin, FeatureKind, FeatureNegotiator, Reaction, StreamFeature};
use crate::error::{Result, StreamError};
use crate::proto::{ns, Element};

/// Negotiator for the resource binding feature.
pub struct BindNegotiator {
    resource: Option<String>,
    bound: Arc<Mutex<Option<String>>>,
    request_id: Option<String>,
}

impl BindNegotiator {
    /// Create a negotiator. `resource` is the client's preference; the
    /// server may assign something else. The bound slot is shared with the
    /// session.
    pub fn new(resource: Option<String>, bound: Arc<Mutex<Option<String>>>) -> Self {
        Self {
            resource,
            bound,
            request_id: None,
        }
    }
}

impl FeatureNegotiator for BindNegotiator {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Bind
    }

    fn begin(&mut self, _feature: &StreamFeature) -> Result<Begin> {
        let id = Uuid::new_v4().to_string();
        self.request_id = Some(id.clone());

        let mut bind = Element::new("bind").with_namespace(ns::BIND);
        if let Some(resource) = &self.resource {
            bind = bind.with_child(Element::new("resource").with_text(resource.clone()));
        }
        Ok(Begin::Send(
            Element::new("iq")
                .with_attribute("type", "set")
                .with_attribute("id", id)
                .with_child(bind),
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
                let address = element
                    .child_ns("bind", ns::BIND)
                    .and_then(|bind| bind.child("jid"))
                    .and_then(Element::text)
                    .ok_or_else(|| {
                        StreamError::Protocol("bind result carried no address".into())
                    })?;
                debug!(address, "resource bound");
                *self.bound.lock().expect("bound address lock poisoned") =
                    Some(address.to_string());
                self.request_id = None;
                Ok(Reaction::succeeded())
            }
            Some("error") => Err(StreamError::NegotiationFailed(
                "server refused resource binding".into(),
            )),
            _ => Err(StreamError::Protocol(
                "unexpected iq type in bind response".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::NegotiationOutcome;

    fn result_for(request: &Element, jid: &str) -> Element {
        Element::new("iq")
            .with_attribute("type", "result")
            .with_attribute("id", request.attribute("id").unwrap())
            .with_child(
                Element::new("bind")
                    .with_namespace(ns::BIND)
                    .with_child(Element::new("jid").with_text(jid)),
            )
    }

    #[test]
    fn test_bind_records_assigned_address() {
        let bound = Arc::new(Mutex::new(None));
        let mut neg = BindNegotiator::new(Some("desk".into()), bound.clone());

        let Begin::Send(request) = neg.begin(&StreamFeature::new(FeatureKind::Bind)).unwrap()
        else {
            panic!("expected a bind request");
        };
        assert_eq!(
            request
                .child_ns("bind", ns::BIND)
                .and_then(|b| b.child("resource"))
                .and_then(Element::text),
            Some("desk")
        );

        let reaction = neg
            .handle(&result_for(&request, "alice@example.org/desk"))
            .unwrap();
        assert_eq!(reaction.outcome, NegotiationOutcome::Succeeded);
        assert_eq!(
            bound.lock().unwrap().as_deref(),
            Some("alice@example.org/desk")
        );
    }

    #[test]
    fn test_unrelated_iq_is_ignored() {
        let mut neg = BindNegotiator::new(None, Arc::new(Mutex::new(None)));
        let Begin::Send(_request) = neg.begin(&StreamFeature::new(FeatureKind::Bind)).unwrap()
        else {
            panic!("expected a bind request");
        };

        let unrelated = Element::new("iq")
            .with_attribute("type", "result")
            .with_attribute("id", "some-other-request");
        let reaction = neg.handle(&unrelated).unwrap();
        assert_eq!(reaction.outcome, NegotiationOutcome::Ignored);
    }

    #[test]
    fn test_error_result_fails_negotiation() {
        let mut neg = BindNegotiator::new(None, Arc::new(Mutex::new(None)));
        let Begin::Send(request) = neg.begin(&StreamFeature::new(FeatureKind::Bind)).unwrap()
        else {
            panic!("expected a bind request");
        };

        let error = Element::new("iq")
            .with_attribute("type", "error")
            .with_attribute("id", request.attribute("id").unwrap());
        assert!(neg.handle(&error).is_err());
    }
}
