//! Encryption upgrade negotiator.
//!
//! Single round: send `<starttls/>`, expect `<proceed/>` or `<failure/>`.
//! Success always restarts the stream; the transport performs the actual
//! socket upgrade when asked to restart.

use tracing::debug;

use super::{Begin, FeatureKind, FeatureNegotiator, Reaction, StreamFeature};
use crate::error::{Result, StreamError};
use crate::proto::{ns, Element};

/// Negotiator for the encryption upgrade feature.
#[derive(Debug, Default)]
pub struct StartTlsNegotiator {
    sent: bool,
}

impl StartTlsNegotiator {
    /// Create a new negotiator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureNegotiator for StartTlsNegotiator {
    fn kind(&self) -> FeatureKind {
        FeatureKind::StartTls
    }

    fn begin(&mut self, _feature: &StreamFeature) -> Result<Begin> {
        self.sent = true;
        Ok(Begin::Send(Element::new("starttls").with_namespace(ns::TLS)))
    }

    fn handle(&mut self, element: &Element) -> Result<Reaction> {
        if !element.in_namespace(ns::TLS) {
            return Ok(Reaction::ignored());
        }

        match element.name() {
            "proceed" if self.sent => {
                debug!("encryption upgrade accepted, stream restart required");
                Ok(Reaction::restart_required())
            }
            "failure" => Err(StreamError::NegotiationFailed(
                "server refused encryption upgrade".into(),
            )),
            other => Err(StreamError::Protocol(format!(
                "unexpected element <{other}> during encryption upgrade"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::NegotiationOutcome;

    #[test]
    fn test_proceed_requires_restart() {
        let mut neg = StartTlsNegotiator::new();
        let begin = neg.begin(&StreamFeature::new(FeatureKind::StartTls)).unwrap();
        assert!(matches!(begin, Begin::Send(ref el) if el.is("starttls", ns::TLS)));

        let reaction = neg
            .handle(&Element::new("proceed").with_namespace(ns::TLS))
            .unwrap();
        assert_eq!(reaction.outcome, NegotiationOutcome::RestartRequired);
    }

    #[test]
    fn test_failure_is_fatal() {
        let mut neg = StartTlsNegotiator::new();
        neg.begin(&StreamFeature::new(FeatureKind::StartTls)).unwrap();

        let err = neg
            .handle(&Element::new("failure").with_namespace(ns::TLS))
            .unwrap_err();
        assert!(matches!(err, StreamError::NegotiationFailed(_)));
    }

    #[test]
    fn test_foreign_elements_are_ignored() {
        let mut neg = StartTlsNegotiator::new();
        let reaction = neg
            .handle(&Element::new("success").with_namespace(ns::SASL))
            .unwrap();
        assert_eq!(reaction.outcome, NegotiationOutcome::Ignored);
    }
}
