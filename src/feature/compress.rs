//! Stream compression negotiator.
//!
//! Single round: send `<compress/>` naming the configured method, expect
//! `<compressed/>` (restart the stream) or `<failure/>`. A well-formed
//! decline completes the feature without compression; the stream stays
//! usable either way.

use tracing::{debug, warn};

use super::{Begin, FeatureKind, FeatureNegotiator, Reaction, StreamFeature};
use crate::error::{Result, StreamError};
use crate::proto::{ns, Element};

/// Negotiator for the stream compression feature.
#[derive(Debug)]
pub struct CompressionNegotiator {
    method: String,
    sent: bool,
}

impl CompressionNegotiator {
    /// Create a negotiator offering the given compression method.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            sent: false,
        }
    }
}

impl Default for CompressionNegotiator {
    fn default() -> Self {
        Self::new("zlib")
    }
}

impl FeatureNegotiator for CompressionNegotiator {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Compression
    }

    fn begin(&mut self, _feature: &StreamFeature) -> Result<Begin> {
        self.sent = true;
        Ok(Begin::Send(
            Element::new("compress")
                .with_namespace(ns::COMPRESS)
                .with_child(Element::new("method").with_text(self.method.clone())),
        ))
    }

    fn handle(&mut self, element: &Element) -> Result<Reaction> {
        if !element.in_namespace(ns::COMPRESS) || !self.sent {
            return Ok(Reaction::ignored());
        }

        match element.name() {
            "compressed" => {
                debug!(method = %self.method, "compression accepted, stream restart required");
                Ok(Reaction::restart_required())
            }
            "failure" => {
                let condition = element
                    .children()
                    .first()
                    .map_or("unspecified", Element::name);
                warn!(condition, "server declined compression, continuing without");
                Ok(Reaction::succeeded())
            }
            other => Err(StreamError::Protocol(format!(
                "unexpected element <{other}> during compression negotiation"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::NegotiationOutcome;

    #[test]
    fn test_offers_configured_method() {
        let mut neg = CompressionNegotiator::new("lzw");
        let begin = neg
            .begin(&StreamFeature::new(FeatureKind::Compression))
            .unwrap();

        let Begin::Send(compress) = begin else {
            panic!("expected a compress element");
        };
        assert!(compress.is("compress", ns::COMPRESS));
        assert_eq!(
            compress.child("method").and_then(Element::text),
            Some("lzw")
        );
    }

    #[test]
    fn test_compressed_requires_restart() {
        let mut neg = CompressionNegotiator::default();
        neg.begin(&StreamFeature::new(FeatureKind::Compression))
            .unwrap();

        let reaction = neg
            .handle(&Element::new("compressed").with_namespace(ns::COMPRESS))
            .unwrap();
        assert_eq!(reaction.outcome, NegotiationOutcome::RestartRequired);
    }

    #[test]
    fn test_decline_completes_without_compression() {
        let mut neg = CompressionNegotiator::default();
        neg.begin(&StreamFeature::new(FeatureKind::Compression))
            .unwrap();

        let failure = Element::new("failure")
            .with_namespace(ns::COMPRESS)
            .with_child(Element::new("unsupported-method"));
        let reaction = neg.handle(&failure).unwrap();
        assert_eq!(reaction.outcome, NegotiationOutcome::Succeeded);
    }
}
