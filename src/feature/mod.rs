//! Stream features and the negotiator capability.
//!
//! A stream feature is a capability the remote endpoint advertises once per
//! stream (or per restart). Features are negotiated strictly in the
//! protocol order; each recognized feature type has one negotiator bound to
//! it for the lifetime of the stream.

mod bind;
mod compress;
mod sasl;
mod session;
mod starttls;

pub use bind::BindNegotiator;
pub use compress::CompressionNegotiator;
pub use sasl::{Credentials, Plain, SaslMechanism, SaslNegotiator};
pub use session::SessionEstablishmentNegotiator;
pub use starttls::StartTlsNegotiator;

use crate::error::Result;
use crate::proto::Element;

/// Feature type identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Encryption upgrade (STARTTLS).
    StartTls,
    /// Authentication (SASL).
    Authentication,
    /// Stream compression.
    Compression,
    /// Resource binding.
    Bind,
    /// Legacy session establishment.
    Session,
    /// A feature this client does not recognize.
    Other(String),
}

impl FeatureKind {
    /// Position in the protocol negotiation order. Unrecognized kinds sort
    /// after every recognized one.
    fn rank(&self) -> u8 {
        match self {
            FeatureKind::StartTls => 0,
            FeatureKind::Authentication => 1,
            FeatureKind::Compression => 2,
            FeatureKind::Bind => 3,
            FeatureKind::Session => 4,
            FeatureKind::Other(_) => 5,
        }
    }
}

/// One advertised stream feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFeature {
    /// Feature type.
    pub kind: FeatureKind,
    /// Whether the stream is unusable until this feature completes.
    pub mandatory: bool,
    /// Whether completing this feature requires a stream restart.
    pub restart: bool,
}

impl StreamFeature {
    /// Create a feature with the restart flag the protocol prescribes for
    /// its kind: encryption upgrade and compression restart the stream.
    pub fn new(kind: FeatureKind) -> Self {
        let restart = matches!(kind, FeatureKind::StartTls | FeatureKind::Compression);
        Self {
            kind,
            mandatory: false,
            restart,
        }
    }

    /// Mark the feature mandatory-to-negotiate.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// Sort features into the protocol negotiation order.
///
/// The sort is stable, so unrecognized features keep their advertised
/// relative order behind all recognized ones.
pub fn negotiation_order(features: &mut [StreamFeature]) {
    features.sort_by_key(|f| f.kind.rank());
}

/// Result of offering one inbound element to one negotiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// The element does not belong to this negotiator.
    Ignored,
    /// Consumed; the feature's multi-step exchange continues.
    Incomplete,
    /// The feature finished negotiating.
    Succeeded,
    /// The feature finished and the stream must restart.
    RestartRequired,
}

/// A negotiator's reaction to an inbound element: an outcome plus an
/// optional reply element to send.
#[derive(Debug)]
pub struct Reaction {
    /// Dispatch outcome.
    pub outcome: NegotiationOutcome,
    /// Element to send back, if any.
    pub reply: Option<Element>,
}

impl Reaction {
    /// Element not owned by this negotiator.
    pub fn ignored() -> Self {
        Self {
            outcome: NegotiationOutcome::Ignored,
            reply: None,
        }
    }

    /// Exchange continues with the given reply.
    pub fn incomplete(reply: Element) -> Self {
        Self {
            outcome: NegotiationOutcome::Incomplete,
            reply: Some(reply),
        }
    }

    /// Feature completed.
    pub fn succeeded() -> Self {
        Self {
            outcome: NegotiationOutcome::Succeeded,
            reply: None,
        }
    }

    /// Feature completed; the stream must restart before anything else.
    pub fn restart_required() -> Self {
        Self {
            outcome: NegotiationOutcome::RestartRequired,
            reply: None,
        }
    }
}

/// How a negotiator opens its sub-protocol when its feature reaches the
/// head of the pending queue.
#[derive(Debug)]
pub enum Begin {
    /// Send the opening element and wait for the remote endpoint.
    Send(Element),
    /// Not ready to start yet (e.g. no credentials staged); the engine
    /// parks the queue until re-kicked.
    Deferred,
    /// Nothing to exchange; the feature is complete as advertised.
    Done,
}

/// One feature's sub-protocol driver.
///
/// A negotiator is bound to exactly one [`FeatureKind`], may retain
/// internal step state across elements, and is never invoked concurrently
/// for the same connection — the engine serializes all calls.
pub trait FeatureNegotiator: Send {
    /// The feature type this negotiator owns.
    fn kind(&self) -> FeatureKind;

    /// Open the sub-protocol for an advertised feature.
    fn begin(&mut self, feature: &StreamFeature) -> Result<Begin>;

    /// Offer one inbound element. Must return [`Reaction::ignored`] quickly
    /// for elements it does not own.
    fn handle(&mut self, element: &Element) -> Result<Reaction>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_order_is_protocol_order() {
        let mut features = vec![
            StreamFeature::new(FeatureKind::Compression),
            StreamFeature::new(FeatureKind::StartTls),
            StreamFeature::new(FeatureKind::Authentication),
            StreamFeature::new(FeatureKind::Bind),
            StreamFeature::new(FeatureKind::Session),
        ];
        negotiation_order(&mut features);

        let kinds: Vec<_> = features.iter().map(|f| f.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                FeatureKind::StartTls,
                FeatureKind::Authentication,
                FeatureKind::Compression,
                FeatureKind::Bind,
                FeatureKind::Session,
            ]
        );
    }

    #[test]
    fn test_unrecognized_features_sort_last_and_stay_stable() {
        let mut features = vec![
            StreamFeature::new(FeatureKind::Other("rosterver".into())),
            StreamFeature::new(FeatureKind::Bind),
            StreamFeature::new(FeatureKind::Other("csi".into())),
            StreamFeature::new(FeatureKind::StartTls),
        ];
        negotiation_order(&mut features);

        let kinds: Vec<_> = features.iter().map(|f| f.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                FeatureKind::StartTls,
                FeatureKind::Bind,
                FeatureKind::Other("rosterver".into()),
                FeatureKind::Other("csi".into()),
            ]
        );
    }

    #[test]
    fn test_restart_flag_defaults() {
        assert!(StreamFeature::new(FeatureKind::StartTls).restart);
        assert!(StreamFeature::new(FeatureKind::Compression).restart);
        assert!(!StreamFeature::new(FeatureKind::Authentication).restart);
        assert!(!StreamFeature::new(FeatureKind::Bind).restart);
        assert!(!StreamFeature::new(FeatureKind::Session).restart);
    }

    mod order_props {
        use super::*;
        use proptest::prelude::*;

        fn kind_strategy() -> impl Strategy<Value = FeatureKind> {
            prop_oneof![
                Just(FeatureKind::StartTls),
                Just(FeatureKind::Authentication),
                Just(FeatureKind::Compression),
                Just(FeatureKind::Bind),
                Just(FeatureKind::Session),
                "[a-z]{1,8}".prop_map(FeatureKind::Other),
            ]
        }

        proptest! {
            #[test]
            fn prop_order_is_total_and_stable(
                kinds in proptest::collection::vec(kind_strategy(), 0..12)
            ) {
                // Tag unrecognized kinds with their original position so
                // stability is observable.
                let mut features: Vec<StreamFeature> = kinds
                    .iter()
                    .enumerate()
                    .map(|(i, kind)| {
                        let kind = match kind {
                            FeatureKind::Other(name) => {
                                FeatureKind::Other(format!("{name}-{i}"))
                            }
                            recognized => recognized.clone(),
                        };
                        StreamFeature::new(kind)
                    })
                    .collect();
                let advertised_unrecognized: Vec<FeatureKind> = features
                    .iter()
                    .map(|f| f.kind.clone())
                    .filter(|k| matches!(k, FeatureKind::Other(_)))
                    .collect();

                negotiation_order(&mut features);

                for pair in features.windows(2) {
                    prop_assert!(pair[0].kind.rank() <= pair[1].kind.rank());
                }
                let sorted_unrecognized: Vec<FeatureKind> = features
                    .iter()
                    .map(|f| f.kind.clone())
                    .filter(|k| matches!(k, FeatureKind::Other(_)))
                    .collect();
                prop_assert_eq!(advertised_unrecognized, sorted_unrecognized);
            }
        }
    }
}
