//! Protocol element model.
//!
//! The core exchanges opaque, already-parsed stream elements with the
//! transport layer. Wire-level XML parsing and serialization live outside
//! this crate; [`Element`] is the narrow interface between the two.

mod element;

pub use element::Element;

/// Well-known stream namespaces.
pub mod ns {
    /// Stream framing namespace.
    pub const STREAM: &str = "http://etherx.jabber.org/streams";
    /// Encryption upgrade (STARTTLS).
    pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";
    /// Authentication (SASL).
    pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
    /// Stream compression negotiation.
    pub const COMPRESS: &str = "http://jabber.org/protocol/compress";
    /// Stream compression feature advertisement.
    pub const COMPRESS_FEATURE: &str = "http://jabber.org/features/compress";
    /// Resource binding.
    pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
    /// Legacy session establishment.
    pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
    /// Default client content namespace.
    pub const CLIENT: &str = "jabber:client";
}
