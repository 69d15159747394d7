//! Generic protocol element.
//!
//! An [`Element`] is one node of the inbound or outbound stream: a name,
//! an optional namespace, attributes, character data, and child elements.
//! Negotiators match on these; the external stream layer turns them into
//! and out of wire XML.

use std::collections::BTreeMap;
use std::fmt;

/// One protocol element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    namespace: Option<String>,
    attributes: BTreeMap<String, String>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    /// Create an element with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Set the element namespace.
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Append a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Set character data.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Attribute value by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Character data, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Child elements.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First child with the given name and namespace.
    pub fn child_ns(&self, name: &str, ns: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|c| c.name == name && c.namespace.as_deref() == Some(ns))
    }

    /// Whether this element has the given name and namespace.
    pub fn is(&self, name: &str, ns: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(ns)
    }

    /// Whether this element belongs to the given namespace.
    pub fn in_namespace(&self, ns: &str) -> bool {
        self.namespace.as_deref() == Some(ns)
    }
}

impl fmt::Display for Element {
    /// Compact XML-ish rendering, for logs only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        if let Some(ns) = &self.namespace {
            write!(f, " xmlns='{ns}'")?;
        }
        for (k, v) in &self.attributes {
            write!(f, " {k}='{v}'")?;
        }
        if self.children.is_empty() && self.text.is_none() {
            return write!(f, "/>");
        }
        write!(f, ">")?;
        if let Some(text) = &self.text {
            write!(f, "{text}")?;
        }
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::ns;

    #[test]
    fn test_builder_and_accessors() {
        let el = Element::new("auth")
            .with_namespace(ns::SASL)
            .with_attribute("mechanism", "PLAIN")
            .with_text("AGFsaWNlAHNlY3JldA==");

        assert_eq!(el.name(), "auth");
        assert!(el.is("auth", ns::SASL));
        assert_eq!(el.attribute("mechanism"), Some("PLAIN"));
        assert_eq!(el.text(), Some("AGFsaWNlAHNlY3JldA=="));
        assert!(el.attribute("missing").is_none());
    }

    #[test]
    fn test_child_lookup_by_namespace() {
        let iq = Element::new("iq")
            .with_attribute("type", "result")
            .with_child(
                Element::new("bind")
                    .with_namespace(ns::BIND)
                    .with_child(Element::new("jid").with_text("alice@example.org/desk")),
            );

        let bind = iq.child_ns("bind", ns::BIND).unwrap();
        assert_eq!(
            bind.child("jid").and_then(Element::text),
            Some("alice@example.org/desk")
        );
        assert!(iq.child_ns("bind", ns::SESSION).is_none());
    }

    #[test]
    fn test_display_rendering() {
        let el = Element::new("starttls").with_namespace(ns::TLS);
        assert_eq!(
            el.to_string(),
            "<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>"
        );
    }
}
