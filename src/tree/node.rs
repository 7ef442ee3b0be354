//! Node payload types.
//!
//! `NodeKind` carries what a node *is*; where it sits in the tree lives in
//! `NodeData`. A tree only ever holds elements and text below the single
//! document node.

/// Name used for text nodes wherever a node name is rendered.
///
/// `#` cannot start an XML name, so it never collides with an element.
pub const TEXT_NODE_NAME: &str = "#text";

/// The kind of a node and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node. Exactly one per `Document`, always the arena root.
    Document,

    /// An element, e.g. `<item id="1">`.
    Element {
        /// The qualified name as written, e.g. `soap:Body`.
        name: String,
        /// The namespace URI the element's prefix (or the default namespace)
        /// resolved to, when namespace processing was on.
        namespace: Option<String>,
        /// Ordinary attributes in document order, names unique.
        attributes: Vec<Attribute>,
        /// Namespace declarations made on this element.
        ///
        /// Only populated when namespace processing is on; otherwise
        /// `xmlns` attributes are kept in `attributes`.
        namespaces: Vec<NamespaceDecl>,
    },

    /// Character data with entity and character references expanded.
    Text {
        /// The decoded text.
        content: String,
    },
}

impl NodeKind {
    /// Builds an element payload with no attributes or namespace.
    #[must_use]
    pub fn element(name: impl Into<String>) -> Self {
        Self::Element {
            name: name.into(),
            namespace: None,
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    /// Builds a text payload.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }
}

/// An attribute on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The qualified name as written, e.g. `xml:lang`.
    pub name: String,
    /// The value with references expanded.
    pub value: String,
}

impl Attribute {
    /// Creates an attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A namespace declaration, `xmlns="uri"` or `xmlns:prefix="uri"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// The declared prefix; `None` for the default namespace.
    pub prefix: Option<String>,
    /// The namespace URI (may be empty to undeclare the default).
    pub uri: String,
}

impl NamespaceDecl {
    /// Returns the attribute name this declaration is written as.
    #[must_use]
    pub fn attribute_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        }
    }
}

/// Splits a qualified name into its prefix and local part.
///
/// Only the first colon separates; `a:b:c` has prefix `a`.
#[must_use]
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}
