//! Attribute access.
//!
//! In a namespace-aware document `xmlns` and `xmlns:*` are not stored as
//! attributes; reading or writing them goes to the element's namespace
//! declarations instead, so they still round-trip.

use super::is_valid_name;
use crate::error::{Result, XmlError};
use crate::tree::{Attribute, Document, NamespaceDecl, NodeId, NodeKind};

/// Name of the synthetic entry [`Document::attribute_list`] adds for an
/// element's namespace URI.
pub const NAMESPACE_ENTRY: &str = "xmlns";

/// Splits `xmlns` / `xmlns:p` into the declared prefix.
fn declared_prefix(name: &str) -> Option<Option<&str>> {
    match name.strip_prefix("xmlns") {
        Some("") => Some(None),
        Some(rest) => rest.strip_prefix(':').map(Some),
        None => None,
    }
}

fn name_matches(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

impl Document {
    /// Returns the value of attribute `name` on `node`.
    ///
    /// With `case_sensitive` unset, names are compared ignoring ASCII case.
    #[must_use]
    pub fn get_attribute(&self, node: NodeId, name: &str, case_sensitive: bool) -> Option<&str> {
        if let Some(prefix) = self.namespace_attribute(name) {
            return self
                .namespaces(node)
                .iter()
                .find(|decl| decl.prefix.as_deref() == prefix)
                .map(|decl| decl.uri.as_str());
        }
        self.attributes(node)
            .iter()
            .find(|attr| name_matches(&attr.name, name, case_sensitive))
            .map(|attr| attr.value.as_str())
    }

    /// Sets attribute `name` on `node`. An existing attribute keeps its
    /// place in the order; a new one goes last.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadElement`] if `node` is not an element and
    /// [`XmlError::BadAttribute`] if `name` is not a valid attribute name.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        if !self.is_element(node) {
            return Err(XmlError::BadElement);
        }
        if !is_valid_name(name) {
            return Err(XmlError::BadAttribute);
        }
        if let Some(prefix) = self.namespace_attribute(name) {
            let prefix = prefix.map(str::to_string);
            if let NodeKind::Element { namespaces, .. } = &mut self.node_mut(node).kind {
                match namespaces.iter_mut().find(|decl| decl.prefix == prefix) {
                    Some(decl) => value.clone_into(&mut decl.uri),
                    None => namespaces.push(NamespaceDecl {
                        prefix,
                        uri: value.to_string(),
                    }),
                }
            }
            return Ok(());
        }
        let Some(attributes) = self.attributes_mut(node) else {
            return Err(XmlError::BadElement);
        };
        match attributes.iter_mut().find(|attr| attr.name == name) {
            Some(attr) => value.clone_into(&mut attr.value),
            None => attributes.push(Attribute::new(name, value)),
        }
        Ok(())
    }

    /// Removes attribute `name` from `node`, returning whether it existed.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> bool {
        if let Some(prefix) = self.namespace_attribute(name) {
            let prefix = prefix.map(str::to_string);
            if let NodeKind::Element { namespaces, .. } = &mut self.node_mut(node).kind {
                let before = namespaces.len();
                namespaces.retain(|decl| decl.prefix != prefix);
                return namespaces.len() != before;
            }
            return false;
        }
        let Some(attributes) = self.attributes_mut(node) else {
            return false;
        };
        let before = attributes.len();
        attributes.retain(|attr| attr.name != name);
        attributes.len() != before
    }

    /// Lists `node`'s attributes in order, followed by
    /// `("xmlns", uri)` when the element is in a namespace.
    #[must_use]
    pub fn attribute_list(&self, node: NodeId) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .attributes(node)
            .iter()
            .map(|attr| (attr.name.clone(), attr.value.clone()))
            .collect();
        if let Some(uri) = self.node_namespace(node) {
            list.push((NAMESPACE_ENTRY.to_string(), uri.to_string()));
        }
        list
    }

    /// Returns the declared prefix if `name` addresses a namespace
    /// declaration in this document.
    fn namespace_attribute<'n>(&self, name: &'n str) -> Option<Option<&'n str>> {
        if self.config.preserve_namespaces {
            declared_prefix(name)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use crate::error::XmlError;
    use crate::parser::{parse_str_with_options, ParseOptions};
    use crate::tree::Document;

    #[test]
    fn test_set_get_remove_round_trip() {
        let mut doc = Document::parse("<r/>", false).unwrap();
        let r = doc.root_element().unwrap();
        doc.set_attribute(r, "a", "v").unwrap();
        assert_eq!(doc.get_attribute(r, "a", true), Some("v"));
        assert!(doc.remove_attribute(r, "a"));
        assert_eq!(doc.get_attribute(r, "a", true), None);
        assert!(!doc.remove_attribute(r, "a"));
    }

    #[test]
    fn test_overwrite_keeps_order() {
        let mut doc = Document::parse("<r a='1' b='2' c='3'/>", false).unwrap();
        let r = doc.root_element().unwrap();
        doc.set_attribute(r, "b", "two").unwrap();
        doc.set_attribute(r, "d", "4").unwrap();
        let names: Vec<_> = doc.attribute_list(r).into_iter().map(|(n, v)| format!("{n}={v}")).collect();
        assert_eq!(names, vec!["a=1", "b=two", "c=3", "d=4"]);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let doc = Document::parse("<r Name='x'/>", false).unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(doc.get_attribute(r, "name", true), None);
        assert_eq!(doc.get_attribute(r, "name", false), Some("x"));
    }

    #[test]
    fn test_set_rejects_non_elements_and_bad_names() {
        let mut doc = Document::parse("<r>t</r>", false).unwrap();
        let r = doc.root_element().unwrap();
        let t = doc.first_child(r).unwrap();
        assert_eq!(doc.set_attribute(t, "a", "v"), Err(XmlError::BadElement));
        assert_eq!(doc.set_attribute(r, "", "v"), Err(XmlError::BadAttribute));
        assert_eq!(doc.set_attribute(r, "a b", "v"), Err(XmlError::BadAttribute));
    }

    #[test]
    fn test_namespace_entry_is_synthetic() {
        let doc = Document::parse("<r xmlns='urn:r' k='v'/>", false).unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(
            doc.attribute_list(r),
            vec![
                ("k".to_string(), "v".to_string()),
                ("xmlns".to_string(), "urn:r".to_string())
            ]
        );
        assert_eq!(doc.attributes(r).len(), 1);
    }

    #[test]
    fn test_namespace_declarations_round_trip() {
        let mut doc = Document::parse("<r/>", false).unwrap();
        let r = doc.root_element().unwrap();
        doc.set_attribute(r, "xmlns:p", "urn:p").unwrap();
        assert_eq!(doc.get_attribute(r, "xmlns:p", true), Some("urn:p"));
        assert!(doc.attributes(r).is_empty());
        assert_eq!(doc.serialize(r, false), "<r xmlns:p=\"urn:p\"/>");
        assert!(doc.remove_attribute(r, "xmlns:p"));
        assert_eq!(doc.get_attribute(r, "xmlns:p", true), None);
    }

    #[test]
    fn test_xmlns_is_ordinary_without_namespaces() {
        let options = ParseOptions::default().namespaces(false);
        let doc = parse_str_with_options("<r xmlns='urn:r'/>", &options).unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(doc.get_attribute(r, "xmlns", true), Some("urn:r"));
        assert_eq!(doc.attribute_list(r), vec![("xmlns".to_string(), "urn:r".to_string())]);
    }
}
