//! The table of live documents.
//!
//! A [`Registry`] owns every document it holds and hands out borrows by
//! [`DocId`]. Ids come from the documents themselves and are never reused,
//! so a freed id keeps failing lookups.

use std::collections::btree_map::{BTreeMap, Entry};

use crate::error::{Result, XmlError};
use crate::mutate::Trees;
use crate::tree::{DocId, Document};

/// Documents by id, iterated in id order.
#[derive(Debug, Default)]
pub struct Registry {
    docs: BTreeMap<DocId, Document>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `doc` and returns the id it is registered under.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadDocId`] if a document with the same id is
    /// already registered; the registered one is kept.
    pub fn add(&mut self, doc: Document) -> Result<DocId> {
        match self.docs.entry(doc.id()) {
            Entry::Occupied(_) => Err(XmlError::BadDocId),
            Entry::Vacant(slot) => {
                let id = *slot.key();
                slot.insert(doc);
                Ok(id)
            }
        }
    }

    /// Returns the document with this id.
    #[must_use]
    pub fn find(&self, id: DocId) -> Option<&Document> {
        self.docs.get(&id)
    }

    /// Returns the document with this id for modification.
    pub fn find_mut(&mut self, id: DocId) -> Option<&mut Document> {
        self.docs.get_mut(&id)
    }

    /// Like [`find`](Self::find), failing with [`XmlError::BadDocId`].
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadDocId`] if no document has this id.
    pub fn get(&self, id: DocId) -> Result<&Document> {
        self.find(id).ok_or(XmlError::BadDocId)
    }

    /// Like [`find_mut`](Self::find_mut), failing with [`XmlError::BadDocId`].
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadDocId`] if no document has this id.
    pub fn get_mut(&mut self, id: DocId) -> Result<&mut Document> {
        self.find_mut(id).ok_or(XmlError::BadDocId)
    }

    /// Borrows the source and destination of a transfer, which may be the
    /// same document.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadDocId`] if either id is unknown.
    pub fn pair_mut(&mut self, source: DocId, destination: DocId) -> Result<Trees<'_>> {
        if source == destination {
            return self.get_mut(source).map(Trees::Same);
        }
        let mut from = None;
        let mut to = None;
        for (id, doc) in &mut self.docs {
            if *id == source {
                from = Some(doc);
            } else if *id == destination {
                to = Some(doc);
            }
        }
        match (from, to) {
            (Some(source), Some(destination)) => Ok(Trees::Split {
                source,
                destination,
            }),
            _ => Err(XmlError::BadDocId),
        }
    }

    /// Drops the document with this id. Returns `false` if there was none.
    pub fn erase(&mut self, id: DocId) -> bool {
        self.docs.remove(&id).is_some()
    }

    /// Drops every document.
    pub fn clear(&mut self) {
        self.docs.clear();
    }

    /// Iterates over the live ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docs.keys().copied()
    }

    /// Returns the number of live documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns `true` if no document is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn parsed(xml: &str) -> Document {
        Document::parse(xml, false).unwrap()
    }

    #[test]
    fn test_add_find_erase() {
        let mut registry = Registry::new();
        let id = registry.add(parsed("<r/>")).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.find(id).is_some());
        assert!(registry.erase(id));
        assert!(registry.find(id).is_none());
        assert!(!registry.erase(id));
        assert_eq!(registry.get(id).err(), Some(XmlError::BadDocId));
    }

    #[test]
    fn test_ids_are_ordered_and_not_reused() {
        let mut registry = Registry::new();
        let a = registry.add(parsed("<a/>")).unwrap();
        let b = registry.add(parsed("<b/>")).unwrap();
        registry.erase(a);
        let c = registry.add(parsed("<c/>")).unwrap();
        assert!(c > b);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![b, c]);
    }

    #[test]
    fn test_clones_register_separately() {
        let mut registry = Registry::new();
        let original = parsed("<r/>");
        let copy = original.clone();
        let a = registry.add(original).unwrap();
        let b = registry.add(copy).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut registry = Registry::new();
        registry.add(parsed("<a/>")).unwrap();
        registry.add(parsed("<b/>")).unwrap();
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_pair_mut() {
        let mut registry = Registry::new();
        let a = registry.add(parsed("<a/>")).unwrap();
        let b = registry.add(parsed("<b/>")).unwrap();
        match registry.pair_mut(b, a).unwrap() {
            Trees::Split {
                source,
                destination,
            } => {
                assert_eq!(source.id(), b);
                assert_eq!(destination.id(), a);
            }
            Trees::Same(_) => panic!("expected two documents"),
        }
        assert!(matches!(registry.pair_mut(a, a), Ok(Trees::Same(_))));
        registry.erase(b);
        assert!(matches!(registry.pair_mut(a, b), Err(XmlError::BadDocId)));
    }
}
