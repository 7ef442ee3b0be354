//! Depth-bounded, filterable pre-order traversal.
//!
//! A [`TreeEnumerator`] walks the subtree below a start node in document
//! order. The start node itself is never yielded; its children are at
//! depth 1.
//!
//! The name filter is a view, not a prune: a non-matching element is not
//! yielded but its children are still visited. Text nodes are skipped
//! unless asked for.
//!
//! ```
//! use xmlgrove::Document;
//! use xmlgrove::enumerate::{DepthLimit, TreeEnumerator};
//!
//! let doc = Document::parse("<r><a><b/></a><b/></r>", false).unwrap();
//! let r = doc.root_element().unwrap();
//! let names: Vec<(&str, usize)> = TreeEnumerator::new(&doc, r, DepthLimit::Unbounded)
//!     .map(|(node, depth)| (doc.node_name(node).unwrap(), depth))
//!     .collect();
//! assert_eq!(names, vec![("a", 1), ("b", 2), ("b", 1)]);
//! ```

use crate::tree::{Document, NodeId};

/// How far below the start node an enumeration reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthLimit {
    /// The whole subtree.
    Unbounded,
    /// Nodes at most this many levels below the start.
    Levels(usize),
}

impl DepthLimit {
    /// Interprets a wire depth: negative is unbounded, `0` means direct
    /// children only (the same as `1`).
    #[must_use]
    pub fn from_wire(depth: i64) -> Self {
        match usize::try_from(depth) {
            Ok(0) => Self::Levels(1),
            Ok(levels) => Self::Levels(levels),
            Err(_) => Self::Unbounded,
        }
    }

    fn allows(self, depth: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Levels(max) => depth <= max,
        }
    }
}

/// A pre-order cursor over the subtree of one node.
///
/// The enumerator borrows its document, so the tree cannot change while it
/// is in use.
#[derive(Debug, Clone)]
pub struct TreeEnumerator<'a> {
    doc: &'a Document,
    start: NodeId,
    limit: DepthLimit,
    filter: Option<String>,
    include_text: bool,
    /// Position of the raw walk: the node last stepped to and its depth.
    cursor: Option<(NodeId, usize)>,
    exhausted: bool,
}

impl<'a> TreeEnumerator<'a> {
    /// Creates an enumerator over the subtree below `start`.
    #[must_use]
    pub fn new(doc: &'a Document, start: NodeId, limit: DepthLimit) -> Self {
        Self {
            doc,
            start,
            limit,
            filter: None,
            include_text: false,
            cursor: None,
            exhausted: false,
        }
    }

    /// Yields only elements named `name`; an empty name matches everything.
    #[must_use]
    pub fn filter(mut self, name: &str) -> Self {
        self.filter = (!name.is_empty()).then(|| name.to_string());
        self
    }

    /// Yields text nodes as well as elements.
    ///
    /// A name filter, when set, still applies to elements only.
    #[must_use]
    pub fn include_text(mut self, yes: bool) -> Self {
        self.include_text = yes;
        self
    }

    /// Moves to the next eligible node. Returns `false` once the subtree is
    /// exhausted.
    pub fn advance(&mut self) -> bool {
        while let Some((node, _)) = self.step() {
            if self.eligible(node) {
                return true;
            }
        }
        false
    }

    /// Returns the node the enumerator is on, if any.
    #[must_use]
    pub fn current(&self) -> Option<NodeId> {
        if self.exhausted {
            return None;
        }
        self.cursor.map(|(node, _)| node)
    }

    /// Returns the current node's depth below the start node, or `0` before
    /// the first advance and after the end.
    #[must_use]
    pub fn depth(&self) -> usize {
        match (self.exhausted, self.cursor) {
            (false, Some((_, depth))) => depth,
            _ => 0,
        }
    }

    fn eligible(&self, node: NodeId) -> bool {
        let doc = self.doc;
        if doc.is_text(node) {
            return self.include_text;
        }
        match &self.filter {
            Some(filter) => doc.node_name(node) == Some(filter.as_str()),
            None => true,
        }
    }

    /// Takes one raw pre-order step, ignoring eligibility.
    fn step(&mut self) -> Option<(NodeId, usize)> {
        if self.exhausted {
            return None;
        }
        let doc = self.doc;
        let next = match self.cursor {
            None => doc.first_child(self.start).map(|child| (child, 1)),
            Some((node, depth)) => {
                let child = doc
                    .first_child(node)
                    .filter(|_| self.limit.allows(depth + 1));
                match child {
                    Some(child) => Some((child, depth + 1)),
                    None => self.climb(node, depth),
                }
            }
        };
        match next {
            Some(_) => self.cursor = next,
            None => self.exhausted = true,
        }
        next
    }

    /// Finds the next sibling of `node` or of its nearest ancestor that has
    /// one, without leaving the start node's subtree.
    fn climb(&self, mut node: NodeId, mut depth: usize) -> Option<(NodeId, usize)> {
        let doc = self.doc;
        while node != self.start {
            if let Some(sibling) = doc.next_sibling(node) {
                return Some((sibling, depth));
            }
            node = doc.parent(node)?;
            depth -= 1;
        }
        None
    }
}

impl Iterator for TreeEnumerator<'_> {
    type Item = (NodeId, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.advance() {
            self.cursor
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;
    use crate::path::path_of;

    const XML: &str = "<r>t0<a>t1<b><c/></b></a><b>t2</b><a/></r>";

    fn walk(limit: DepthLimit, filter: &str, text: bool) -> Vec<(String, usize)> {
        let doc = Document::parse(XML, false).unwrap();
        let r = doc.root_element().unwrap();
        TreeEnumerator::new(&doc, r, limit)
            .filter(filter)
            .include_text(text)
            .map(|(node, depth)| (path_of(&doc, node), depth))
            .collect()
    }

    fn paths(items: &[(&str, usize)]) -> Vec<(String, usize)> {
        items.iter().map(|&(p, d)| (p.to_string(), d)).collect()
    }

    #[test]
    fn test_depth_limit_from_wire() {
        assert_eq!(DepthLimit::from_wire(-1), DepthLimit::Unbounded);
        assert_eq!(DepthLimit::from_wire(0), DepthLimit::Levels(1));
        assert_eq!(DepthLimit::from_wire(3), DepthLimit::Levels(3));
    }

    #[test]
    fn test_unbounded_is_full_preorder() {
        assert_eq!(
            walk(DepthLimit::Unbounded, "", false),
            paths(&[
                ("/r/a[1]", 1),
                ("/r/a[1]/b", 2),
                ("/r/a[1]/b/c", 3),
                ("/r/b", 1),
                ("/r/a[2]", 1)
            ])
        );
    }

    #[test]
    fn test_direct_children_only() {
        let expected = paths(&[("/r/a[1]", 1), ("/r/b", 1), ("/r/a[2]", 1)]);
        assert_eq!(walk(DepthLimit::from_wire(0), "", false), expected);
        assert_eq!(walk(DepthLimit::Levels(1), "", false), expected);
    }

    #[test]
    fn test_two_levels() {
        assert_eq!(
            walk(DepthLimit::Levels(2), "", false),
            paths(&[("/r/a[1]", 1), ("/r/a[1]/b", 2), ("/r/b", 1), ("/r/a[2]", 1)])
        );
    }

    #[test]
    fn test_filter_is_a_view_not_a_prune() {
        // c sits below a non-matching a and a matching b; both are walked.
        assert_eq!(
            walk(DepthLimit::Unbounded, "b", false),
            paths(&[("/r/a[1]/b", 2), ("/r/b", 1)])
        );
        assert_eq!(
            walk(DepthLimit::Unbounded, "c", false),
            paths(&[("/r/a[1]/b/c", 3)])
        );
    }

    #[test]
    fn test_include_text() {
        assert_eq!(
            walk(DepthLimit::Levels(2), "", true),
            paths(&[
                ("/r/#text", 1),
                ("/r/a[1]", 1),
                ("/r/a[1]/#text", 2),
                ("/r/a[1]/b", 2),
                ("/r/b", 1),
                ("/r/b/#text", 2),
                ("/r/a[2]", 1)
            ])
        );
    }

    #[test]
    fn test_repeatable() {
        let first = walk(DepthLimit::Unbounded, "", true);
        let second = walk(DepthLimit::Unbounded, "", true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_cursor_state() {
        let doc = Document::parse("<r><a/></r>", false).unwrap();
        let r = doc.root_element().unwrap();
        let mut e = TreeEnumerator::new(&doc, r, DepthLimit::Unbounded);
        assert_eq!((e.current(), e.depth()), (None, 0));
        assert!(e.advance());
        assert_eq!(e.current(), doc.first_child(r));
        assert_eq!(e.depth(), 1);
        assert!(!e.advance());
        assert_eq!((e.current(), e.depth()), (None, 0));
        assert!(!e.advance());
    }

    #[test]
    fn test_enumeration_of_a_leaf_is_empty() {
        let doc = Document::parse("<r><a/></r>", false).unwrap();
        let a = doc.resolve("/r/a").unwrap();
        assert_eq!(TreeEnumerator::new(&doc, a, DepthLimit::Unbounded).count(), 0);
    }

    #[test]
    fn test_stays_inside_start_subtree() {
        let doc = Document::parse("<r><a><x/></a><b/></r>", false).unwrap();
        let a = doc.resolve("/r/a").unwrap();
        let seen: Vec<_> = TreeEnumerator::new(&doc, a, DepthLimit::Unbounded).collect();
        assert_eq!(seen.len(), 1);
    }
}
