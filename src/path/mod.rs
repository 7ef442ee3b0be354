//! Paths naming nodes by position.
//!
//! A path lists the steps from the document node down to a node:
//!
//! ```text
//! path  := '/' step ( '/' step )*
//! step  := name ( '[' index ']' )?
//! ```
//!
//! `name` is an element's qualified name as written, or `#text` for a text
//! node; `index` is the 1-based position among siblings with that name and
//! defaults to 1. Rendered paths carry an index only where a parent holds
//! more than one child of the same name, so `/r/a[2]` but `/r/b`.
//!
//! Paths are never stored. Inserting or removing a sibling shifts the
//! indices after it, so a path is only good for the tree it was made from.
//!
//! ```
//! use xmlgrove::Document;
//! use xmlgrove::path::path_of;
//!
//! let doc = Document::parse("<r><a>1</a><a>2</a><b/></r>", false).unwrap();
//! let second = doc.resolve("/r/a[2]").unwrap();
//! assert_eq!(doc.text_content(second), "2");
//! assert_eq!(path_of(&doc, second), "/r/a[2]");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, XmlError};
use crate::tree::{Document, NodeId, TEXT_NODE_NAME};

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Element name, or `#text`.
    pub name: String,
    /// Explicit 1-based occurrence index; `None` means the first.
    pub index: Option<usize>,
}

impl Step {
    /// Returns the 1-based occurrence this step selects.
    #[must_use]
    pub fn occurrence(&self) -> usize {
        self.index.unwrap_or(1)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(index) = self.index {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

/// A parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    steps: Vec<Step>,
}

impl Path {
    /// Returns the steps, outermost first.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Builds the path of `node` in `doc`.
    #[must_use]
    pub fn of(doc: &Document, node: NodeId) -> Self {
        let mut steps: Vec<Step> = doc
            .ancestors(node)
            .filter_map(|n| {
                let name = doc.step_name(n)?;
                let (position, total) = occurrence(doc, n);
                Some(Step {
                    name: name.to_string(),
                    index: (total > 1).then_some(position),
                })
            })
            .collect();
        steps.reverse();
        Self { steps }
    }

    /// Finds the node this path names.
    ///
    /// With `include_text` unset, `#text` steps never match.
    #[must_use]
    pub fn resolve(&self, doc: &Document, include_text: bool) -> Option<NodeId> {
        if self.steps.is_empty() {
            return None;
        }
        let mut at = doc.root();
        for step in &self.steps {
            if !include_text && step.name == TEXT_NODE_NAME {
                return None;
            }
            at = doc
                .children(at)
                .filter(|&child| doc.step_name(child) == Some(step.name.as_str()))
                .nth(step.occurrence() - 1)?;
        }
        Some(at)
    }
}

impl FromStr for Path {
    type Err = XmlError;

    /// Parses a path. Surrounding whitespace and one trailing `/` are
    /// ignored.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_suffix('/').unwrap_or(s);
        let body = s.strip_prefix('/').ok_or(XmlError::BadElement)?;
        let steps = body
            .split('/')
            .map(parse_step)
            .collect::<Option<Vec<_>>>()
            .ok_or(XmlError::BadElement)?;
        Ok(Self { steps })
    }
}

fn parse_step(text: &str) -> Option<Step> {
    let (name, index) = match text.split_once('[') {
        Some((name, rest)) => {
            let digits = rest.strip_suffix(']')?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let index: usize = digits.parse().ok().filter(|&i| i >= 1)?;
            (name, Some(index))
        }
        None => (text, None),
    };
    if name.is_empty() || name.contains(']') {
        return None;
    }
    Some(Step {
        name: name.to_string(),
        index,
    })
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

/// Returns the 1-based position of `node` among its parent's children of
/// the same step name, and how many such children there are.
#[must_use]
pub fn occurrence(doc: &Document, node: NodeId) -> (usize, usize) {
    let name = doc.step_name(node);
    let Some(parent) = doc.parent(node) else {
        return (1, 1);
    };
    let mut position = 0;
    let mut total = 0;
    for sibling in doc.children(parent) {
        if doc.step_name(sibling) == name {
            total += 1;
            if sibling == node {
                position = total;
            }
        }
    }
    (position, total)
}

/// Renders the path of `node`. The document node's path is empty.
#[must_use]
pub fn path_of(doc: &Document, node: NodeId) -> String {
    Path::of(doc, node).to_string()
}

/// Renders the path of `node` below `base`, without a leading `/`.
///
/// `node` must lie inside `base`'s subtree; for `base` itself the result
/// is empty.
#[must_use]
pub fn relative_path(doc: &Document, base: NodeId, node: NodeId) -> String {
    let full = Path::of(doc, node);
    let skip = Path::of(doc, base).steps.len();
    full.steps
        .iter()
        .skip(skip)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

impl Document {
    /// Finds the node a path names, text nodes included.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadElement`] if the path is malformed or names no
    /// node.
    pub fn resolve(&self, path: &str) -> Result<NodeId> {
        path.parse::<Path>()?
            .resolve(self, true)
            .ok_or(XmlError::BadElement)
    }

    /// Finds the element a path names; `#text` steps never match.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadElement`] if the path is malformed or names no
    /// element.
    pub fn resolve_element(&self, path: &str) -> Result<NodeId> {
        path.parse::<Path>()?
            .resolve(self, false)
            .ok_or(XmlError::BadElement)
    }

    /// Renders the path of a node.
    #[must_use]
    pub fn path_of(&self, node: NodeId) -> String {
        path_of(self, node)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Document {
        Document::parse("<r><a>1</a>mid<a>2<c/></a><b/><x:y xmlns:x='urn:x'/></r>", false).unwrap()
    }

    #[test]
    fn test_parse_steps() {
        let path: Path = " /r/a[2]/c/ ".parse().unwrap();
        assert_eq!(path.steps().len(), 3);
        assert_eq!(path.steps()[1].index, Some(2));
        assert_eq!(path.steps()[2].occurrence(), 1);
        assert_eq!(path.to_string(), "/r/a[2]/c");
    }

    #[test]
    fn test_malformed_paths() {
        for bad in ["", "/", "r/a", "/r//a", "/r/a[0]", "/r/a[]", "/r/a[x]", "/r/a[1", "/r/a]"] {
            assert_eq!(bad.parse::<Path>(), Err(XmlError::BadElement), "{bad:?}");
        }
    }

    #[test]
    fn test_resolve() {
        let doc = sample();
        let a2 = doc.resolve("/r/a[2]").unwrap();
        assert_eq!(doc.immediate_text(a2), "2");
        assert_eq!(doc.resolve("/r/a").unwrap(), doc.resolve("/r/a[1]").unwrap());
        assert!(doc.resolve("/r/a[2]/c").is_ok());
        assert!(doc.resolve("/r/x:y").is_ok());
        assert_eq!(doc.resolve("/r/a[3]"), Err(XmlError::BadElement));
        assert_eq!(doc.resolve("/q"), Err(XmlError::BadElement));
    }

    #[test]
    fn test_text_steps() {
        let doc = sample();
        let mid = doc.resolve("/r/#text").unwrap();
        assert_eq!(doc.node_text(mid), Some("mid"));
        assert_eq!(doc.resolve_element("/r/#text"), Err(XmlError::BadElement));
        let inner = doc.resolve("/r/a[2]/#text").unwrap();
        assert_eq!(path_of(&doc, inner), "/r/a[2]/#text");
    }

    #[test]
    fn test_render_indexes_only_when_ambiguous() {
        let doc = sample();
        let r = doc.root_element().unwrap();
        let rendered: Vec<String> = doc.children(r).map(|c| path_of(&doc, c)).collect();
        assert_eq!(rendered, vec!["/r/a[1]", "/r/#text", "/r/a[2]", "/r/b", "/r/x:y"]);
        assert_eq!(path_of(&doc, r), "/r");
        assert_eq!(path_of(&doc, doc.root()), "");
    }

    #[test]
    fn test_round_trip_every_node() {
        let doc = sample();
        for node in doc.descendants(doc.root()) {
            assert_eq!(doc.resolve(&path_of(&doc, node)), Ok(node));
        }
    }

    #[test]
    fn test_relative_path() {
        let doc = sample();
        let r = doc.root_element().unwrap();
        let c = doc.resolve("/r/a[2]/c").unwrap();
        assert_eq!(relative_path(&doc, r, c), "a[2]/c");
        assert_eq!(relative_path(&doc, r, r), "");
    }

    #[test]
    fn test_occurrence() {
        let doc = sample();
        let a2 = doc.resolve("/r/a[2]").unwrap();
        let b = doc.resolve("/r/b").unwrap();
        assert_eq!(occurrence(&doc, a2), (2, 2));
        assert_eq!(occurrence(&doc, b), (1, 1));
    }
}
