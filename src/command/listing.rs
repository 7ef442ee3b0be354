//! Separator-joined listings over a subtree.
//!
//! Each builder walks with a [`TreeEnumerator`] and joins its items with
//! the caller's separator, so there is never a trailing separator.

use std::fmt::Write as _;

use crate::enumerate::{DepthLimit, TreeEnumerator};
use crate::path::{occurrence, path_of, relative_path};
use crate::tree::{Document, NodeId};

/// How [`child_text_list`] labels each element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    /// The bare name.
    NameOnly,
    /// The name with its occurrence index, always bracketed.
    NameWithIndex,
    /// The path below the start element.
    Relative,
    /// The full path.
    Full,
}

impl PathMode {
    /// Reads the wire form. `true` and `leaf` mean [`NameWithIndex`],
    /// `relative` and `full` the path modes; anything else, `false`
    /// included, is [`NameOnly`].
    ///
    /// [`NameWithIndex`]: Self::NameWithIndex
    /// [`NameOnly`]: Self::NameOnly
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        let starts = |prefix: &str| {
            value
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        };
        if starts("true") || starts("leaf") {
            Self::NameWithIndex
        } else if starts("relative") {
            Self::Relative
        } else if starts("full") {
            Self::Full
        } else {
            Self::NameOnly
        }
    }
}

/// Writes a node's listed name, with `[n]` when `indexed`.
fn push_label(out: &mut String, doc: &Document, node: NodeId, indexed: bool) {
    out.push_str(doc.step_name(node).unwrap_or_default());
    if indexed {
        let (position, _) = occurrence(doc, node);
        let _ = write!(out, "[{position}]");
    }
}

/// Pushes `sep` unless `out` is still empty of items.
fn separate(out: &mut String, first: &mut bool, sep: &str) {
    if *first {
        *first = false;
    } else {
        out.push_str(sep);
    }
}

/// Counts the elements below `start` named `filter` (any name when empty).
#[must_use]
pub fn child_count(doc: &Document, start: NodeId, filter: &str, limit: DepthLimit) -> usize {
    TreeEnumerator::new(doc, start, limit).filter(filter).count()
}

/// Lists the names of `start`'s direct children.
#[must_use]
pub fn child_names(
    doc: &Document,
    start: NodeId,
    sep: &str,
    filter: &str,
    indexed: bool,
    include_text: bool,
) -> String {
    let mut out = String::new();
    let mut first = true;
    let children = TreeEnumerator::new(doc, start, DepthLimit::Levels(1))
        .filter(filter)
        .include_text(include_text);
    for (node, _) in children {
        separate(&mut out, &mut first, sep);
        push_label(&mut out, doc, node, indexed);
    }
    out
}

/// Draws the element tree below `start`, one item per element, each
/// preceded by `pad` once per level. `start` itself comes first, unpadded.
#[must_use]
pub fn tree(
    doc: &Document,
    start: NodeId,
    sep: &str,
    pad: &str,
    indexed: bool,
    limit: DepthLimit,
) -> String {
    let mut out = String::new();
    push_label(&mut out, doc, start, indexed);
    for (node, depth) in TreeEnumerator::new(doc, start, limit) {
        out.push_str(sep);
        for _ in 0..depth {
            out.push_str(pad);
        }
        push_label(&mut out, doc, node, indexed);
    }
    out
}

/// Lists each element below `start` as a line of its label, `item_sep`
/// and its immediate text.
#[must_use]
pub fn child_text_list(
    doc: &Document,
    start: NodeId,
    item_sep: &str,
    line_sep: &str,
    mode: PathMode,
    limit: DepthLimit,
) -> String {
    let mut out = String::new();
    let mut first = true;
    for (node, _) in TreeEnumerator::new(doc, start, limit) {
        separate(&mut out, &mut first, line_sep);
        match mode {
            PathMode::NameOnly => push_label(&mut out, doc, node, false),
            PathMode::NameWithIndex => push_label(&mut out, doc, node, true),
            PathMode::Relative => out.push_str(&relative_path(doc, start, node)),
            PathMode::Full => out.push_str(&path_of(doc, node)),
        }
        out.push_str(item_sep);
        out.push_str(&doc.immediate_text(node));
    }
    out
}

/// Lists `start`'s attributes as `name item_sep value` lines.
#[must_use]
pub fn attribute_listing(doc: &Document, node: NodeId, item_sep: &str, line_sep: &str) -> String {
    let mut out = String::new();
    let mut first = true;
    for (name, value) in doc.attribute_list(node) {
        separate(&mut out, &mut first, line_sep);
        out.push_str(&name);
        out.push_str(item_sep);
        out.push_str(&value);
    }
    out
}

/// Lists the value of `attribute` on each element below `start` named
/// `filter`; an element without it contributes an empty item.
#[must_use]
pub fn attribute_values(
    doc: &Document,
    start: NodeId,
    filter: &str,
    attribute: &str,
    sep: &str,
    limit: DepthLimit,
) -> String {
    let mut out = String::new();
    let mut first = true;
    for (node, _) in TreeEnumerator::new(doc, start, limit).filter(filter) {
        separate(&mut out, &mut first, sep);
        out.push_str(doc.get_attribute(node, attribute, true).unwrap_or_default());
    }
    out
}

/// Finds the first element below `start` named `filter` whose `attribute`
/// equals `value`.
#[must_use]
pub fn find_by_attribute(
    doc: &Document,
    start: NodeId,
    filter: &str,
    attribute: &str,
    value: &str,
    limit: DepthLimit,
    case_sensitive: bool,
) -> Option<NodeId> {
    TreeEnumerator::new(doc, start, limit)
        .filter(filter)
        .map(|(node, _)| node)
        .find(|&node| {
            doc.get_attribute(node, attribute, true)
                .is_some_and(|found| {
                    if case_sensitive {
                        found == value
                    } else {
                        found.to_lowercase() == value.to_lowercase()
                    }
                })
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    const XML: &str = "<r><a id='1'>one<x/></a><b id='B'>two</b><a>three</a></r>";

    fn sample() -> (Document, NodeId) {
        let doc = Document::parse(XML, false).unwrap();
        let r = doc.root_element().unwrap();
        (doc, r)
    }

    #[test]
    fn test_path_mode_from_wire() {
        assert_eq!(PathMode::from_wire("TRUE"), PathMode::NameWithIndex);
        assert_eq!(PathMode::from_wire("leaf"), PathMode::NameWithIndex);
        assert_eq!(PathMode::from_wire("false"), PathMode::NameOnly);
        assert_eq!(PathMode::from_wire("Relative"), PathMode::Relative);
        assert_eq!(PathMode::from_wire("full"), PathMode::Full);
        assert_eq!(PathMode::from_wire(""), PathMode::NameOnly);
    }

    #[test]
    fn test_child_count() {
        let (doc, r) = sample();
        assert_eq!(child_count(&doc, r, "a", DepthLimit::from_wire(0)), 2);
        assert_eq!(child_count(&doc, r, "", DepthLimit::from_wire(0)), 3);
        assert_eq!(child_count(&doc, r, "", DepthLimit::Unbounded), 4);
    }

    #[test]
    fn test_child_names() {
        let (doc, r) = sample();
        assert_eq!(child_names(&doc, r, ",", "", false, false), "a,b,a");
        assert_eq!(child_names(&doc, r, ",", "", true, false), "a[1],b[1],a[2]");
        assert_eq!(child_names(&doc, r, "|", "a", false, false), "a|a");
        let a = doc.resolve("/r/a[1]").unwrap();
        assert_eq!(child_names(&doc, a, ",", "", false, true), "#text,x");
        assert_eq!(child_names(&doc, a, ",", "", false, false), "x");
    }

    #[test]
    fn test_tree() {
        let (doc, r) = sample();
        assert_eq!(
            tree(&doc, r, "\n", "\t", false, DepthLimit::Unbounded),
            "r\n\ta\n\t\tx\n\tb\n\ta"
        );
        assert_eq!(
            tree(&doc, r, ";", "-", true, DepthLimit::Levels(1)),
            "r[1];-a[1];-b[1];-a[2]"
        );
    }

    #[test]
    fn test_child_text_list_modes() {
        let (doc, r) = sample();
        let list = |mode| child_text_list(&doc, r, ",", "\n", mode, DepthLimit::Unbounded);
        assert_eq!(list(PathMode::NameOnly), "a,one\nx,\nb,two\na,three");
        assert_eq!(list(PathMode::NameWithIndex), "a[1],one\nx[1],\nb[1],two\na[2],three");
        assert_eq!(list(PathMode::Relative), "a[1],one\na[1]/x,\nb,two\na[2],three");
        assert_eq!(
            list(PathMode::Full),
            "/r/a[1],one\n/r/a[1]/x,\n/r/b,two\n/r/a[2],three"
        );
    }

    #[test]
    fn test_attribute_listing() {
        let doc = Document::parse("<r xmlns='urn:r' k='v' j='w'/>", false).unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(attribute_listing(&doc, r, "=", ";"), "k=v;j=w;xmlns=urn:r");
        let bare = Document::parse("<r/>", false).unwrap();
        assert_eq!(attribute_listing(&bare, bare.root_element().unwrap(), "=", ";"), "");
    }

    #[test]
    fn test_attribute_values() {
        let (doc, r) = sample();
        assert_eq!(attribute_values(&doc, r, "", "id", ",", DepthLimit::Unbounded), "1,,B,");
        assert_eq!(attribute_values(&doc, r, "a", "id", ",", DepthLimit::Unbounded), "1,");
    }

    #[test]
    fn test_find_by_attribute() {
        let (doc, r) = sample();
        let b = doc.resolve("/r/b").unwrap();
        let find = |value, case_sensitive| {
            find_by_attribute(&doc, r, "", "id", value, DepthLimit::Unbounded, case_sensitive)
        };
        assert_eq!(find("b", false), Some(b));
        assert_eq!(find("b", true), None);
        assert_eq!(find("B", true), Some(b));
        assert_eq!(find("", false), None);
        assert_eq!(
            find_by_attribute(&doc, r, "a", "id", "B", DepthLimit::Unbounded, false),
            None
        );
    }
}
