//! Structural edits: adding, removing and relocating nodes.
//!
//! Every edit validates its arguments before touching the tree, so a
//! failed call leaves the document exactly as it was.
//!
//! Relocation works the same way inside one document and across two.
//! [`transfer`] takes the endpoints as [`Trees`]: within one arena a move
//! is a relink, while between arenas the subtree travels as an owned
//! [`Fragment`](crate::tree::Fragment) and the source copy is freed.
//!
//! ```
//! use xmlgrove::Document;
//! use xmlgrove::mutate::{ChildPosition, Placement};
//!
//! let mut doc = Document::parse("<r><a/><b/></r>", false).unwrap();
//! let r = doc.root_element().unwrap();
//! let c = doc.add_child(r, "c", "hi", ChildPosition::First).unwrap();
//! assert_eq!(doc.path_of(c), "/r/c");
//!
//! let b = doc.resolve("/r/b").unwrap();
//! let moved = doc.move_node(c, b, Placement::LastChild).unwrap();
//! assert_eq!(doc.path_of(moved), "/r/b/c");
//! ```

mod attributes;

use std::collections::HashMap;

use crate::error::{Result, XmlError};
use crate::parser::{parse_str_with_options, ParseOptions};
use crate::tree::{split_qname, Document, NamespaceDecl, NodeId, NodeKind};

/// Where [`Document::add_child`] puts the new element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildPosition {
    /// Before every existing child, text included.
    First,
    /// After every existing child, text included.
    #[default]
    Last,
    /// Immediately before the first element child; leading text stays in
    /// front. Same as `Last` when there is no element child.
    BeforeFirstChild,
    /// Immediately after the last element child; trailing text stays
    /// behind. Same as `Last` when there is no element child.
    AfterLastChild,
}

/// Where a moved or copied node lands relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// First child of the target.
    FirstChild,
    /// Last child of the target.
    LastChild,
    /// Sibling immediately before the target.
    Before,
    /// Sibling immediately after the target.
    After,
}

impl Placement {
    /// Combines the two wire flags.
    #[must_use]
    pub fn new(as_sibling: bool, before: bool) -> Self {
        match (as_sibling, before) {
            (false, true) => Self::FirstChild,
            (false, false) => Self::LastChild,
            (true, true) => Self::Before,
            (true, false) => Self::After,
        }
    }

    /// Returns `true` for the sibling placements.
    #[must_use]
    pub fn is_sibling(self) -> bool {
        matches!(self, Self::Before | Self::After)
    }
}

/// Whether [`transfer`] keeps the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Relocate the source subtree.
    Move,
    /// Place an independent deep copy; the source is untouched.
    Copy,
}

impl Transfer {
    fn failure(self) -> XmlError {
        match self {
            Self::Move => XmlError::BadMove,
            Self::Copy => XmlError::BadCopy,
        }
    }
}

/// The documents a [`transfer`] reads from and writes to.
#[derive(Debug)]
pub enum Trees<'a> {
    /// Source and destination are the same document.
    Same(&'a mut Document),
    /// Two distinct documents.
    Split {
        /// Holds the source node.
        source: &'a mut Document,
        /// Holds the target node.
        destination: &'a mut Document,
    },
}

/// Moves or copies `source` to `placement` relative to `target` and
/// returns the id of the placed node in the destination document.
///
/// A move within one document keeps the node's id; anything else yields a
/// fresh one.
///
/// # Errors
///
/// Returns [`XmlError::BadMove`] (for [`Transfer::Move`]) or
/// [`XmlError::BadCopy`] (for [`Transfer::Copy`]) when the source is the
/// document node, when the target cannot take the placement (a child of a
/// text node, a sibling of the root element), or when a move would put a
/// node inside its own subtree. Nothing is changed on failure.
///
/// A copy is taken before it is placed, so copying a node into its own
/// subtree is allowed. Namespace prefixes the subtree uses but inherits
/// from above are declared again on the placed node wherever the new
/// position binds them differently.
pub fn transfer(
    trees: Trees<'_>,
    source: NodeId,
    target: NodeId,
    placement: Placement,
    mode: Transfer,
) -> Result<NodeId> {
    match trees {
        Trees::Same(doc) => {
            if doc.parent(source).is_none() || !accepts(doc, target, placement) {
                return Err(mode.failure());
            }
            if mode == Transfer::Move && doc.is_ancestor_or_self(source, target) {
                return Err(XmlError::BadMove);
            }
            let inherited = inherited_namespaces(doc, source);
            let node = match mode {
                Transfer::Move => {
                    doc.detach(source);
                    source
                }
                Transfer::Copy => doc.clone_subtree(source),
            };
            doc.place(node, target, placement);
            doc.restate_namespaces(node, inherited);
            Ok(node)
        }
        Trees::Split {
            source: from,
            destination: to,
        } => {
            if from.parent(source).is_none() || !accepts(to, target, placement) {
                return Err(mode.failure());
            }
            let inherited = inherited_namespaces(from, source);
            let node = to.graft(from.fragment(source));
            to.place(node, target, placement);
            to.restate_namespaces(node, inherited);
            if mode == Transfer::Move {
                from.remove_node(source);
            }
            Ok(node)
        }
    }
}

/// Collects the bindings `node`'s subtree relies on without declaring
/// them itself: prefixes of element and attribute names, and the default
/// namespace of unprefixed elements. An unprefixed element outside any
/// namespace records the default as unbound (an empty URI).
fn inherited_namespaces(doc: &Document, node: NodeId) -> Vec<NamespaceDecl> {
    let mut needed: Vec<NamespaceDecl> = Vec::new();
    let Some(outer) = doc.parent(node) else {
        return needed;
    };
    if !doc.config.preserve_namespaces {
        return needed;
    }
    // Declarations made inside the subtree on the way down to the current
    // node, counted per prefix.
    let mut declared: HashMap<Option<&str>, usize> = HashMap::new();
    let mut open: Vec<NodeId> = Vec::new();
    for id in std::iter::once(node).chain(doc.descendants(node)) {
        let parent = doc.parent(id);
        while open.last().is_some_and(|&at| Some(at) != parent) {
            if let Some(closed) = open.pop() {
                for decl in doc.namespaces(closed) {
                    if let Some(count) = declared.get_mut(&decl.prefix.as_deref()) {
                        *count -= 1;
                    }
                }
            }
        }
        open.push(id);
        for decl in doc.namespaces(id) {
            *declared.entry(decl.prefix.as_deref()).or_default() += 1;
        }

        let NodeKind::Element {
            name,
            namespace,
            attributes,
            ..
        } = &doc.node(id).kind
        else {
            continue;
        };
        let (element_prefix, _) = split_qname(name);
        let attribute_prefixes = attributes
            .iter()
            .filter_map(|attr| split_qname(&attr.name).0)
            .map(Some);
        for prefix in std::iter::once(element_prefix).chain(attribute_prefixes) {
            if prefix == Some("xml")
                || declared.get(&prefix).is_some_and(|&count| count > 0)
                || needed.iter().any(|decl| decl.prefix.as_deref() == prefix)
            {
                continue;
            }
            let uri = match prefix {
                None => namespace.as_deref().unwrap_or_default(),
                Some(_) => match doc.lookup_namespace(outer, prefix) {
                    Some(uri) => uri,
                    None => continue,
                },
            };
            needed.push(NamespaceDecl {
                prefix: prefix.map(str::to_string),
                uri: uri.to_string(),
            });
        }
    }
    needed
}

/// Returns `true` if `placement` relative to `target` keeps the tree a
/// tree: children go into elements, siblings go next to a node whose
/// parent is an element.
fn accepts(doc: &Document, target: NodeId, placement: Placement) -> bool {
    if placement.is_sibling() {
        doc.parent(target).is_some_and(|parent| doc.is_element(parent))
    } else {
        doc.is_element(target)
    }
}

/// Returns `true` if `name` can be written as an element or attribute
/// name and used as a path step.
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let starts = first.is_alphabetic() || first == '_' || first == ':';
    starts
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.' | '\u{B7}'))
}

impl Document {
    /// Creates an element named `name` holding `value` as text and inserts
    /// it under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadElement`] if `parent` is not an element or
    /// `name` is not a valid element name.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: &str,
        value: &str,
        position: ChildPosition,
    ) -> Result<NodeId> {
        if !self.is_element(parent) || !is_valid_name(name) {
            return Err(XmlError::BadElement);
        }
        let node = self.new_element(parent, name, value);
        let first_element = self.children(parent).find(|&c| self.is_element(c));
        let last_element = self.children(parent).filter(|&c| self.is_element(c)).last();
        match (position, first_element, last_element) {
            (ChildPosition::First, ..) => self.prepend_child(parent, node),
            (ChildPosition::BeforeFirstChild, Some(first), _) => self.insert_before(first, node),
            (ChildPosition::AfterLastChild, _, Some(last)) => self.insert_after(last, node),
            _ => self.append_child(parent, node),
        }
        Ok(node)
    }

    /// Creates an element named `name` holding `value` as text and inserts
    /// it next to `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadElement`] if `anchor` has no element parent
    /// (it is the document node or the root element) or `name` is invalid.
    pub fn add_sibling(
        &mut self,
        anchor: NodeId,
        name: &str,
        value: &str,
        before: bool,
    ) -> Result<NodeId> {
        let parent = self
            .parent(anchor)
            .filter(|&parent| self.is_element(parent))
            .ok_or(XmlError::BadElement)?;
        if !is_valid_name(name) {
            return Err(XmlError::BadElement);
        }
        let node = self.new_element(parent, name, value);
        if before {
            self.insert_before(anchor, node);
        } else {
            self.insert_after(anchor, node);
        }
        Ok(node)
    }

    /// Detaches a node and frees its subtree.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadElement`] for the document node.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        if node == self.root() {
            return Err(XmlError::BadElement);
        }
        self.remove_node(node);
        Ok(())
    }

    /// Replaces the text held by `node`.
    ///
    /// Without `preserve_children` every child is dropped and `text`
    /// becomes the only one. With it, only direct text children are
    /// dropped and `text` becomes the new first child; element children
    /// stay where they are. `text` is stored as given and escaped on
    /// output. A text node simply takes the new content.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadElement`] for the document node.
    pub fn set_content(&mut self, node: NodeId, text: &str, preserve_children: bool) -> Result<()> {
        if let NodeKind::Text { content } = &mut self.node_mut(node).kind {
            text.clone_into(content);
            return Ok(());
        }
        if !self.is_element(node) {
            return Err(XmlError::BadElement);
        }
        if preserve_children {
            let texts: Vec<NodeId> = self.children(node).filter(|&c| self.is_text(c)).collect();
            for child in texts {
                self.remove_node(child);
            }
        } else {
            self.clear_children(node);
        }
        if !text.is_empty() {
            let child = self.create_text(text);
            self.prepend_child(node, child);
        }
        Ok(())
    }

    /// Moves a node within this document.
    ///
    /// # Errors
    ///
    /// See [`transfer`]; the failure is [`XmlError::BadMove`].
    pub fn move_node(&mut self, source: NodeId, target: NodeId, placement: Placement) -> Result<NodeId> {
        transfer(Trees::Same(self), source, target, placement, Transfer::Move)
    }

    /// Places a deep copy of a node within this document.
    ///
    /// # Errors
    ///
    /// See [`transfer`]; the failure is [`XmlError::BadCopy`].
    pub fn copy_node(&mut self, source: NodeId, target: NodeId, placement: Placement) -> Result<NodeId> {
        transfer(Trees::Same(self), source, target, placement, Transfer::Copy)
    }

    /// Parses `xml` as a document of its own and appends its root element
    /// as the last child of `parent`.
    ///
    /// Namespace processing follows this document's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadElement`] if `parent` is not an element and
    /// [`XmlError::BadXml`] if `xml` does not parse.
    pub fn append_xml(&mut self, parent: NodeId, xml: &str) -> Result<NodeId> {
        if !self.is_element(parent) {
            return Err(XmlError::BadElement);
        }
        let options = ParseOptions::default().namespaces(self.config.preserve_namespaces);
        let parsed = parse_str_with_options(xml, &options)?;
        let root = parsed.root_element().ok_or(XmlError::BadElement)?;
        let node = self.graft(parsed.fragment(root));
        self.append_child(parent, node);
        Ok(node)
    }

    /// Returns the namespace URI bound to `prefix` (`None` for the default
    /// namespace) at `node`, looking at `node` and then its ancestors.
    #[must_use]
    pub fn lookup_namespace(&self, node: NodeId, prefix: Option<&str>) -> Option<&str> {
        self.ancestors(node).find_map(|n| {
            self.namespaces(n)
                .iter()
                .find(|decl| decl.prefix.as_deref() == prefix)
                .map(|decl| decl.uri.as_str())
        })
    }

    /// Declares on `node` each binding from `inherited` that its new
    /// position does not already provide.
    fn restate_namespaces(&mut self, node: NodeId, inherited: Vec<NamespaceDecl>) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        let missing: Vec<NamespaceDecl> = inherited
            .into_iter()
            .filter(|decl| {
                let bound = self.lookup_namespace(parent, decl.prefix.as_deref());
                bound.unwrap_or_default() != decl.uri
            })
            .collect();
        if missing.is_empty() {
            return;
        }
        if let NodeKind::Element { namespaces, .. } = &mut self.node_mut(node).kind {
            namespaces.extend(missing);
        }
    }

    /// Builds a detached element for insertion under `parent`, resolving
    /// its namespace there when this document tracks namespaces.
    fn new_element(&mut self, parent: NodeId, name: &str, value: &str) -> NodeId {
        let namespace = if self.config.preserve_namespaces {
            let (prefix, _) = split_qname(name);
            self.lookup_namespace(parent, prefix)
                .filter(|uri| !uri.is_empty())
                .map(str::to_string)
        } else {
            None
        };
        let node = self.create_node(NodeKind::Element {
            name: name.to_string(),
            namespace,
            attributes: Vec::new(),
            namespaces: Vec::new(),
        });
        if !value.is_empty() {
            let text = self.create_text(value);
            self.append_child(node, text);
        }
        node
    }

    /// Links a detached node per `placement`; the target was checked by
    /// [`accepts`].
    fn place(&mut self, node: NodeId, target: NodeId, placement: Placement) {
        match placement {
            Placement::FirstChild => self.prepend_child(target, node),
            Placement::LastChild => self.append_child(target, node),
            Placement::Before => self.insert_before(target, node),
            Placement::After => self.insert_after(target, node),
        }
    }
}
