//! Arena-based document tree.
//!
//! Every node of a [`Document`] lives in one `Vec` of slots owned by that
//! document and is addressed by a [`NodeId`]. Parent and sibling links are
//! plain ids, so the tree has no reference cycles and no per-node
//! allocation beyond the payload.
//!
//! # Handles
//!
//! A `NodeId` is a slot index plus the slot's generation. Removing a subtree
//! frees its slots and bumps their generation before they are reused, so an
//! id kept across a removal is detectably stale ([`Document::contains`])
//! rather than silently naming some newer node.
//!
//! Ids are only meaningful for the document that issued them. Moving a
//! subtree between documents goes through an owned [`Fragment`]: it is
//! copied out of one arena and grafted into the other, never shared.

mod node;

pub use node::{split_qname, Attribute, NamespaceDecl, NodeKind, TEXT_NODE_NAME};

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::ParseDiagnostic;

static NEXT_DOC_ID: AtomicU32 = AtomicU32::new(1);

/// Identifier of a document.
///
/// Ids come from a process-wide monotonic counter and are never handed
/// out twice, so an id stays dead once its document is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct DocId(NonZeroU32);

impl DocId {
    fn next() -> Self {
        loop {
            if let Some(raw) = NonZeroU32::new(NEXT_DOC_ID.fetch_add(1, Ordering::Relaxed)) {
                return Self(raw);
            }
        }
    }

    /// Returns the numeric form used on the wire.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Rebuilds an id from its numeric form; `0` is never an id.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handle to a node inside one document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: NonZeroU32,
    generation: u32,
}

impl NodeId {
    fn as_index(self) -> usize {
        self.index.get() as usize
    }
}

/// Storage for one node: its payload and its links.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// What the node is.
    pub kind: NodeKind,
    /// Parent node; `None` for the document node and for detached nodes.
    pub parent: Option<NodeId>,
    /// First child.
    pub first_child: Option<NodeId>,
    /// Last child, kept for O(1) append.
    pub last_child: Option<NodeId>,
    /// Next sibling.
    pub next_sibling: Option<NodeId>,
    /// Previous sibling.
    pub prev_sibling: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// How a document was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentConfig {
    /// Namespace declarations were processed (URIs resolved, `xmlns`
    /// kept apart from attributes).
    pub preserve_namespaces: bool,
    /// The parsed tree was kept.
    pub materialize_tree: bool,
    /// Parse events were forwarded to a callback handler.
    pub allow_callbacks: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            preserve_namespaces: true,
            materialize_tree: true,
            allow_callbacks: false,
        }
    }
}

/// A `<!DOCTYPE>` carried by a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctype {
    /// Declared root element name.
    pub name: String,
    /// `PUBLIC` identifier, if any.
    pub public_id: Option<String>,
    /// `SYSTEM` identifier, if any.
    pub system_id: Option<String>,
    /// Text of the internal subset between `[` and `]`, if any.
    pub internal_subset: Option<String>,
}

/// An element or text subtree detached from any arena.
///
/// Produced by [`Document::fragment`] and consumed by [`Document::graft`];
/// this is how nodes cross from one document to another. Nodes are kept
/// flat in document order, each with the position of its parent, so no
/// depth of nesting needs recursion to build, graft or drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Payload and parent position of every node; the root comes first.
    nodes: Vec<(NodeKind, Option<usize>)>,
}

impl Fragment {
    /// Payload of the fragment's root.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.nodes[0].0
    }

    /// Number of nodes in the fragment.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a fragment holds at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A document: one arena of nodes plus its build settings and error state.
///
/// # Examples
///
/// ```
/// use xmlgrove::tree::{Document, NodeKind};
///
/// let mut doc = Document::new();
/// let root = doc.create_element("catalog");
/// doc.append_child(doc.root(), root);
/// let item = doc.create_element("item");
/// doc.append_child(root, item);
/// assert_eq!(doc.root_element(), Some(root));
/// assert_eq!(doc.node_name(item), Some("item"));
/// ```
///
/// A clone is a new document: it takes its own [`DocId`] while node ids
/// keep naming the same nodes in both.
#[derive(Debug)]
pub struct Document {
    id: DocId,
    /// Index 0 is a permanently vacant placeholder so indices fit `NonZeroU32`.
    slots: Vec<Slot>,
    free: Vec<NonZeroU32>,
    live: usize,
    root: NodeId,
    /// XML version from the declaration.
    pub version: Option<String>,
    /// Encoding from the declaration.
    pub encoding: Option<String>,
    /// Standalone flag from the declaration.
    pub standalone: Option<bool>,
    /// How this document was built.
    pub config: DocumentConfig,
    /// The document type declaration, if any.
    pub doctype: Option<Doctype>,
    /// Problems reported while the text was parsed tolerantly.
    pub diagnostics: Vec<ParseDiagnostic>,
    last_error: Option<String>,
}

impl Document {
    /// Creates an empty document holding only the document node.
    ///
    /// The document takes the next unused [`DocId`].
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(64);
        slots.push(Slot {
            generation: 0,
            data: None,
        });
        slots.push(Slot {
            generation: 0,
            data: Some(NodeData::new(NodeKind::Document)),
        });
        let root = NodeId {
            index: NonZeroU32::MIN,
            generation: 0,
        };
        Self {
            id: DocId::next(),
            slots,
            free: Vec::new(),
            live: 1,
            root,
            version: None,
            encoding: None,
            standalone: None,
            config: DocumentConfig::default(),
            doctype: None,
            diagnostics: Vec::new(),
            last_error: None,
        }
    }

    /// Returns this document's id.
    #[must_use]
    pub fn id(&self) -> DocId {
        self.id
    }

    /// Returns the document node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the root element, the single element child of the document node.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root).find(|&id| self.is_element(id))
    }

    /// Returns the message of the last failed operation on this document.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn set_last_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub(crate) fn clear_last_error(&mut self) {
        self.last_error = None;
    }

    // --- Node access ---

    /// Returns `true` if `id` names a live node of this document.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the node data for `id`, or `None` if the handle is stale or
    /// out of range.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.slots
            .get(id.as_index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    /// Returns the node data for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale or was issued by another document.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        match self.get(id) {
            Some(data) => data,
            None => panic!("{id:?} is not a live node of document {}", self.id),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        let doc = self.id;
        match self
            .slots
            .get_mut(id.as_index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
        {
            Some(data) => data,
            None => panic!("{id:?} is not a live node of document {doc}"),
        }
    }

    /// Returns `true` if the node is an element.
    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element { .. })
    }

    /// Returns `true` if the node is a text node.
    #[must_use]
    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Text { .. })
    }

    /// Returns an element's qualified name; `None` for other nodes.
    #[must_use]
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the name a node is listed under: the element name, or
    /// [`TEXT_NODE_NAME`] for text. The document node has none.
    #[must_use]
    pub fn step_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { name, .. } => Some(name),
            NodeKind::Text { .. } => Some(TEXT_NODE_NAME),
            NodeKind::Document => None,
        }
    }

    /// Returns an element's namespace URI.
    #[must_use]
    pub fn node_namespace(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { namespace, .. } => namespace.as_deref(),
            _ => None,
        }
    }

    /// Returns the content of a text node.
    #[must_use]
    pub fn node_text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text { content } => Some(content),
            _ => None,
        }
    }

    /// Returns the text a node holds directly: its own content for a text
    /// node, the concatenated direct text children for an element.
    #[must_use]
    pub fn immediate_text(&self, id: NodeId) -> String {
        if let Some(text) = self.node_text(id) {
            return text.to_string();
        }
        self.children(id)
            .filter_map(|child| self.node_text(child))
            .collect()
    }

    /// Returns all text below a node in document order.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        std::iter::once(id)
            .chain(self.descendants(id))
            .filter_map(|n| self.node_text(n))
            .collect()
    }

    /// Returns an element's attributes; empty for other nodes.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Returns an element's attributes for modification.
    pub(crate) fn attributes_mut(&mut self, id: NodeId) -> Option<&mut Vec<Attribute>> {
        match &mut self.node_mut(id).kind {
            NodeKind::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    /// Returns the value of an attribute, matching the name exactly.
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns the namespace declarations made on an element.
    #[must_use]
    pub fn namespaces(&self, id: NodeId) -> &[NamespaceDecl] {
        match &self.node(id).kind {
            NodeKind::Element { namespaces, .. } => namespaces,
            _ => &[],
        }
    }

    // --- Navigation ---

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Returns the first child of a node.
    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    /// Returns the last child of a node.
    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    /// Returns the next sibling of a node.
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    /// Returns the previous sibling of a node.
    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    /// Iterates over the children of a node.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.node(id).first_child,
        }
    }

    /// Iterates over a node and then each of its ancestors up to the
    /// document node.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: Some(id),
        }
    }

    /// Iterates over everything below a node in document order.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            root: id,
            next: self.node(id).first_child,
        }
    }

    /// Returns `true` if `node` is `ancestor` or lies inside its subtree.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors(node).any(|n| n == ancestor)
    }

    /// Returns the node following `current` in document order without
    /// leaving the subtree of `root`.
    pub(crate) fn preorder_next(&self, current: NodeId, root: NodeId) -> Option<NodeId> {
        if let Some(child) = self.first_child(current) {
            return Some(child);
        }
        self.next_outside(current, root)
    }

    /// Like [`preorder_next`](Self::preorder_next) but never descends into
    /// `current`'s own children.
    pub(crate) fn next_outside(&self, current: NodeId, root: NodeId) -> Option<NodeId> {
        let mut at = current;
        loop {
            if at == root {
                return None;
            }
            if let Some(sibling) = self.next_sibling(at) {
                return Some(sibling);
            }
            at = self.parent(at)?;
        }
    }

    // --- Construction and linking ---

    /// Allocates a detached node, reusing a freed slot when one exists.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index.get() as usize];
            slot.data = Some(NodeData::new(kind));
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len())
            .ok()
            .and_then(NonZeroU32::new)
            .unwrap_or_else(|| panic!("document {} exceeded the node arena size", self.id));
        self.slots.push(Slot {
            generation: 0,
            data: Some(NodeData::new(kind)),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Allocates a detached element with no attributes.
    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.create_node(NodeKind::element(name))
    }

    /// Allocates a detached text node.
    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        self.create_node(NodeKind::text(content))
    }

    /// Appends `child` as the last child of `parent`.
    ///
    /// `child` must be detached.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none(), "child is still linked");
        let last = self.node(parent).last_child;
        {
            let node = self.node_mut(child);
            node.parent = Some(parent);
            node.prev_sibling = last;
            node.next_sibling = None;
        }
        match last {
            Some(last) => self.node_mut(last).next_sibling = Some(child),
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(parent).last_child = Some(child);
    }

    /// Inserts `child` as the first child of `parent`.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        match self.first_child(parent) {
            Some(first) => self.insert_before(first, child),
            None => self.append_child(parent, child),
        }
    }

    /// Inserts `child` immediately before `reference`, under the same parent.
    ///
    /// Does nothing if `reference` has no parent.
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none(), "child is still linked");
        let Some(parent) = self.parent(reference) else {
            return;
        };
        let prev = self.prev_sibling(reference);
        {
            let node = self.node_mut(child);
            node.parent = Some(parent);
            node.prev_sibling = prev;
            node.next_sibling = Some(reference);
        }
        match prev {
            Some(prev) => self.node_mut(prev).next_sibling = Some(child),
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(reference).prev_sibling = Some(child);
    }

    /// Inserts `child` immediately after `reference`, under the same parent.
    ///
    /// Does nothing if `reference` has no parent.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) {
        match (self.parent(reference), self.next_sibling(reference)) {
            (Some(_), Some(next)) => self.insert_before(next, child),
            (Some(parent), None) => self.append_child(parent, child),
            (None, _) => {}
        }
    }

    /// Unlinks a node from its parent and siblings, keeping its subtree.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        let prev = self.prev_sibling(id);
        let next = self.next_sibling(id);
        match prev {
            Some(p) => self.node_mut(p).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    /// Detaches a node and frees it together with its whole subtree.
    ///
    /// Every id inside the subtree becomes stale. The document node cannot
    /// be removed.
    pub fn remove_node(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        self.detach(id);
        let doomed: Vec<NodeId> = std::iter::once(id).chain(self.descendants(id)).collect();
        for node in doomed {
            let slot = &mut self.slots[node.as_index()];
            slot.data = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node.index);
            self.live -= 1;
        }
    }

    /// Removes every child of a node.
    pub fn clear_children(&mut self, id: NodeId) {
        while let Some(child) = self.first_child(id) {
            self.remove_node(child);
        }
    }

    /// Returns the number of live nodes, including the document node.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.live
    }

    // --- Subtree transfer ---

    /// Copies a node and everything below it out of the arena.
    #[must_use]
    pub fn fragment(&self, id: NodeId) -> Fragment {
        let mut nodes = vec![(self.node(id).kind.clone(), None)];
        let mut open = vec![(id, 0)];
        for node in self.descendants(id) {
            let parent = self.parent(node);
            while open.last().is_some_and(|&(at, _)| Some(at) != parent) {
                open.pop();
            }
            let parent_index = open.last().map(|&(_, index)| index);
            open.push((node, nodes.len()));
            nodes.push((self.node(node).kind.clone(), parent_index));
        }
        Fragment { nodes }
    }

    /// Builds a fragment into this arena and returns its detached root.
    ///
    /// Every node gets a fresh id.
    pub fn graft(&mut self, fragment: Fragment) -> NodeId {
        let mut created: Vec<NodeId> = Vec::with_capacity(fragment.nodes.len());
        for (kind, parent) in fragment.nodes {
            let id = self.create_node(kind);
            if let Some(parent) = parent {
                self.append_child(created[parent], id);
            }
            created.push(id);
        }
        created[0]
    }

    /// Deep-copies a subtree within this document; the copy is detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let fragment = self.fragment(id);
        self.graft(fragment)
    }
}

impl Clone for Document {
    fn clone(&self) -> Self {
        Self {
            id: DocId::next(),
            slots: self.slots.clone(),
            free: self.free.clone(),
            live: self.live,
            root: self.root,
            version: self.version.clone(),
            encoding: self.encoding.clone(),
            standalone: self.standalone,
            config: self.config,
            doctype: self.doctype.clone(),
            diagnostics: self.diagnostics.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// --- Iterators ---

/// Iterator over the children of a node.
pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.next_sibling(current);
        Some(current)
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

/// Pre-order iterator over the nodes below a root.
pub struct Descendants<'a> {
    doc: &'a Document,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.preorder_next(current, self.root);
        Some(current)
    }
}
