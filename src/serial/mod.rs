//! Serialization of documents and subtrees back to XML text.

pub mod xml;

pub use xml::{serialize, serialize_with_options, SerializeOptions};

use crate::tree::{Document, NodeId};

impl Document {
    /// Serializes `node` (the document node for the whole document) with
    /// default options, indenting when `pretty` is set.
    #[must_use]
    pub fn serialize(&self, node: NodeId, pretty: bool) -> String {
        serialize_with_options(self, node, &SerializeOptions::default().indent(pretty))
    }
}
