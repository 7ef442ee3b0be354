//! # xmlgrove
//!
//! A registry of mutable XML document trees addressed by path.
//!
//! Documents are parsed into per-document node arenas, looked up by id in a
//! [`Registry`], and navigated and edited through positional paths such as
//! `/catalog/item[2]/name`. Subtrees can be moved or copied within one
//! document or between two. The [`command`] module puts a string-typed
//! operation surface over all of it for scripting hosts.
//!
//! ## Quick Start
//!
//! ```
//! use xmlgrove::{ChildPosition, Document};
//!
//! let mut doc = Document::parse("<catalog><item>a</item></catalog>", false).unwrap();
//! let root = doc.root_element().unwrap();
//! let added = doc.add_child(root, "item", "b", ChildPosition::Last).unwrap();
//! assert_eq!(doc.path_of(added), "/catalog/item[2]");
//!
//! let first = doc.resolve("/catalog/item[1]").unwrap();
//! doc.set_attribute(first, "id", "1").unwrap();
//! assert_eq!(
//!     doc.serialize(root, false),
//!     r#"<catalog><item id="1">a</item><item>b</item></catalog>"#
//! );
//! ```

pub mod command;
pub mod encoding;
pub mod enumerate;
pub mod error;
pub mod mutate;
pub mod parser;
pub mod path;
pub mod registry;
pub mod sax;
pub mod serial;
pub mod tree;
pub mod validation;

// Re-export primary types at the crate root for convenience.
pub use command::Session;
pub use enumerate::{DepthLimit, TreeEnumerator};
pub use error::{ParseError, XmlError};
pub use mutate::{ChildPosition, Placement};
pub use parser::{FileAccessPolicy, ParseOptions};
pub use registry::Registry;
pub use tree::{Attribute, DocId, Document, NodeId};
