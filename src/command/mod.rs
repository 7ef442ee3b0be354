//! The string-typed operation boundary.
//!
//! A [`Session`] owns a [`Registry`] and runs named operations whose
//! arguments and results are plain strings, the way a scripting host calls
//! them. Wire values are converted to typed ones here and nowhere else:
//! document ids, `true`-prefixed flags, `before`/`after`, `sibling`/`child`,
//! depths and [`PathMode`]s.
//!
//! Every operation checks its argument count first and reports a mismatch
//! as [`XmlError::BadArguments`] before looking at anything else.
//!
//! ```
//! use xmlgrove::command::Session;
//!
//! let mut session = Session::new();
//! let id = session.execute("createDocument", &["<r><a>1</a><a>2</a></r>", "false"]).unwrap();
//! assert_eq!(session.execute("childCount", &[&id, "/r", "a", "0"]).unwrap(), "2");
//! assert_eq!(session.execute("childPath", &[&id, "/r"]).unwrap(), "/r/a[1]");
//!
//! session.execute("freeDocument", &[&id]).unwrap();
//! let err = session.execute("rootName", &[&id]).unwrap_err();
//! assert_eq!(err.to_string(), "xmlerr, bad document id");
//! ```

pub mod listing;

pub use crate::parser::{AllowAll, DenyAll, FileAccessPolicy};
pub use listing::PathMode;

use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;

use crate::enumerate::DepthLimit;
use crate::error::{Result, XmlError};
use crate::mutate::{transfer, ChildPosition, Placement, Transfer, Trees};
use crate::parser::{parse_observed, read_document_file, ParseOptions};
use crate::registry::Registry;
use crate::sax::{DefaultHandler, SaxHandler};
use crate::tree::{DocId, Document, NodeId};

/// Version reported by the `version` operation.
pub const VERSION: &str = "2.9.0";

/// Every operation the boundary knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Version,
    CreateDocument,
    CreateDocumentFromFile,
    FreeDocument,
    FreeAllDocuments,
    ListDocuments,
    GetDocumentText,
    AddDtd,
    ValidateDtd,
    AppendXml,
    AddChild,
    AddSibling,
    RemoveElement,
    MoveElement,
    CopyElement,
    MoveRemoteElement,
    CopyRemoteElement,
    GetElementContent,
    SetElementContent,
    RootName,
    ChildPath,
    NextSiblingPath,
    PrevSiblingPath,
    ParentPath,
    ChildCount,
    ChildNames,
    Tree,
    ChildTextList,
    SetAttribute,
    GetAttribute,
    RemoveAttribute,
    ListAttributes,
    ListByAttributeValue,
    FindByAttributeValue,
}

impl Command {
    /// All operations, in the order they are documented.
    pub const ALL: [Self; 34] = [
        Self::Version,
        Self::CreateDocument,
        Self::CreateDocumentFromFile,
        Self::FreeDocument,
        Self::FreeAllDocuments,
        Self::ListDocuments,
        Self::GetDocumentText,
        Self::AddDtd,
        Self::ValidateDtd,
        Self::AppendXml,
        Self::AddChild,
        Self::AddSibling,
        Self::RemoveElement,
        Self::MoveElement,
        Self::CopyElement,
        Self::MoveRemoteElement,
        Self::CopyRemoteElement,
        Self::GetElementContent,
        Self::SetElementContent,
        Self::RootName,
        Self::ChildPath,
        Self::NextSiblingPath,
        Self::PrevSiblingPath,
        Self::ParentPath,
        Self::ChildCount,
        Self::ChildNames,
        Self::Tree,
        Self::ChildTextList,
        Self::SetAttribute,
        Self::GetAttribute,
        Self::RemoveAttribute,
        Self::ListAttributes,
        Self::ListByAttributeValue,
        Self::FindByAttributeValue,
    ];

    /// Returns the name the operation is called by.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::CreateDocument => "createDocument",
            Self::CreateDocumentFromFile => "createDocumentFromFile",
            Self::FreeDocument => "freeDocument",
            Self::FreeAllDocuments => "freeAllDocuments",
            Self::ListDocuments => "listDocuments",
            Self::GetDocumentText => "getDocumentText",
            Self::AddDtd => "addDtd",
            Self::ValidateDtd => "validateDtd",
            Self::AppendXml => "appendXml",
            Self::AddChild => "addChild",
            Self::AddSibling => "addSibling",
            Self::RemoveElement => "removeElement",
            Self::MoveElement => "moveElement",
            Self::CopyElement => "copyElement",
            Self::MoveRemoteElement => "moveRemoteElement",
            Self::CopyRemoteElement => "copyRemoteElement",
            Self::GetElementContent => "getElementContent",
            Self::SetElementContent => "setElementContent",
            Self::RootName => "rootName",
            Self::ChildPath => "childPath",
            Self::NextSiblingPath => "nextSiblingPath",
            Self::PrevSiblingPath => "prevSiblingPath",
            Self::ParentPath => "parentPath",
            Self::ChildCount => "childCount",
            Self::ChildNames => "childNames",
            Self::Tree => "tree",
            Self::ChildTextList => "childTextList",
            Self::SetAttribute => "setAttribute",
            Self::GetAttribute => "getAttribute",
            Self::RemoveAttribute => "removeAttribute",
            Self::ListAttributes => "listAttributes",
            Self::ListByAttributeValue => "listByAttributeValue",
            Self::FindByAttributeValue => "findByAttributeValue",
        }
    }

    /// Returns how many arguments the operation takes.
    #[must_use]
    pub fn arity(self) -> RangeInclusive<usize> {
        match self {
            Self::Version | Self::FreeAllDocuments | Self::ListDocuments => 0..=0,
            Self::FreeDocument | Self::RootName => 1..=1,
            Self::GetDocumentText => 1..=3,
            Self::CreateDocument | Self::CreateDocumentFromFile => 2..=5,
            Self::AddDtd
            | Self::ValidateDtd
            | Self::RemoveElement
            | Self::GetElementContent
            | Self::ParentPath => 2..=2,
            Self::ChildPath | Self::NextSiblingPath | Self::PrevSiblingPath => 2..=3,
            Self::AppendXml | Self::GetAttribute | Self::RemoveAttribute => 3..=3,
            Self::SetElementContent => 3..=4,
            Self::MoveElement | Self::CopyElement => 3..=5,
            Self::AddChild | Self::AddSibling => 4..=5,
            Self::MoveRemoteElement | Self::CopyRemoteElement => 4..=6,
            Self::ChildCount | Self::SetAttribute | Self::ListAttributes => 4..=4,
            Self::ChildNames => 5..=6,
            Self::Tree | Self::ChildTextList | Self::ListByAttributeValue => 6..=6,
            Self::FindByAttributeValue => 6..=7,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = XmlError;

    /// Looks an operation up by name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(s))
            .ok_or(XmlError::BadArguments)
    }
}

// --- Wire values ---

/// Reads a flag: anything starting with `true`, in any case, is true.
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    value
        .get(..4)
        .is_some_and(|head| head.eq_ignore_ascii_case("true"))
}

/// Reads a document id.
///
/// # Errors
///
/// Returns [`XmlError::BadDocId`] for anything that is not a positive
/// integer.
pub fn parse_doc_id(value: &str) -> Result<DocId> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .and_then(DocId::from_raw)
        .ok_or(XmlError::BadDocId)
}

/// Reads a depth; text that is not a number counts as `0`.
#[must_use]
pub fn parse_depth(value: &str) -> DepthLimit {
    DepthLimit::from_wire(value.trim().parse::<i64>().unwrap_or(0))
}

/// Reads an optional `before`/`after` argument; absent means after.
///
/// # Errors
///
/// Returns [`XmlError::BadArguments`] for any other word.
pub fn parse_before(value: Option<&str>) -> Result<bool> {
    match value {
        None => Ok(false),
        Some(word) if word.eq_ignore_ascii_case("before") => Ok(true),
        Some(word) if word.eq_ignore_ascii_case("after") => Ok(false),
        Some(_) => Err(XmlError::BadArguments),
    }
}

/// Reads an optional `sibling`/`child` argument; absent means child.
///
/// # Errors
///
/// Returns [`XmlError::BadArguments`] for any other word.
pub fn parse_as_sibling(value: Option<&str>) -> Result<bool> {
    match value {
        None => Ok(false),
        Some(word) if word.eq_ignore_ascii_case("sibling") => Ok(true),
        Some(word) if word.eq_ignore_ascii_case("child") => Ok(false),
        Some(_) => Err(XmlError::BadArguments),
    }
}

/// Checked access to a call's arguments.
struct Args<'a> {
    values: &'a [&'a str],
}

impl<'a> Args<'a> {
    fn new(command: Command, values: &'a [&'a str]) -> Result<Self> {
        if command.arity().contains(&values.len()) {
            Ok(Self { values })
        } else {
            Err(XmlError::BadArguments)
        }
    }

    /// A required argument; arity was checked up front.
    fn at(&self, index: usize) -> &'a str {
        self.values.get(index).copied().unwrap_or_default()
    }

    fn optional(&self, index: usize) -> Option<&'a str> {
        self.values.get(index).copied()
    }

    fn flag(&self, index: usize) -> bool {
        self.optional(index).is_some_and(parse_flag)
    }

    fn flag_or(&self, index: usize, default: bool) -> bool {
        self.optional(index).map_or(default, parse_flag)
    }

    fn doc_id(&self, index: usize) -> Result<DocId> {
        parse_doc_id(self.at(index))
    }

    fn depth(&self, index: usize) -> DepthLimit {
        parse_depth(self.at(index))
    }
}

// --- Session ---

/// A registry of documents plus the host settings operations run under.
///
/// # Examples
///
/// ```
/// use xmlgrove::command::{DenyAll, Session};
///
/// let mut session = Session::new().with_policy(DenyAll);
/// let err = session
///     .execute("createDocumentFromFile", &["/etc/hosts", "false"])
///     .unwrap_err();
/// assert_eq!(err.to_string(), "xmlerr, file access not permitted");
/// ```
pub struct Session {
    registry: Registry,
    policy: Box<dyn FileAccessPolicy>,
    callbacks: Option<Box<dyn SaxHandler>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("registry", &self.registry)
            .field("callbacks", &self.callbacks.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session with no documents that may read any file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            policy: Box::new(AllowAll),
            callbacks: None,
        }
    }

    /// Sets the policy consulted before any file is read.
    #[must_use]
    pub fn with_policy(mut self, policy: impl FileAccessPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Sets the handler that receives parse events of documents created
    /// with callbacks allowed.
    #[must_use]
    pub fn with_callbacks(mut self, handler: impl SaxHandler + 'static) -> Self {
        self.callbacks = Some(Box::new(handler));
        self
    }

    /// Returns the documents of this session.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the documents of this session for direct manipulation.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Runs the operation called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadArguments`] for an unknown name, otherwise
    /// whatever [`run`](Self::run) returns.
    pub fn execute(&mut self, name: &str, args: &[&str]) -> Result<String> {
        let command: Command = name.parse()?;
        self.run(command, args)
    }

    /// Runs one operation and returns its result text, empty for
    /// operations that only have an effect.
    ///
    /// # Errors
    ///
    /// Returns the [`XmlError`] describing why the call failed. A failed
    /// call changes no document.
    #[allow(clippy::too_many_lines)]
    pub fn run(&mut self, command: Command, args: &[&str]) -> Result<String> {
        let args = Args::new(command, args)?;
        match command {
            Command::Version => Ok(VERSION.to_string()),
            Command::CreateDocument => self.create_document(args.at(0), &args),
            Command::CreateDocumentFromFile => {
                let text = read_document_file(Path::new(args.at(0)), self.policy.as_ref())?;
                self.create_document(&text, &args)
            }
            Command::FreeDocument => {
                if self.registry.erase(args.doc_id(0)?) {
                    Ok(String::new())
                } else {
                    Err(XmlError::BadDocId)
                }
            }
            Command::FreeAllDocuments => {
                self.registry.clear();
                Ok(String::new())
            }
            Command::ListDocuments => Ok(self
                .registry
                .ids()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("\n")),
            Command::GetDocumentText => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = match args.optional(1).filter(|path| !path.is_empty()) {
                    Some(path) => doc.resolve(path)?,
                    None => doc.root(),
                };
                Ok(doc.serialize(node, args.flag(2)))
            }
            Command::AddDtd => {
                let doc = self.registry.get_mut(args.doc_id(0)?)?;
                doc.add_dtd(args.at(1))?;
                Ok(String::new())
            }
            Command::ValidateDtd => {
                let doc = self.registry.get_mut(args.doc_id(0)?)?;
                doc.validate_dtd(args.at(1))?;
                Ok(String::new())
            }
            Command::AppendXml => {
                let doc = self.registry.get_mut(args.doc_id(0)?)?;
                let parent = doc.resolve(args.at(1))?;
                let node = doc.append_xml(parent, args.at(2))?;
                Ok(doc.path_of(node))
            }
            Command::AddChild => {
                let position = if parse_before(args.optional(4))? {
                    ChildPosition::First
                } else {
                    ChildPosition::Last
                };
                let doc = self.registry.get_mut(args.doc_id(0)?)?;
                let parent = doc.resolve(args.at(1))?;
                let node = doc.add_child(parent, args.at(2), args.at(3), position)?;
                Ok(doc.path_of(node))
            }
            Command::AddSibling => {
                let before = parse_before(args.optional(4))?;
                let doc = self.registry.get_mut(args.doc_id(0)?)?;
                let anchor = doc.resolve(args.at(1))?;
                let node = doc.add_sibling(anchor, args.at(2), args.at(3), before)?;
                Ok(doc.path_of(node))
            }
            Command::RemoveElement => {
                let doc = self.registry.get_mut(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                doc.remove(node)?;
                Ok(String::new())
            }
            Command::MoveElement | Command::CopyElement => {
                let placement = Placement::new(
                    parse_as_sibling(args.optional(4))?,
                    parse_before(args.optional(3))?,
                );
                let id = args.doc_id(0)?;
                self.transfer(
                    (id, args.at(1)),
                    (id, args.at(2)),
                    placement,
                    transfer_mode(command),
                )
            }
            Command::MoveRemoteElement | Command::CopyRemoteElement => {
                let placement = Placement::new(
                    parse_as_sibling(args.optional(5))?,
                    parse_before(args.optional(4))?,
                );
                self.transfer(
                    (args.doc_id(0)?, args.at(1)),
                    (args.doc_id(2)?, args.at(3)),
                    placement,
                    transfer_mode(command),
                )
            }
            Command::GetElementContent => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                Ok(doc.immediate_text(node))
            }
            Command::SetElementContent => {
                let doc = self.registry.get_mut(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                doc.set_content(node, args.at(2), args.flag(3))?;
                Ok(String::new())
            }
            Command::RootName => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                Ok(doc
                    .root_element()
                    .and_then(|root| doc.node_name(root))
                    .unwrap_or_default()
                    .to_string())
            }
            Command::ChildPath | Command::NextSiblingPath | Command::PrevSiblingPath => {
                let include_text = args.flag(2);
                self.navigate(&args, |doc, node| {
                    let mut candidates: Box<dyn Iterator<Item = NodeId> + '_> = match command {
                        Command::ChildPath => Box::new(doc.children(node)),
                        Command::NextSiblingPath => {
                            Box::new(std::iter::successors(doc.next_sibling(node), |&n| {
                                doc.next_sibling(n)
                            }))
                        }
                        _ => Box::new(std::iter::successors(doc.prev_sibling(node), |&n| {
                            doc.prev_sibling(n)
                        })),
                    };
                    candidates.find(|&n| include_text || doc.is_element(n))
                })
            }
            Command::ParentPath => self.navigate(&args, |doc, node| {
                doc.parent(node).filter(|&parent| doc.is_element(parent))
            }),
            Command::ChildCount => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                let count = listing::child_count(doc, node, args.at(2), args.depth(3));
                Ok(count.to_string())
            }
            Command::ChildNames => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                Ok(listing::child_names(
                    doc,
                    node,
                    args.at(2),
                    args.at(3),
                    args.flag(4),
                    args.flag(5),
                ))
            }
            Command::Tree => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                Ok(listing::tree(
                    doc,
                    node,
                    args.at(2),
                    args.at(3),
                    args.flag(4),
                    args.depth(5),
                ))
            }
            Command::ChildTextList => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                Ok(listing::child_text_list(
                    doc,
                    node,
                    args.at(2),
                    args.at(3),
                    PathMode::from_wire(args.at(4)),
                    args.depth(5),
                ))
            }
            Command::SetAttribute => {
                let doc = self.registry.get_mut(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                doc.set_attribute(node, args.at(2), args.at(3))?;
                Ok(String::new())
            }
            Command::GetAttribute => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                doc.get_attribute(node, args.at(2), false)
                    .map(str::to_string)
                    .ok_or(XmlError::BadAttribute)
            }
            Command::RemoveAttribute => {
                let doc = self.registry.get_mut(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                if doc.remove_attribute(node, args.at(2)) {
                    Ok(String::new())
                } else {
                    Err(XmlError::BadAttribute)
                }
            }
            Command::ListAttributes => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                Ok(listing::attribute_listing(doc, node, args.at(2), args.at(3)))
            }
            Command::ListByAttributeValue => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                Ok(listing::attribute_values(
                    doc,
                    node,
                    args.at(2),
                    args.at(3),
                    args.at(4),
                    args.depth(5),
                ))
            }
            Command::FindByAttributeValue => {
                let doc = self.registry.get(args.doc_id(0)?)?;
                let node = doc.resolve(args.at(1))?;
                let found = listing::find_by_attribute(
                    doc,
                    node,
                    args.at(2),
                    args.at(3),
                    args.at(4),
                    args.depth(5),
                    args.flag(6),
                );
                Ok(found.map(|n| doc.path_of(n)).unwrap_or_default())
            }
        }
    }

    /// Parses `text` under the flags at argument positions 1 to 4 and
    /// registers the result.
    fn create_document(&mut self, text: &str, args: &Args<'_>) -> Result<String> {
        let allow_callbacks = args.flag(3);
        let options = ParseOptions::default()
            .tolerant(args.flag(1))
            .build_tree(args.flag_or(2, true))
            .namespaces(args.flag_or(4, true));
        let mut ignore = DefaultHandler;
        let observer: &mut dyn SaxHandler = match self.callbacks.as_deref_mut() {
            Some(handler) if allow_callbacks => handler,
            _ => &mut ignore,
        };
        let Some(mut doc) = parse_observed(text, &options, observer)? else {
            return Ok("0".to_string());
        };
        doc.config.allow_callbacks = allow_callbacks;
        Ok(self.registry.add(doc)?.to_string())
    }

    /// Resolves a node from argument positions 0 and 1 and renders the
    /// path of the node `step` leads to, or nothing.
    fn navigate(
        &self,
        args: &Args<'_>,
        step: impl FnOnce(&Document, NodeId) -> Option<NodeId>,
    ) -> Result<String> {
        let doc = self.registry.get(args.doc_id(0)?)?;
        let node = doc.resolve(args.at(1))?;
        Ok(step(doc, node).map(|n| doc.path_of(n)).unwrap_or_default())
    }

    /// Moves or copies between two endpoints and renders the placed node's
    /// path in the destination.
    fn transfer(
        &mut self,
        (source_id, source_path): (DocId, &str),
        (target_id, target_path): (DocId, &str),
        placement: Placement,
        mode: Transfer,
    ) -> Result<String> {
        let trees = self.registry.pair_mut(source_id, target_id)?;
        let (source, target) = match &trees {
            Trees::Same(doc) => (doc.resolve(source_path)?, doc.resolve(target_path)?),
            Trees::Split {
                source,
                destination,
            } => (source.resolve(source_path)?, destination.resolve(target_path)?),
        };
        let node = transfer(trees, source, target, placement, mode)?;
        Ok(self.registry.get(target_id)?.path_of(node))
    }
}

fn transfer_mode(command: Command) -> Transfer {
    match command {
        Command::CopyElement | Command::CopyRemoteElement => Transfer::Copy,
        _ => Transfer::Move,
    }
}
