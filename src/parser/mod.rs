//! Building documents from XML text.
//!
//! Tokenizing is done by [`crate::sax`]; this module turns the event stream
//! into a [`Document`] arena with [`TreeBuilder`], and owns the options and
//! file-access checks that go with it.

use std::path::Path;

use crate::encoding::decode_to_utf8;
use crate::error::{ErrorSeverity, ParseDiagnostic, ParseError, Result, SourceLocation, XmlError};
use crate::sax::{parse_sax, SaxHandler, Tee};
use crate::tree::{Attribute, Doctype, Document, DocumentConfig, NamespaceDecl, NodeId, NodeKind};

pub use crate::validation::dtd::DEFAULT_MAX_ENTITY_EXPANSIONS;

/// Deepest element nesting accepted by default.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Options controlling how text becomes a document.
///
/// ```
/// use xmlgrove::parser::ParseOptions;
///
/// let opts = ParseOptions::default()
///     .tolerant(true)
///     .namespaces(false)
///     .max_depth(64);
/// assert!(opts.tolerant);
/// assert!(opts.build_tree);
/// assert_eq!(opts.max_depth, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Recover from malformed input and keep the partial tree.
    pub tolerant: bool,
    /// Resolve namespace declarations and element namespaces.
    pub namespaces: bool,
    /// Keep the parsed tree. Without it the text is only checked and its
    /// events delivered.
    pub build_tree: bool,
    /// Deepest element nesting accepted; the root element is at depth 1.
    pub max_depth: usize,
    /// Entity references, predefined ones included, one document may
    /// expand.
    pub max_entity_expansions: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            tolerant: false,
            namespaces: true,
            build_tree: true,
            max_depth: DEFAULT_MAX_DEPTH,
            max_entity_expansions: DEFAULT_MAX_ENTITY_EXPANSIONS,
        }
    }
}

impl ParseOptions {
    /// Enables or disables tolerant parsing.
    #[must_use]
    pub fn tolerant(mut self, yes: bool) -> Self {
        self.tolerant = yes;
        self
    }

    /// Enables or disables namespace processing.
    #[must_use]
    pub fn namespaces(mut self, yes: bool) -> Self {
        self.namespaces = yes;
        self
    }

    /// Chooses whether the tree is kept.
    #[must_use]
    pub fn build_tree(mut self, yes: bool) -> Self {
        self.build_tree = yes;
        self
    }

    /// Sets the deepest element nesting accepted.
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets how many entity references one document may expand.
    #[must_use]
    pub fn max_entity_expansions(mut self, max: u32) -> Self {
        self.max_entity_expansions = max;
        self
    }

    fn document_config(self) -> DocumentConfig {
        DocumentConfig {
            preserve_namespaces: self.namespaces,
            materialize_tree: self.build_tree,
            allow_callbacks: false,
        }
    }
}

/// Decides whether a file may be read.
///
/// Consulted before any file I/O happens.
pub trait FileAccessPolicy {
    /// Returns `true` if `path` may be opened for reading.
    fn may_read(&self, path: &Path) -> bool;
}

/// Permits every path.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl FileAccessPolicy for AllowAll {
    fn may_read(&self, _path: &Path) -> bool {
        true
    }
}

/// Refuses every path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl FileAccessPolicy for DenyAll {
    fn may_read(&self, _path: &Path) -> bool {
        false
    }
}

impl<F> FileAccessPolicy for F
where
    F: Fn(&Path) -> bool,
{
    fn may_read(&self, path: &Path) -> bool {
        self(path)
    }
}

/// A [`SaxHandler`] that assembles events into a [`Document`].
pub struct TreeBuilder {
    doc: Document,
    current: NodeId,
}

impl TreeBuilder {
    /// Starts an empty document recorded as built with `config`.
    #[must_use]
    pub fn new(config: DocumentConfig) -> Self {
        let mut doc = Document::new();
        doc.config = config;
        let current = doc.root();
        Self { doc, current }
    }

    /// Returns the document built so far.
    #[must_use]
    pub fn finish(self) -> Document {
        self.doc
    }

    fn diagnostic(&mut self, severity: ErrorSeverity, message: &str, location: SourceLocation) {
        self.doc.diagnostics.push(ParseDiagnostic {
            severity,
            message: message.to_string(),
            location,
        });
    }
}

impl SaxHandler for TreeBuilder {
    fn xml_declaration(
        &mut self,
        version: Option<&str>,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) {
        self.doc.version = version.map(str::to_string);
        self.doc.encoding = encoding.map(str::to_string);
        self.doc.standalone = standalone;
    }

    fn doctype(&mut self, doctype: &Doctype) {
        self.doc.doctype = Some(doctype.clone());
    }

    fn start_element(
        &mut self,
        name: &str,
        namespace: Option<&str>,
        attributes: &[Attribute],
        namespaces: &[NamespaceDecl],
    ) {
        let id = self.doc.create_node(NodeKind::Element {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            attributes: attributes.to_vec(),
            namespaces: namespaces.to_vec(),
        });
        self.doc.append_child(self.current, id);
        self.current = id;
    }

    fn end_element(&mut self, _name: &str) {
        self.current = self.doc.parent(self.current).unwrap_or(self.doc.root());
    }

    fn characters(&mut self, content: &str) {
        // Text split by a CDATA section or a comment joins into one node.
        if let Some(last) = self.doc.last_child(self.current) {
            if let NodeKind::Text { content: existing } = &mut self.doc.node_mut(last).kind {
                existing.push_str(content);
                return;
            }
        }
        let text = self.doc.create_text(content);
        self.doc.append_child(self.current, text);
    }

    fn warning(&mut self, message: &str, location: SourceLocation) {
        self.diagnostic(ErrorSeverity::Warning, message, location);
    }

    fn error(&mut self, message: &str, location: SourceLocation) {
        self.diagnostic(ErrorSeverity::Error, message, location);
    }
}

/// Parses a string with default options.
///
/// # Errors
///
/// Returns `ParseError` if the input is not well-formed.
pub fn parse_str(input: &str) -> Result<Document, ParseError> {
    parse_str_with_options(input, &ParseOptions::default())
}

/// Parses a string into a document, building the tree whatever
/// `options.build_tree` says.
///
/// # Errors
///
/// Returns `ParseError` if the input is not well-formed and tolerant mode
/// is off, or if no root element could be found.
pub fn parse_str_with_options(
    input: &str,
    options: &ParseOptions,
) -> Result<Document, ParseError> {
    let mut builder = TreeBuilder::new(options.document_config());
    parse_sax(input, options, &mut builder)?;
    Ok(builder.finish())
}

/// Parses a string while delivering every event to `observer`.
///
/// Returns the document when `options.build_tree` is set, `None` otherwise.
///
/// # Errors
///
/// As [`parse_str_with_options`].
pub fn parse_observed(
    input: &str,
    options: &ParseOptions,
    observer: &mut dyn SaxHandler,
) -> Result<Option<Document>, ParseError> {
    if !options.build_tree {
        parse_sax(input, options, observer)?;
        return Ok(None);
    }
    let mut builder = TreeBuilder::new(options.document_config());
    parse_sax(input, options, &mut Tee(&mut builder, observer))?;
    Ok(Some(builder.finish()))
}

/// Reads and decodes a file after checking it against `policy`.
///
/// # Errors
///
/// Returns [`XmlError::NoFilePermission`] if the policy refuses the path,
/// before the file is touched, and [`XmlError::BadXml`] if it cannot be
/// read or decoded.
pub fn read_document_file(path: &Path, policy: &dyn FileAccessPolicy) -> Result<String> {
    if !policy.may_read(path) {
        return Err(XmlError::NoFilePermission);
    }
    let bytes = std::fs::read(path).map_err(|err| {
        XmlError::BadXml(format!(
            "failed to load external entity \"{}\": {err}",
            path.display()
        ))
    })?;
    decode_to_utf8(&bytes).map_err(|err| XmlError::BadXml(err.to_string()))
}

impl Document {
    /// Parses XML text; `tolerant` recovers from malformed input.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the text is not well-formed (strict mode) or
    /// holds no root element at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use xmlgrove::Document;
    ///
    /// let doc = Document::parse("<r><a>1</a></r>", false).unwrap();
    /// let root = doc.root_element().unwrap();
    /// assert_eq!(doc.node_name(root), Some("r"));
    ///
    /// assert!(Document::parse("<r><a></r>", false).is_err());
    /// let partial = Document::parse("<r><a></r>", true).unwrap();
    /// assert!(!partial.diagnostics.is_empty());
    /// ```
    pub fn parse(text: &str, tolerant: bool) -> Result<Self, ParseError> {
        parse_str_with_options(text, &ParseOptions::default().tolerant(tolerant))
    }

    /// Parses a file.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::NoFilePermission`] if `policy` refuses the path
    /// and [`XmlError::BadXml`] if the file cannot be read or parsed.
    pub fn parse_file(
        path: &Path,
        options: &ParseOptions,
        policy: &dyn FileAccessPolicy,
    ) -> Result<Self> {
        let text = read_document_file(path, policy)?;
        Ok(parse_str_with_options(&text, options)?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::sax::DefaultHandler;

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("xmlgrove-{}-{name}", std::process::id()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_builds_tree() {
        let doc = parse_str("<?xml version='1.0' encoding='UTF-8'?><r><a x='1'>t</a><b/></r>").unwrap();
        let r = doc.root_element().unwrap();
        let kids: Vec<_> = doc.children(r).collect();
        assert_eq!(kids.len(), 2);
        assert_eq!(doc.attribute(kids[0], "x"), Some("1"));
        assert_eq!(doc.text_content(kids[0]), "t");
        assert_eq!(doc.version.as_deref(), Some("1.0"));
        assert_eq!(doc.encoding.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn test_whitespace_text_is_kept() {
        let doc = parse_str("<r>\n  <a/>\n</r>").unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(doc.children(r).count(), 3);
    }

    #[test]
    fn test_cdata_joins_adjacent_text() {
        let doc = parse_str("<r>a<![CDATA[<b>]]>c<!-- x -->d</r>").unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(doc.children(r).count(), 1);
        assert_eq!(doc.immediate_text(r), "a<b>cd");
    }

    #[test]
    fn test_tolerant_keeps_partial_tree() {
        let doc = Document::parse("<r><a>one<b>two</r>", true).unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(doc.text_content(r), "onetwo");
        assert!(doc
            .diagnostics
            .iter()
            .all(|d| d.severity == ErrorSeverity::Error));
        assert!(!doc.diagnostics.is_empty());
    }

    #[test]
    fn test_namespace_setting_is_recorded() {
        let on = parse_str("<r xmlns='urn:x'/>").unwrap();
        let r = on.root_element().unwrap();
        assert!(on.config.preserve_namespaces);
        assert_eq!(on.node_namespace(r), Some("urn:x"));
        assert!(on.attributes(r).is_empty());

        let off =
            parse_str_with_options("<r xmlns='urn:x'/>", &ParseOptions::default().namespaces(false))
                .unwrap();
        let r = off.root_element().unwrap();
        assert!(!off.config.preserve_namespaces);
        assert_eq!(off.node_namespace(r), None);
        assert_eq!(off.attribute(r, "xmlns"), Some("urn:x"));
    }

    #[test]
    fn test_doctype_is_recorded() {
        let doc = parse_str("<!DOCTYPE r [<!ENTITY e 'v'>]><r>&e;</r>").unwrap();
        let doctype = doc.doctype.clone().unwrap();
        assert_eq!(doctype.name, "r");
        assert_eq!(doctype.internal_subset.as_deref(), Some("<!ENTITY e 'v'>"));
        assert_eq!(doc.text_content(doc.root()), "v");
    }

    #[test]
    fn test_parse_observed_without_tree() {
        let opts = ParseOptions::default().build_tree(false);
        assert!(parse_observed("<r/>", &opts, &mut DefaultHandler).unwrap().is_none());
        assert!(parse_observed("<r>", &opts, &mut DefaultHandler).is_err());
        let built = parse_observed("<r/>", &ParseOptions::default(), &mut DefaultHandler).unwrap();
        assert!(built.is_some());
    }

    #[test]
    fn test_parse_file_respects_policy() {
        let path = temp_file("policy.xml", b"<r/>");
        let denied = Document::parse_file(&path, &ParseOptions::default(), &DenyAll);
        assert_eq!(denied.unwrap_err(), XmlError::NoFilePermission);
        let only_tmp = |p: &Path| p.starts_with(std::env::temp_dir());
        assert!(Document::parse_file(&path, &ParseOptions::default(), &only_tmp).is_ok());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_policy_checked_before_io() {
        let missing = Path::new("/definitely/not/here.xml");
        assert_eq!(
            Document::parse_file(missing, &ParseOptions::default(), &DenyAll).unwrap_err(),
            XmlError::NoFilePermission
        );
        assert!(matches!(
            Document::parse_file(missing, &ParseOptions::default(), &AllowAll),
            Err(XmlError::BadXml(_))
        ));
    }

    #[test]
    fn test_parse_file_decodes_declared_encoding() {
        let path = temp_file("latin1.xml", b"<?xml version='1.0' encoding='ISO-8859-1'?><r>\xE9</r>");
        let doc = Document::parse_file(&path, &ParseOptions::default(), &AllowAll).unwrap();
        assert_eq!(doc.text_content(doc.root()), "\u{E9}");
        std::fs::remove_file(path).unwrap();
    }
}
