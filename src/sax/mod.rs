//! Streaming parse events.
//!
//! [`parse_sax`] drives `quick-xml` over a string and reports what it finds
//! to a [`SaxHandler`]. On top of the tokenizer it keeps the bookkeeping a
//! tree builder relies on: a single root element, balanced tags at end of
//! input, namespace scopes, and general entities declared in the internal
//! subset. Nesting depth and entity expansion are capped by
//! [`ParseOptions`]; going past either ends the parse even in tolerant
//! mode. Tree building ([`crate::parser`]) and user callbacks are both
//! handlers, so a document can be built and observed in one pass.
//!
//! # Examples
//!
//! ```
//! use xmlgrove::parser::ParseOptions;
//! use xmlgrove::sax::{parse_sax, SaxHandler};
//! use xmlgrove::tree::{Attribute, NamespaceDecl};
//!
//! struct Counter {
//!     elements: usize,
//! }
//!
//! impl SaxHandler for Counter {
//!     fn start_element(
//!         &mut self,
//!         _name: &str,
//!         _namespace: Option<&str>,
//!         _attributes: &[Attribute],
//!         _namespaces: &[NamespaceDecl],
//!     ) {
//!         self.elements += 1;
//!     }
//! }
//!
//! let mut counter = Counter { elements: 0 };
//! parse_sax("<root><a/><b/><c/></root>", &ParseOptions::default(), &mut counter).unwrap();
//! assert_eq!(counter.elements, 4);
//! ```

use std::collections::HashMap;
use std::fmt::Display;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ErrorSeverity, ParseDiagnostic, ParseError, SourceLocation};
use crate::parser::ParseOptions;
use crate::tree::{split_qname, Attribute, Doctype, NamespaceDecl};
use crate::validation::dtd::{parse_dtd, EntityError, Expansion};

/// URI permanently bound to the `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Receiver of parse events.
///
/// Every method has a no-op default, so implementors override only what
/// they need.
#[allow(unused_variables)]
pub trait SaxHandler {
    /// Called once before any other event.
    fn start_document(&mut self) {}

    /// Called once after the last event of a successful parse.
    fn end_document(&mut self) {}

    /// Called for the `<?xml ...?>` declaration.
    fn xml_declaration(
        &mut self,
        version: Option<&str>,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) {
    }

    /// Called for `<!DOCTYPE ...>`.
    fn doctype(&mut self, doctype: &Doctype) {}

    /// Called for a start tag or an empty-element tag.
    ///
    /// `namespace` is the URI the element's name resolved to and
    /// `namespaces` the declarations made on this tag; both are empty when
    /// namespace processing is off, and `xmlns` attributes then stay in
    /// `attributes`.
    fn start_element(
        &mut self,
        name: &str,
        namespace: Option<&str>,
        attributes: &[Attribute],
        namespaces: &[NamespaceDecl],
    ) {
    }

    /// Called when an element closes, including empty-element tags.
    fn end_element(&mut self, name: &str) {}

    /// Called for character data inside the root element, with references
    /// expanded. CDATA sections arrive here too.
    fn characters(&mut self, content: &str) {}

    /// Called for a problem that does not affect the tree.
    fn warning(&mut self, message: &str, location: SourceLocation) {}

    /// Called for a malformation that tolerant parsing recovered from.
    fn error(&mut self, message: &str, location: SourceLocation) {}
}

/// A handler that ignores every event.
pub struct DefaultHandler;

impl SaxHandler for DefaultHandler {}

/// Forwards every event to two handlers, first to `.0`, then to `.1`.
pub struct Tee<'a>(pub &'a mut dyn SaxHandler, pub &'a mut dyn SaxHandler);

impl SaxHandler for Tee<'_> {
    fn start_document(&mut self) {
        self.0.start_document();
        self.1.start_document();
    }

    fn end_document(&mut self) {
        self.0.end_document();
        self.1.end_document();
    }

    fn xml_declaration(
        &mut self,
        version: Option<&str>,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) {
        self.0.xml_declaration(version, encoding, standalone);
        self.1.xml_declaration(version, encoding, standalone);
    }

    fn doctype(&mut self, doctype: &Doctype) {
        self.0.doctype(doctype);
        self.1.doctype(doctype);
    }

    fn start_element(
        &mut self,
        name: &str,
        namespace: Option<&str>,
        attributes: &[Attribute],
        namespaces: &[NamespaceDecl],
    ) {
        self.0.start_element(name, namespace, attributes, namespaces);
        self.1.start_element(name, namespace, attributes, namespaces);
    }

    fn end_element(&mut self, name: &str) {
        self.0.end_element(name);
        self.1.end_element(name);
    }

    fn characters(&mut self, content: &str) {
        self.0.characters(content);
        self.1.characters(content);
    }

    fn warning(&mut self, message: &str, location: SourceLocation) {
        self.0.warning(message, location);
        self.1.warning(message, location);
    }

    fn error(&mut self, message: &str, location: SourceLocation) {
        self.0.error(message, location);
        self.1.error(message, location);
    }
}

/// Parses `input`, firing events on `handler`.
///
/// In tolerant mode malformations are reported through
/// [`SaxHandler::error`] and parsing recovers: mismatched end tags close
/// the elements they skip, unclosed elements are closed at end of input,
/// and anything that cannot be resynchronised ends the parse early.
///
/// # Errors
///
/// Returns `ParseError` for the first malformation in strict mode, and in
/// either mode when no root element was found.
pub fn parse_sax(
    input: &str,
    options: &ParseOptions,
    handler: &mut dyn SaxHandler,
) -> Result<(), ParseError> {
    let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    let mut reader = Reader::from_str(input);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut driver = EventDriver {
        input,
        reader,
        options,
        handler,
        open: Vec::new(),
        scopes: Vec::new(),
        entities: HashMap::new(),
        expansions: 0,
        seen_root: false,
        halted: false,
        diagnostics: Vec::new(),
    };
    driver.run()
}

/// Resolves named references for one run of text: the five predefined
/// entities, then the subset's, counting each expansion.
struct EntityResolver<'e> {
    entities: &'e HashMap<String, Expansion>,
    expansions: u32,
    failure: Option<EntityError>,
}

impl<'e> EntityResolver<'e> {
    fn new(entities: &'e HashMap<String, Expansion>) -> Self {
        Self {
            entities,
            expansions: 0,
            failure: None,
        }
    }

    fn resolve(&mut self, name: &str) -> Option<&'e str> {
        self.expansions = self.expansions.saturating_add(1);
        if let Some(predefined) = resolve_predefined_entity(name) {
            return Some(predefined);
        }
        match self.entities.get(name)? {
            Ok(entity) => {
                self.expansions = self.expansions.saturating_add(entity.expansions);
                Some(entity.text.as_str())
            }
            Err(err) => {
                self.failure = Some(err.clone());
                None
            }
        }
    }

    /// Pairs the expansion count with the unescaped text, preferring the
    /// entity's own failure over the tokenizer's report of it.
    fn finish<E: Display>(self, decoded: Result<String, E>) -> (u32, Result<String, EntityError>) {
        let outcome = match (decoded, self.failure) {
            (Ok(content), _) => Ok(content),
            (Err(_), Some(failure)) => Err(failure),
            (Err(err), None) => Err(EntityError::Malformed(err.to_string())),
        };
        (self.expansions, outcome)
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

struct EventDriver<'a, 'h> {
    input: &'a str,
    reader: Reader<&'a [u8]>,
    options: &'a ParseOptions,
    handler: &'h mut dyn SaxHandler,
    /// Names of the currently open elements, outermost first.
    open: Vec<String>,
    /// Namespace declarations with the depth of the element making them;
    /// only elements that declare something get an entry.
    scopes: Vec<(usize, Vec<NamespaceDecl>)>,
    entities: HashMap<String, Expansion>,
    /// Entity references expanded so far.
    expansions: u32,
    seen_root: bool,
    halted: bool,
    diagnostics: Vec<ParseDiagnostic>,
}

impl EventDriver<'_, '_> {
    fn run(&mut self) -> Result<(), ParseError> {
        self.handler.start_document();
        while !self.halted {
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(err) => {
                    self.fail(err.to_string())?;
                    break;
                }
            };
            match event {
                Event::Decl(decl) => self.declaration(&decl),
                Event::DocType(text) => self.doctype(&decode(&text))?,
                Event::Start(tag) => self.start(&tag, false)?,
                Event::Empty(tag) => self.start(&tag, true)?,
                Event::End(tag) => self.end(&decode(tag.name().as_ref()))?,
                Event::Text(text) => {
                    if self.open.is_empty() {
                        if !text.iter().all(u8::is_ascii_whitespace) {
                            self.outside_root()?;
                        }
                        continue;
                    }
                    let mut resolver = EntityResolver::new(&self.entities);
                    let decoded = text
                        .unescape_with(|name| resolver.resolve(name))
                        .map(|content| content.into_owned());
                    let (expansions, outcome) = resolver.finish(decoded);
                    if let Some(content) = self.expanded(expansions, outcome)? {
                        self.characters(&content);
                    }
                }
                Event::CData(cdata) => {
                    if self.open.is_empty() {
                        self.outside_root()?;
                    } else {
                        self.characters(&decode(&cdata));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        self.finish()
    }

    fn location(&self) -> SourceLocation {
        let offset = usize::try_from(self.reader.buffer_position()).unwrap_or(usize::MAX);
        SourceLocation::at(self.input, offset)
    }

    fn fatal(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: self.location(),
            diagnostics: self.diagnostics.clone(),
        }
    }

    /// Reports a malformation: fatal in strict mode, recorded otherwise.
    fn fail(&mut self, message: impl Into<String>) -> Result<(), ParseError> {
        if !self.options.tolerant {
            return Err(self.fatal(message));
        }
        self.report(ErrorSeverity::Error, message.into());
        Ok(())
    }

    fn report(&mut self, severity: ErrorSeverity, message: String) {
        let location = self.location();
        match severity {
            ErrorSeverity::Warning => self.handler.warning(&message, location),
            _ => self.handler.error(&message, location),
        }
        self.diagnostics.push(ParseDiagnostic {
            severity,
            message,
            location,
        });
    }

    /// Character data or markup before or after the root element.
    fn outside_root(&mut self) -> Result<(), ParseError> {
        let message = if self.seen_root {
            "Extra content at the end of the document"
        } else {
            "Start tag expected, '<' not found"
        };
        self.fail(message)?;
        self.halted = true;
        Ok(())
    }

    /// Counts `expansions` against the document's limit and reports a
    /// failed reference.
    fn expanded(
        &mut self,
        expansions: u32,
        outcome: Result<String, EntityError>,
    ) -> Result<Option<String>, ParseError> {
        self.expansions = self.expansions.saturating_add(expansions);
        let limit = self.options.max_entity_expansions;
        if self.expansions > limit {
            return Err(self.fatal(EntityError::LimitExceeded(limit).to_string()));
        }
        match outcome {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.is_limit() => Err(self.fatal(err.to_string())),
            Err(err) => {
                self.fail(err.to_string())?;
                Ok(None)
            }
        }
    }

    fn characters(&mut self, content: &str) {
        if !content.is_empty() {
            self.handler.characters(content);
        }
    }

    fn declaration(&mut self, decl: &BytesDecl<'_>) {
        let version = decl.version().ok().map(|v| decode(&v));
        let encoding = decl.encoding().and_then(Result::ok).map(|e| decode(&e));
        let standalone = decl
            .standalone()
            .and_then(Result::ok)
            .map(|s| s.as_ref() == b"yes");
        self.handler
            .xml_declaration(version.as_deref(), encoding.as_deref(), standalone);
    }

    fn doctype(&mut self, text: &str) -> Result<(), ParseError> {
        if self.seen_root {
            return self.outside_root();
        }
        let doctype = split_doctype(text);
        if let Some(subset) = &doctype.internal_subset {
            match parse_dtd(subset) {
                Ok(dtd) => {
                    self.entities = dtd.expand_entities(self.options.max_entity_expansions);
                }
                Err(err) => self.fail(format!("Malformed internal subset: {}", err.message))?,
            }
        }
        self.handler.doctype(&doctype);
        Ok(())
    }

    fn start(&mut self, tag: &BytesStart<'_>, empty: bool) -> Result<(), ParseError> {
        if self.open.is_empty() && self.seen_root {
            return self.outside_root();
        }
        let max_depth = self.options.max_depth;
        if self.open.len() >= max_depth {
            return Err(self.fatal(format!("maximum nesting depth exceeded ({max_depth})")));
        }
        let name = decode(tag.name().as_ref());
        let mut attributes = Vec::new();
        let mut namespaces = Vec::new();
        for attr in tag.attributes() {
            let attr = match attr {
                Ok(attr) => attr,
                Err(err) => {
                    self.fail(format!("{err} in element {name}"))?;
                    break;
                }
            };
            let key = decode(attr.key.as_ref());
            let mut resolver = EntityResolver::new(&self.entities);
            let decoded = attr
                .unescape_value_with(|entity| resolver.resolve(entity))
                .map(|value| value.into_owned());
            let (expansions, outcome) = resolver.finish(decoded);
            let Some(value) = self.expanded(expansions, outcome)? else {
                continue;
            };
            if self.options.namespaces {
                if key == "xmlns" {
                    namespaces.push(NamespaceDecl {
                        prefix: None,
                        uri: value,
                    });
                    continue;
                }
                if let Some(prefix) = key.strip_prefix("xmlns:") {
                    namespaces.push(NamespaceDecl {
                        prefix: Some(prefix.to_string()),
                        uri: value,
                    });
                    continue;
                }
            }
            attributes.push(Attribute::new(key, value));
        }

        let namespace = if self.options.namespaces {
            if !namespaces.is_empty() {
                self.scopes.push((self.open.len(), namespaces.clone()));
            }
            let (prefix, local) = split_qname(&name);
            let resolved = self.resolve_prefix(prefix);
            if let (None, Some(prefix)) = (&resolved, prefix) {
                let message = format!("Namespace prefix {prefix} on {local} is not defined");
                self.report(ErrorSeverity::Warning, message);
            }
            resolved
        } else {
            None
        };

        self.seen_root = true;
        self.handler
            .start_element(&name, namespace.as_deref(), &attributes, &namespaces);
        if empty {
            self.close(&name);
        } else {
            self.open.push(name);
        }
        Ok(())
    }

    fn resolve_prefix(&self, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE.to_string());
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|(_, scope)| scope.iter().rev())
            .find(|decl| decl.prefix.as_deref() == prefix)
            .filter(|decl| !decl.uri.is_empty())
            .map(|decl| decl.uri.clone())
    }

    fn close(&mut self, name: &str) {
        self.handler.end_element(name);
        let depth = self.open.len();
        if self.scopes.last().is_some_and(|(open_at, _)| *open_at == depth) {
            self.scopes.pop();
        }
    }

    fn end(&mut self, name: &str) -> Result<(), ParseError> {
        let expected = self.open.last().cloned();
        match self.open.iter().rposition(|open| open == name) {
            Some(at) if at + 1 == self.open.len() => {
                self.open.pop();
                self.close(name);
            }
            Some(at) => {
                let expected = expected.unwrap_or_default();
                self.fail(format!("Opening and ending tag mismatch: {expected} and {name}"))?;
                while self.open.len() > at {
                    if let Some(open) = self.open.pop() {
                        self.close(&open);
                    }
                }
            }
            None => {
                let message = match expected {
                    Some(expected) => format!("Opening and ending tag mismatch: {expected} and {name}"),
                    None => format!("Unexpected end tag : {name}"),
                };
                self.fail(message)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        if let Some(name) = self.open.last().cloned() {
            self.fail(format!("Premature end of data in tag {name}"))?;
            while let Some(open) = self.open.pop() {
                self.close(&open);
            }
        }
        if !self.seen_root {
            let message = if self.input.trim().is_empty() {
                "Document is empty"
            } else {
                "Start tag expected, '<' not found"
            };
            return Err(self.fatal(message));
        }
        self.handler.end_document();
        Ok(())
    }
}

/// Splits the text after `<!DOCTYPE` into its parts.
fn split_doctype(text: &str) -> Doctype {
    let text = text.trim();
    let name_end = text
        .find(|c: char| c.is_ascii_whitespace() || c == '[')
        .unwrap_or(text.len());
    let (name, mut rest) = text.split_at(name_end);

    let internal_subset = match (rest.find('['), rest.rfind(']')) {
        (Some(open), Some(close)) if open < close => {
            let subset = rest[open + 1..close].to_string();
            rest = &rest[..open];
            Some(subset)
        }
        _ => None,
    };

    let literals: Vec<&str> = rest
        .split(['"', '\''])
        .skip(1)
        .step_by(2)
        .collect();
    let keyword = rest.trim_start();
    let (public_id, system_id) = if keyword.starts_with("PUBLIC") {
        (literals.first(), literals.get(1))
    } else if keyword.starts_with("SYSTEM") {
        (None, literals.first())
    } else {
        (None, None)
    };

    Doctype {
        name: name.to_string(),
        public_id: public_id.map(|s| (*s).to_string()),
        system_id: system_id.map(|s| (*s).to_string()),
        internal_subset,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    /// Records events as short strings.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl SaxHandler for Recorder {
        fn start_document(&mut self) {
            self.events.push("start-doc".to_string());
        }

        fn end_document(&mut self) {
            self.events.push("end-doc".to_string());
        }

        fn doctype(&mut self, doctype: &Doctype) {
            self.events.push(format!("doctype {}", doctype.name));
        }

        fn start_element(
            &mut self,
            name: &str,
            namespace: Option<&str>,
            attributes: &[Attribute],
            namespaces: &[NamespaceDecl],
        ) {
            let mut event = format!("<{name}");
            if let Some(ns) = namespace {
                event.push_str(&format!(" {{{ns}}}"));
            }
            for decl in namespaces {
                event.push_str(&format!(" {}={}", decl.attribute_name(), decl.uri));
            }
            for attr in attributes {
                event.push_str(&format!(" {}={}", attr.name, attr.value));
            }
            self.events.push(event);
        }

        fn end_element(&mut self, name: &str) {
            self.events.push(format!("</{name}"));
        }

        fn characters(&mut self, content: &str) {
            self.events.push(format!("'{content}'"));
        }

        fn error(&mut self, message: &str, _location: SourceLocation) {
            self.events.push(format!("error {message}"));
        }

        fn warning(&mut self, message: &str, _location: SourceLocation) {
            self.events.push(format!("warning {message}"));
        }
    }

    fn record(input: &str, options: &ParseOptions) -> Result<Vec<String>, ParseError> {
        let mut recorder = Recorder::default();
        parse_sax(input, options, &mut recorder)?;
        Ok(recorder.events)
    }

    fn strict(input: &str) -> Result<Vec<String>, ParseError> {
        record(input, &ParseOptions::default())
    }

    fn tolerant(input: &str) -> Result<Vec<String>, ParseError> {
        record(input, &ParseOptions::default().tolerant(true))
    }

    #[test]
    fn test_event_order() {
        let events = strict("<?xml version='1.0'?>\n<r a='1'>x<e/>&amp;<![CDATA[<c>]]></r>\n").unwrap();
        assert_eq!(
            events,
            vec![
                "start-doc", "<r a=1", "'x'", "<e", "</e", "'&'", "'<c>'", "</r", "end-doc"
            ]
        );
    }

    #[test]
    fn test_comments_and_pis_are_dropped() {
        let events = strict("<!-- c --><r><?pi data?><!-- inner --></r>").unwrap();
        assert_eq!(events, vec!["start-doc", "<r", "</r", "end-doc"]);
    }

    #[test]
    fn test_byte_order_mark_is_skipped() {
        assert!(strict("\u{FEFF}<r/>").is_ok());
    }

    #[test]
    fn test_empty_document() {
        let err = strict("  \n").unwrap_err();
        assert_eq!(err.message, "Document is empty");
        assert!(tolerant("").is_err());
    }

    #[test]
    fn test_text_before_root() {
        let err = strict("junk<r/>").unwrap_err();
        assert_eq!(err.message, "Start tag expected, '<' not found");
    }

    #[test]
    fn test_second_root_rejected() {
        let err = strict("<a/><b/>").unwrap_err();
        assert_eq!(err.message, "Extra content at the end of the document");
        let events = tolerant("<a/><b/>").unwrap();
        assert!(events.contains(&"error Extra content at the end of the document".to_string()));
        assert!(!events.contains(&"<b".to_string()));
    }

    #[test]
    fn test_mismatched_end_tag() {
        let err = strict("<a><b></a>").unwrap_err();
        assert_eq!(err.message, "Opening and ending tag mismatch: b and a");
        let events = tolerant("<a><b></a>").unwrap();
        assert_eq!(
            events,
            vec![
                "start-doc",
                "<a",
                "<b",
                "error Opening and ending tag mismatch: b and a",
                "</b",
                "</a",
                "end-doc"
            ]
        );
    }

    #[test]
    fn test_stray_end_tag() {
        assert!(strict("<a></b></a>").is_err());
        let events = tolerant("<a></b></a>").unwrap();
        assert_eq!(events.iter().filter(|e| e.starts_with("</")).count(), 1);
    }

    #[test]
    fn test_premature_end() {
        let err = strict("<a><b>text").unwrap_err();
        assert_eq!(err.message, "Premature end of data in tag b");
        let events = tolerant("<a><b>text").unwrap();
        assert_eq!(
            &events[events.len() - 3..],
            &["</b".to_string(), "</a".to_string(), "end-doc".to_string()]
        );
    }

    #[test]
    fn test_internal_subset_entities() {
        let events = strict(
            "<!DOCTYPE r [<!ENTITY who \"world\">]><r greet='hi &who;'>hello &who;</r>",
        )
        .unwrap();
        assert_eq!(
            events,
            vec!["start-doc", "doctype r", "<r greet=hi world", "'hello world'", "</r", "end-doc"]
        );
    }

    #[test]
    fn test_undeclared_entity() {
        assert!(strict("<r>&nope;</r>").is_err());
        assert!(strict("<r>&#65;&lt;</r>").is_ok());
    }

    #[test]
    fn test_namespace_processing() {
        let input = "<a:r xmlns:a='urn:a' xmlns='urn:d'><c x='1'/><a:d/></a:r>";
        let events = strict(input).unwrap();
        assert_eq!(events[1], "<a:r {urn:a} xmlns:a=urn:a xmlns=urn:d");
        assert_eq!(events[2], "<c {urn:d} x=1");
        assert_eq!(events[4], "<a:d {urn:a}");

        let plain = record(input, &ParseOptions::default().namespaces(false)).unwrap();
        assert_eq!(plain[1], "<a:r xmlns:a=urn:a xmlns=urn:d");
    }

    #[test]
    fn test_namespace_scope_ends_with_element() {
        let events = strict("<r><a xmlns='urn:a'/><b/></r>").unwrap();
        assert_eq!(events[2], "<a {urn:a} xmlns=urn:a");
        assert_eq!(events[4], "<b");
    }

    #[test]
    fn test_namespace_scopes_survive_undeclaring_siblings() {
        let events = strict(
            "<r xmlns:p='urn:p'><a><b xmlns:q='urn:q'><q:x/></b><p:c/></a><q:d/><p:e/></r>",
        )
        .unwrap();
        assert!(events.contains(&"<q:x {urn:q}".to_string()));
        assert!(events.contains(&"<p:c {urn:p}".to_string()));
        assert!(events.contains(&"<q:d".to_string()));
        assert!(events.contains(&"warning Namespace prefix q on d is not defined".to_string()));
        assert!(events.contains(&"<p:e {urn:p}".to_string()));
    }

    #[test]
    fn test_namespace_scopes_close_on_recovery() {
        let events = tolerant("<r><a xmlns:p='urn:p'><b></a><p:c/></r>").unwrap();
        assert!(events.contains(&"<p:c".to_string()));
    }

    #[test]
    fn test_depth_limit() {
        let nested = |depth: usize| "<a>".repeat(depth) + &"</a>".repeat(depth);
        let options = ParseOptions::default().max_depth(3);
        assert!(record(&nested(3), &options).is_ok());
        assert!(record("<a><a><a/></a></a>", &options).is_ok());

        let err = record(&nested(4), &options).unwrap_err();
        assert_eq!(err.message, "maximum nesting depth exceeded (3)");
        let err = record("<a><a><a><a/></a></a></a>", &options).unwrap_err();
        assert_eq!(err.message, "maximum nesting depth exceeded (3)");
        assert!(record(&nested(4), &options.tolerant(true)).is_err());
    }

    #[test]
    fn test_nested_entities_expand_fully() {
        let events = strict(
            "<!DOCTYPE r [<!ENTITY b \"x\"><!ENTITY a \"&b;y\">]><r k='&a;'>&a;</r>",
        )
        .unwrap();
        assert_eq!(events[2], "<r k=xy");
        assert_eq!(events[3], "'xy'");
    }

    #[test]
    fn test_entity_loop_is_an_error() {
        let input = "<!DOCTYPE r [<!ENTITY a \"x&a;\">]><r>&a;</r>";
        let err = strict(input).unwrap_err();
        assert_eq!(err.message, "Detected an entity reference loop: a");
        let events = tolerant(input).unwrap();
        assert!(events.contains(&"error Detected an entity reference loop: a".to_string()));
    }

    #[test]
    fn test_unused_broken_entity_is_harmless() {
        assert!(strict("<!DOCTYPE r [<!ENTITY a \"&a;\">]><r>fine</r>").is_ok());
    }

    #[test]
    fn test_entity_expansion_limit() {
        let options = ParseOptions::default().max_entity_expansions(5);
        assert!(record("<r>&amp;&lt;&gt;&apos;&quot;</r>", &options).is_ok());
        let err = record("<r>&amp;&lt;&gt;</r><!-- -->", &options.max_entity_expansions(2))
            .unwrap_err();
        assert_eq!(err.message, "entity expansion limit exceeded (2)");

        let nested = "<!DOCTYPE r [<!ENTITY b \"&amp;&amp;\"><!ENTITY a \"&b;&b;\">]><r>&a;</r>";
        let err = record(nested, &options.tolerant(true)).unwrap_err();
        assert_eq!(err.message, "entity expansion limit exceeded (5)");
    }

    #[test]
    fn test_unbound_prefix_is_a_warning() {
        let events = strict("<x:r/>").unwrap();
        assert!(events.contains(&"warning Namespace prefix x on r is not defined".to_string()));
    }

    #[test]
    fn test_error_location() {
        let err = strict("<a>\n  <b>\n</a>").unwrap_err();
        assert_eq!(err.location.line, 3);
    }

    #[test]
    fn test_split_doctype() {
        let dt = split_doctype(" html PUBLIC \"-//W3C//DTD XHTML 1.0//EN\" 'x.dtd'");
        assert_eq!(dt.name, "html");
        assert_eq!(dt.public_id.as_deref(), Some("-//W3C//DTD XHTML 1.0//EN"));
        assert_eq!(dt.system_id.as_deref(), Some("x.dtd"));
        assert_eq!(dt.internal_subset, None);

        let dt = split_doctype("r SYSTEM 'r.dtd' [<!ELEMENT r ANY>]");
        assert_eq!(dt.system_id.as_deref(), Some("r.dtd"));
        assert_eq!(dt.internal_subset.as_deref(), Some("<!ELEMENT r ANY>"));

        let dt = split_doctype("r[<!ENTITY e 'v'>]");
        assert_eq!(dt.name, "r");
        assert_eq!(dt.public_id, None);
    }

    #[test]
    fn test_tee_forwards_to_both() {
        let mut a = Recorder::default();
        let mut b = Recorder::default();
        parse_sax("<r>t</r>", &ParseOptions::default(), &mut Tee(&mut a, &mut b)).unwrap();
        assert_eq!(a.events, b.events);
        assert_eq!(a.events.len(), 5);
    }
}
