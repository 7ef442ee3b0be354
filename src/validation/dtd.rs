//! DTD declarations, parsing and validation.
//!
//! Covers the subset of XML 1.0 §3 that matters for checking a built tree:
//! `<!ELEMENT>` content models, `<!ATTLIST>` declarations and general
//! `<!ENTITY>` declarations. Notations, comments, processing instructions
//! and parameter-entity references are accepted and skipped.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use quick_xml::escape::resolve_predefined_entity;
use thiserror::Error;

use crate::error::{ParseError, SourceLocation};
use crate::path::path_of;
use crate::tree::{Document, NodeId};

use super::{ValidationError, ValidationResult};

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// Declarations parsed from DTD text.
#[derive(Debug, Clone, Default)]
pub struct Dtd {
    /// Content models keyed by element name.
    pub elements: HashMap<String, ContentModel>,
    /// Attribute declarations keyed by element name, in declaration order.
    pub attributes: HashMap<String, Vec<AttributeDecl>>,
    /// General entities keyed by name. The first declaration wins.
    pub entities: HashMap<String, EntityDecl>,
}

/// Entity references one document may expand before parsing stops.
pub const DEFAULT_MAX_ENTITY_EXPANSIONS: u32 = 10_000;

/// Entities that may be open inside one another at once.
const MAX_ENTITY_NESTING: usize = 40;

/// An internal entity with every reference in its text resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedEntity {
    /// Character data the reference stands for.
    pub text: String,
    /// Entity references resolved to produce `text`, nested ones included.
    pub expansions: u32,
    /// Entities open at once while expanding, this one included.
    pub depth: usize,
}

/// Why an entity could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    /// The entity refers to itself, directly or through others.
    #[error("Detected an entity reference loop: {0}")]
    Loop(String),
    /// A reference names no declared entity.
    #[error("Entity '{0}' not defined")]
    Undefined(String),
    /// A reference names an external entity, which is never fetched.
    #[error("External entity '{0}' is not loaded")]
    External(String),
    /// The replacement text or the text around a reference is malformed.
    #[error("{0}")]
    Malformed(String),
    /// Entities are nested inside one another too deeply.
    #[error("Maximum entity nesting depth exceeded")]
    TooDeep,
    /// More references would be expanded than allowed.
    #[error("entity expansion limit exceeded ({0})")]
    LimitExceeded(u32),
}

impl EntityError {
    /// Returns `true` for the resource limits, which end a parse even when
    /// it is tolerant.
    #[must_use]
    pub fn is_limit(&self) -> bool {
        matches!(self, Self::TooDeep | Self::LimitExceeded(_))
    }
}

/// Outcome of expanding one entity.
pub type Expansion = Result<ExpandedEntity, EntityError>;

impl Dtd {
    /// Expands every internal general entity.
    ///
    /// References to other entities are followed recursively. An entity
    /// that refers to itself, uses an undeclared or external entity, nests
    /// too deeply or needs more than `limit` expansions maps to the reason
    /// it failed. The error surfaces only where the entity is used.
    ///
    /// ```
    /// use xmlgrove::validation::dtd::parse_dtd;
    ///
    /// let dtd = parse_dtd("<!ENTITY b 'x'><!ENTITY a '&b;y'>").unwrap();
    /// let expanded = dtd.expand_entities(100);
    /// assert_eq!(expanded["a"].as_ref().unwrap().text, "xy");
    /// ```
    #[must_use]
    pub fn expand_entities(&self, limit: u32) -> HashMap<String, Expansion> {
        let mut done = HashMap::new();
        for (name, decl) in &self.entities {
            if matches!(decl, EntityDecl::Internal(_)) && !done.contains_key(name) {
                let result = self.expand_entity(name, limit, &mut Vec::new(), &mut done);
                done.insert(name.clone(), result);
            }
        }
        done
    }

    fn expand_entity(
        &self,
        name: &str,
        limit: u32,
        active: &mut Vec<String>,
        done: &mut HashMap<String, Expansion>,
    ) -> Expansion {
        match done.get(name) {
            Some(Ok(expanded)) if active.len() + expanded.depth > MAX_ENTITY_NESTING => {
                return Err(EntityError::TooDeep);
            }
            Some(result) => return result.clone(),
            None => {}
        }
        if active.iter().any(|open| open == name) {
            return Err(EntityError::Loop(name.to_string()));
        }
        if active.len() >= MAX_ENTITY_NESTING {
            return Err(EntityError::TooDeep);
        }
        let value = match self.entities.get(name) {
            Some(EntityDecl::Internal(value)) => value,
            Some(EntityDecl::External { .. }) => {
                return Err(EntityError::External(name.to_string()));
            }
            None => return Err(EntityError::Undefined(name.to_string())),
        };
        active.push(name.to_string());
        let result = self.expand_text(value, limit, active, done);
        active.pop();
        // Nesting depends on where the walk started, so a nesting failure
        // is only recorded for the entity the walk began at.
        if result != Err(EntityError::TooDeep) {
            done.insert(name.to_string(), result.clone());
        }
        result
    }

    fn expand_text(
        &self,
        value: &str,
        limit: u32,
        active: &mut Vec<String>,
        done: &mut HashMap<String, Expansion>,
    ) -> Expansion {
        let mut text = String::with_capacity(value.len());
        let mut expansions = 0u32;
        let mut depth = 1;
        let mut rest = value;
        while let Some(amp) = rest.find('&') {
            text.push_str(&rest[..amp]);
            let tail = &rest[amp + 1..];
            let end = tail
                .find(';')
                .ok_or_else(|| EntityError::Malformed("EntityRef: expecting ';'".to_string()))?;
            let reference = &tail[..end];
            rest = &tail[end + 1..];
            if let Some(digits) = reference.strip_prefix('#') {
                let c = char_reference(digits).ok_or_else(|| {
                    EntityError::Malformed(format!("Invalid character reference &#{digits};"))
                })?;
                text.push(c);
                continue;
            }
            expansions = expansions.saturating_add(1);
            if let Some(predefined) = resolve_predefined_entity(reference) {
                text.push_str(predefined);
            } else {
                let inner = self.expand_entity(reference, limit, active, done)?;
                expansions = expansions.saturating_add(inner.expansions);
                depth = depth.max(inner.depth + 1);
                if expansions <= limit {
                    text.push_str(&inner.text);
                }
            }
            if expansions > limit {
                return Err(EntityError::LimitExceeded(limit));
            }
        }
        text.push_str(rest);
        Ok(ExpandedEntity {
            text,
            expansions,
            depth,
        })
    }
}

/// What an element may contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentModel {
    /// `EMPTY`
    Empty,
    /// `ANY`
    Any,
    /// `(#PCDATA|a|b)*`; the listed names may appear among the text.
    Mixed(Vec<String>),
    /// Element-only content.
    Children(Particle),
}

/// One particle of an element-only content model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Particle {
    /// Name, sequence or choice.
    pub kind: ParticleKind,
    /// `?`, `*`, `+` or nothing.
    pub occurrence: Occurrence,
}

/// Shape of a [`Particle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticleKind {
    /// A single element name.
    Name(String),
    /// `(a, b, c)`
    Seq(Vec<Particle>),
    /// `(a | b | c)`
    Choice(Vec<Particle>),
}

/// Repetition suffix of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// Exactly once.
    Once,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

/// One attribute declared in an `<!ATTLIST>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    /// Attribute name.
    pub name: String,
    /// Declared type.
    pub kind: AttributeType,
    /// Default declaration.
    pub default: AttributeDefault,
}

/// Declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    /// `CDATA`
    CData,
    /// `ID`
    Id,
    /// `IDREF`
    IdRef,
    /// `IDREFS`
    IdRefs,
    /// `ENTITY`
    Entity,
    /// `ENTITIES`
    Entities,
    /// `NMTOKEN`
    NmToken,
    /// `NMTOKENS`
    NmTokens,
    /// `NOTATION (a|b)`
    Notation(Vec<String>),
    /// `(a|b|c)`
    Enumeration(Vec<String>),
}

/// Default declaration of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeDefault {
    /// `#REQUIRED`
    Required,
    /// `#IMPLIED`
    Implied,
    /// `#FIXED "v"`
    Fixed(String),
    /// `"v"`
    Value(String),
}

/// A general entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityDecl {
    /// Literal replacement text.
    Internal(String),
    /// Reference to an external resource; never fetched.
    External {
        /// `SYSTEM` literal.
        system_id: String,
        /// `PUBLIC` literal, if any.
        public_id: Option<String>,
    },
}

impl fmt::Display for ContentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("EMPTY"),
            Self::Any => f.write_str("ANY"),
            Self::Mixed(names) if names.is_empty() => f.write_str("(#PCDATA)"),
            Self::Mixed(names) => write!(f, "(#PCDATA|{})*", names.join("|")),
            Self::Children(particle) => write!(f, "{particle}"),
        }
    }
}

impl fmt::Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (items, sep) = match &self.kind {
            ParticleKind::Name(name) => {
                f.write_str(name)?;
                (&[][..], "")
            }
            ParticleKind::Seq(items) => (items.as_slice(), ","),
            ParticleKind::Choice(items) => (items.as_slice(), "|"),
        };
        if !matches!(self.kind, ParticleKind::Name(_)) {
            f.write_str("(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{item}")?;
            }
            f.write_str(")")?;
        }
        f.write_str(match self.occurrence {
            Occurrence::Once => "",
            Occurrence::Optional => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        })
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses DTD text: an internal subset or a standalone `.dtd` body.
///
/// # Errors
///
/// Returns `ParseError` at the first malformed declaration.
///
/// # Examples
///
/// ```
/// use xmlgrove::validation::dtd::{parse_dtd, ContentModel};
///
/// let dtd = parse_dtd("<!ELEMENT note (#PCDATA)> <!ENTITY who 'world'>").unwrap();
/// assert_eq!(dtd.elements["note"], ContentModel::Mixed(vec![]));
/// assert_eq!(dtd.entities.len(), 1);
/// ```
pub fn parse_dtd(input: &str) -> Result<Dtd, ParseError> {
    let mut scanner = Scanner { input, pos: 0 };
    let mut dtd = Dtd::default();
    loop {
        scanner.skip_ws();
        if scanner.at_end() {
            return Ok(dtd);
        }
        if scanner.eat("<!--") {
            scanner.skip_past("-->")?;
        } else if scanner.eat("<?") {
            scanner.skip_past("?>")?;
        } else if scanner.eat("<!ELEMENT") {
            let (name, model) = scanner.element_decl()?;
            if dtd.elements.contains_key(&name) {
                return Err(scanner.fail(format!("Redefinition of element {name}")));
            }
            dtd.elements.insert(name, model);
        } else if scanner.eat("<!ATTLIST") {
            let (element, decls) = scanner.attlist_decl()?;
            let known = dtd.attributes.entry(element).or_default();
            for decl in decls {
                if !known.iter().any(|k| k.name == decl.name) {
                    known.push(decl);
                }
            }
        } else if scanner.eat("<!ENTITY") {
            if let Some((name, decl)) = scanner.entity_decl()? {
                dtd.entities.entry(name).or_insert(decl);
            }
        } else if scanner.eat("<!NOTATION") {
            scanner.skip_decl()?;
        } else if scanner.eat("%") {
            scanner.name()?;
            scanner.expect(";")?;
        } else {
            return Err(scanner.fail("Content error in the DTD"));
        }
    }
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl Scanner<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn fail(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, SourceLocation::at(self.input, self.pos))
    }

    fn skip_ws(&mut self) -> bool {
        let trimmed = self.rest().trim_start_matches(is_xml_space);
        let skipped = self.rest().len() - trimmed.len();
        self.pos += skipped;
        skipped > 0
    }

    fn require_ws(&mut self) -> Result<(), ParseError> {
        if self.skip_ws() {
            Ok(())
        } else {
            Err(self.fail("Space required"))
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.fail(format!("'{token}' expected")))
        }
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), ParseError> {
        match self.rest().find(terminator) {
            Some(at) => {
                self.pos += at + terminator.len();
                Ok(())
            }
            None => Err(self.fail(format!("'{terminator}' expected"))),
        }
    }

    /// Skips to the `>` closing a declaration, stepping over quoted literals.
    fn skip_decl(&mut self) -> Result<(), ParseError> {
        let mut quote = None;
        let mut close = None;
        for (i, c) in self.rest().char_indices() {
            match (quote, c) {
                (None, '"' | '\'') => quote = Some(c),
                (Some(q), _) if q == c => quote = None,
                (None, '>') => {
                    close = Some(i);
                    break;
                }
                _ => {}
            }
        }
        match close {
            Some(i) => {
                self.pos += i + 1;
                Ok(())
            }
            None => Err(self.fail("'>' expected")),
        }
    }

    fn name(&mut self) -> Result<String, ParseError> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start(c) => {}
            _ => return Err(self.fail("Name expected")),
        }
        let end = chars
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        let out = rest[..end].to_string();
        self.pos += end;
        Ok(out)
    }

    fn nmtoken(&mut self) -> Result<String, ParseError> {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        if end == 0 {
            return Err(self.fail("Name token expected"));
        }
        let out = rest[..end].to_string();
        self.pos += end;
        Ok(out)
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.fail("Quoted literal expected")),
        };
        self.pos += 1;
        match self.rest().find(quote) {
            Some(end) => {
                let value = self.rest()[..end].to_string();
                self.pos += end + 1;
                Ok(value)
            }
            None => Err(self.fail("Unterminated literal")),
        }
    }

    fn occurrence(&mut self) -> Occurrence {
        if self.eat("?") {
            Occurrence::Optional
        } else if self.eat("*") {
            Occurrence::ZeroOrMore
        } else if self.eat("+") {
            Occurrence::OneOrMore
        } else {
            Occurrence::Once
        }
    }

    fn element_decl(&mut self) -> Result<(String, ContentModel), ParseError> {
        self.require_ws()?;
        let name = self.name()?;
        self.require_ws()?;
        let model = if self.eat("EMPTY") {
            ContentModel::Empty
        } else if self.eat("ANY") {
            ContentModel::Any
        } else {
            self.expect("(")?;
            self.skip_ws();
            if self.eat("#PCDATA") {
                self.mixed()?
            } else {
                let kind = self.group()?;
                ContentModel::Children(Particle {
                    kind,
                    occurrence: self.occurrence(),
                })
            }
        };
        self.skip_ws();
        self.expect(">")?;
        Ok((name, model))
    }

    /// Parses the rest of `(#PCDATA ...`.
    fn mixed(&mut self) -> Result<ContentModel, ParseError> {
        let mut names = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(")") {
                break;
            }
            self.expect("|")?;
            self.skip_ws();
            names.push(self.name()?);
        }
        if !self.eat("*") && !names.is_empty() {
            return Err(self.fail("Mixed content with element names must end in ')*'"));
        }
        Ok(ContentModel::Mixed(names))
    }

    /// Parses a group body after its `(` up to and including `)`.
    fn group(&mut self) -> Result<ParticleKind, ParseError> {
        let mut items = vec![self.particle()?];
        let mut separator = None;
        loop {
            self.skip_ws();
            if self.eat(")") {
                break;
            }
            let sep = match self.peek() {
                Some(c @ (',' | '|')) => c,
                _ => return Err(self.fail("',', '|' or ')' expected in content model")),
            };
            if separator.is_some_and(|s| s != sep) {
                return Err(self.fail("Mixed ',' and '|' in one content group"));
            }
            separator = Some(sep);
            self.pos += 1;
            items.push(self.particle()?);
        }
        Ok(match separator {
            Some('|') => ParticleKind::Choice(items),
            _ => ParticleKind::Seq(items),
        })
    }

    fn particle(&mut self) -> Result<Particle, ParseError> {
        self.skip_ws();
        let kind = if self.eat("(") {
            self.group()?
        } else {
            ParticleKind::Name(self.name()?)
        };
        Ok(Particle {
            kind,
            occurrence: self.occurrence(),
        })
    }

    fn attlist_decl(&mut self) -> Result<(String, Vec<AttributeDecl>), ParseError> {
        self.require_ws()?;
        let element = self.name()?;
        let mut decls = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(">") {
                return Ok((element, decls));
            }
            let name = self.name()?;
            self.require_ws()?;
            let kind = self.attribute_type()?;
            self.require_ws()?;
            let default = if self.eat("#REQUIRED") {
                AttributeDefault::Required
            } else if self.eat("#IMPLIED") {
                AttributeDefault::Implied
            } else if self.eat("#FIXED") {
                self.require_ws()?;
                AttributeDefault::Fixed(self.quoted()?)
            } else {
                AttributeDefault::Value(self.quoted()?)
            };
            decls.push(AttributeDecl {
                name,
                kind,
                default,
            });
        }
    }

    fn attribute_type(&mut self) -> Result<AttributeType, ParseError> {
        // Longest keywords first so IDREFS is not read as ID.
        const KEYWORDS: [(&str, AttributeType); 8] = [
            ("CDATA", AttributeType::CData),
            ("IDREFS", AttributeType::IdRefs),
            ("IDREF", AttributeType::IdRef),
            ("ID", AttributeType::Id),
            ("ENTITIES", AttributeType::Entities),
            ("ENTITY", AttributeType::Entity),
            ("NMTOKENS", AttributeType::NmTokens),
            ("NMTOKEN", AttributeType::NmToken),
        ];
        if self.eat("NOTATION") {
            self.require_ws()?;
            self.expect("(")?;
            return Ok(AttributeType::Notation(self.token_list()?));
        }
        if self.eat("(") {
            return Ok(AttributeType::Enumeration(self.token_list()?));
        }
        for (keyword, kind) in KEYWORDS {
            if self.eat(keyword) {
                return Ok(kind);
            }
        }
        Err(self.fail("Attribute type expected"))
    }

    /// Parses `a | b | c)` after the opening parenthesis.
    fn token_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_ws();
            tokens.push(self.nmtoken()?);
            self.skip_ws();
            if self.eat(")") {
                return Ok(tokens);
            }
            self.expect("|")?;
        }
    }

    /// Parses an entity declaration; parameter entities are read and dropped.
    fn entity_decl(&mut self) -> Result<Option<(String, EntityDecl)>, ParseError> {
        self.require_ws()?;
        let parameter = self.eat("%");
        if parameter {
            self.require_ws()?;
        }
        let name = self.name()?;
        self.require_ws()?;
        let decl = if self.peek().is_some_and(|c| c == '"' || c == '\'') {
            EntityDecl::Internal(expand_char_refs(&self.quoted()?))
        } else {
            let public_id = if self.eat("PUBLIC") {
                self.require_ws()?;
                let id = self.quoted()?;
                self.require_ws()?;
                Some(id)
            } else {
                self.expect("SYSTEM")?;
                self.require_ws()?;
                None
            };
            EntityDecl::External {
                system_id: self.quoted()?,
                public_id,
            }
        };
        self.skip_decl()?;
        Ok((!parameter).then_some((name, decl)))
    }
}

/// Replaces `&#N;` and `&#xH;` in an entity literal; other references stay
/// for expansion at the point of use.
fn expand_char_refs(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut rest = literal;
    while let Some(at) = rest.find("&#") {
        out.push_str(&rest[..at]);
        let tail = &rest[at + 2..];
        let decoded = tail
            .find(';')
            .and_then(|end| char_reference(&tail[..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str("&#");
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decodes the digits of `&#N;` or `&#xH;`.
fn char_reference(digits: &str) -> Option<char> {
    let code = match digits.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    };
    code.and_then(char::from_u32)
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.' | '\u{B7}')
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks a document's elements and attributes against a DTD.
///
/// When the document carries a `<!DOCTYPE>`, its name must match the root
/// element. Every problem found is reported; validation never stops early.
///
/// # Examples
///
/// ```
/// use xmlgrove::validation::dtd::{parse_dtd, validate};
/// use xmlgrove::Document;
///
/// let dtd = parse_dtd("<!ELEMENT list (item+)> <!ELEMENT item (#PCDATA)>").unwrap();
/// let good = Document::parse("<list><item>a</item></list>", false).unwrap();
/// let bad = Document::parse("<list/>", false).unwrap();
/// assert!(validate(&good, &dtd).is_valid);
/// assert!(!validate(&bad, &dtd).is_valid);
/// ```
#[must_use]
pub fn validate(doc: &Document, dtd: &Dtd) -> ValidationResult {
    let mut validator = Validator {
        doc,
        dtd,
        errors: Vec::new(),
        ids: HashSet::new(),
        idrefs: Vec::new(),
    };
    if let Some(root) = doc.root_element() {
        if let (Some(doctype), Some(name)) = (&doc.doctype, doc.node_name(root)) {
            if doctype.name != name {
                validator.report(
                    root,
                    format!("root element {name} does not match DOCTYPE name {}", doctype.name),
                );
            }
        }
        validator.element(root);
        for descendant in doc.descendants(root) {
            if doc.is_element(descendant) {
                validator.element(descendant);
            }
        }
    }
    let Validator {
        mut errors,
        ids,
        idrefs,
        ..
    } = validator;
    for (node, idref) in idrefs {
        if !ids.contains(&idref) {
            errors.push(ValidationError {
                message: format!("IDREF attribute references an unknown ID \"{idref}\""),
                path: Some(path_of(doc, node)),
            });
        }
    }
    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}

struct Validator<'a> {
    doc: &'a Document,
    dtd: &'a Dtd,
    errors: Vec<ValidationError>,
    ids: HashSet<String>,
    idrefs: Vec<(NodeId, String)>,
}

impl Validator<'_> {
    fn report(&mut self, node: NodeId, message: String) {
        self.errors.push(ValidationError {
            message,
            path: Some(path_of(self.doc, node)),
        });
    }

    fn element(&mut self, node: NodeId) {
        let (doc, dtd) = (self.doc, self.dtd);
        let Some(name) = doc.node_name(node) else {
            return;
        };
        match dtd.elements.get(name) {
            Some(model) => self.content(node, name, model),
            None if !dtd.elements.is_empty() => {
                self.report(node, format!("No declaration for element {name}"));
            }
            None => {}
        }
        self.attributes(node, name);
    }

    fn content(&mut self, node: NodeId, name: &str, model: &ContentModel) {
        let doc = self.doc;
        let child_names: Vec<&str> = doc.children(node).filter_map(|c| doc.node_name(c)).collect();
        let has_text = doc
            .children(node)
            .filter_map(|c| doc.node_text(c))
            .any(|t| !t.trim_matches(is_xml_space).is_empty());
        match model {
            ContentModel::Any => {}
            ContentModel::Empty => {
                if doc.first_child(node).is_some() {
                    self.report(node, format!("Element {name} was declared EMPTY this one has content"));
                }
            }
            ContentModel::Mixed(allowed) => {
                for child in child_names {
                    if !allowed.iter().any(|a| a == child) {
                        self.report(
                            node,
                            format!("Element {child} is not declared in {name} list of possible children"),
                        );
                    }
                }
            }
            ContentModel::Children(particle) => {
                if has_text {
                    self.report(node, format!("Element {name} has element-only content but contains text"));
                }
                if !match_ends(particle, &child_names, 0).contains(&child_names.len()) {
                    self.report(
                        node,
                        format!(
                            "Element {name} content does not follow the DTD, expecting {model}, got ({})",
                            child_names.join(" ")
                        ),
                    );
                }
            }
        }
    }

    fn attributes(&mut self, node: NodeId, element: &str) {
        let (doc, dtd) = (self.doc, self.dtd);
        let declared = dtd.attributes.get(element).map_or(&[][..], Vec::as_slice);
        let element_declared = dtd.elements.contains_key(element);
        for attr in doc.attributes(node) {
            let Some(decl) = declared.iter().find(|d| d.name == attr.name) else {
                if element_declared {
                    self.report(
                        node,
                        format!("No declaration for attribute {} of element {element}", attr.name),
                    );
                }
                continue;
            };
            self.attribute_value(node, element, decl, &attr.value);
        }
        for decl in declared {
            if decl.default == AttributeDefault::Required && doc.attribute(node, &decl.name).is_none() {
                self.report(
                    node,
                    format!("Element {element} does not carry attribute {}", decl.name),
                );
            }
        }
    }

    fn attribute_value(&mut self, node: NodeId, element: &str, decl: &AttributeDecl, value: &str) {
        let name = &decl.name;
        if let AttributeDefault::Fixed(fixed) = &decl.default {
            if fixed != value {
                self.report(
                    node,
                    format!("Value for attribute {name} of {element} is different from default \"{fixed}\""),
                );
            }
        }
        let tokens = || value.split(is_xml_space).filter(|t| !t.is_empty());
        let ok = match &decl.kind {
            AttributeType::CData => true,
            AttributeType::Id => {
                if is_name(value) && !self.ids.insert(value.to_string()) {
                    self.report(node, format!("ID {value} already defined"));
                }
                is_name(value)
            }
            AttributeType::IdRef => {
                self.idrefs.push((node, value.to_string()));
                is_name(value)
            }
            AttributeType::IdRefs => {
                self.idrefs.extend(tokens().map(|t| (node, t.to_string())));
                tokens().next().is_some() && tokens().all(is_name)
            }
            AttributeType::Entity => self.is_unparsed_entity(value),
            AttributeType::Entities => {
                tokens().next().is_some() && tokens().all(|t| self.is_unparsed_entity(t))
            }
            AttributeType::NmToken => !value.is_empty() && value.chars().all(is_name_char),
            AttributeType::NmTokens => {
                tokens().next().is_some() && tokens().all(|t| t.chars().all(is_name_char))
            }
            AttributeType::Notation(allowed) | AttributeType::Enumeration(allowed) => {
                allowed.iter().any(|a| a == value)
            }
        };
        if !ok {
            self.report(
                node,
                format!("Value \"{value}\" for attribute {name} of {element} is not valid"),
            );
        }
    }

    fn is_unparsed_entity(&self, name: &str) -> bool {
        matches!(self.dtd.entities.get(name), Some(EntityDecl::External { .. }))
    }
}

/// Returns every position in `names` at which a match of `particle`
/// starting at `start` can end.
///
/// Tracking the full set keeps the matcher correct for models such as
/// `(a*, a)`, where a greedy match would consume too much.
fn match_ends(particle: &Particle, names: &[&str], start: usize) -> BTreeSet<usize> {
    let once = |from: usize| -> BTreeSet<usize> {
        match &particle.kind {
            ParticleKind::Name(expected) => names
                .get(from)
                .filter(|n| **n == expected.as_str())
                .map(|_| from + 1)
                .into_iter()
                .collect(),
            ParticleKind::Seq(items) => items.iter().fold(BTreeSet::from([from]), |reached, item| {
                reached
                    .into_iter()
                    .flat_map(|p| match_ends(item, names, p))
                    .collect()
            }),
            ParticleKind::Choice(items) => items
                .iter()
                .flat_map(|item| match_ends(item, names, from))
                .collect(),
        }
    };
    let repeat = |seed: BTreeSet<usize>| -> BTreeSet<usize> {
        let mut reached = seed.clone();
        let mut frontier: Vec<usize> = seed.into_iter().collect();
        while let Some(p) = frontier.pop() {
            for end in once(p) {
                if reached.insert(end) {
                    frontier.push(end);
                }
            }
        }
        reached
    };
    match particle.occurrence {
        Occurrence::Once => once(start),
        Occurrence::Optional => {
            let mut ends = once(start);
            ends.insert(start);
            ends
        }
        Occurrence::ZeroOrMore => repeat(BTreeSet::from([start])),
        Occurrence::OneOrMore => repeat(once(start)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    fn children(model: &str) -> Particle {
        let dtd = parse_dtd(&format!("<!ELEMENT x {model}>")).unwrap();
        match dtd.elements["x"].clone() {
            ContentModel::Children(p) => p,
            other => panic!("not element content: {other:?}"),
        }
    }

    fn accepts(model: &str, names: &[&str]) -> bool {
        match_ends(&children(model), names, 0).contains(&names.len())
    }

    #[test]
    fn test_parse_element_models() {
        let dtd = parse_dtd(
            "<!ELEMENT a EMPTY><!ELEMENT b ANY><!ELEMENT c (#PCDATA)>\
             <!ELEMENT d (#PCDATA|a|b)*><!ELEMENT e (a, (b | c)*, d?)+>",
        )
        .unwrap();
        assert_eq!(dtd.elements["a"], ContentModel::Empty);
        assert_eq!(dtd.elements["b"], ContentModel::Any);
        assert_eq!(dtd.elements["c"], ContentModel::Mixed(vec![]));
        assert_eq!(
            dtd.elements["d"],
            ContentModel::Mixed(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(dtd.elements["e"].to_string(), "(a,(b|c)*,d?)+");
    }

    #[test]
    fn test_parse_attlist() {
        let dtd = parse_dtd(
            "<!ATTLIST item id ID #REQUIRED kind (big|small) 'small' \
             ref IDREFS #IMPLIED ver CDATA #FIXED \"1\">",
        )
        .unwrap();
        let decls = &dtd.attributes["item"];
        assert_eq!(decls.len(), 4);
        assert_eq!(decls[0].kind, AttributeType::Id);
        assert_eq!(decls[0].default, AttributeDefault::Required);
        assert_eq!(
            decls[1].kind,
            AttributeType::Enumeration(vec!["big".to_string(), "small".to_string()])
        );
        assert_eq!(decls[1].default, AttributeDefault::Value("small".to_string()));
        assert_eq!(decls[2].kind, AttributeType::IdRefs);
        assert_eq!(decls[3].default, AttributeDefault::Fixed("1".to_string()));
    }

    #[test]
    fn test_parse_entities() {
        let dtd = parse_dtd(
            "<!ENTITY copy '&#169; ACME'>\
             <!ENTITY logo SYSTEM 'logo.png' NDATA png>\
             <!ENTITY % pe 'ignored'>\
             <!ENTITY copy 'second'>",
        )
        .unwrap();
        assert_eq!(dtd.entities["copy"], EntityDecl::Internal("\u{A9} ACME".to_string()));
        assert!(matches!(dtd.entities["logo"], EntityDecl::External { .. }));
        assert!(!dtd.entities.contains_key("pe"));
        assert_eq!(dtd.expand_entities(10).len(), 1);
    }

    #[test]
    fn test_scanner_names_and_tokens() {
        let mut scanner = Scanner {
            input: "caf\u{E9}:x-1>rest",
            pos: 0,
        };
        assert_eq!(scanner.name().unwrap(), "caf\u{E9}:x-1");
        assert!(scanner.eat(">"));
        assert_eq!(scanner.rest(), "rest");

        let mut scanner = Scanner {
            input: "1.5a|b",
            pos: 0,
        };
        assert!(scanner.name().is_err());
        assert_eq!(scanner.nmtoken().unwrap(), "1.5a");
        assert!(scanner.nmtoken().is_err());
        assert!(scanner.eat("|"));
        assert_eq!(scanner.nmtoken().unwrap(), "b");
        assert!(scanner.at_end());

        let dtd = parse_dtd("<!ATTLIST r v (1st|2nd) '2nd'>").unwrap();
        assert_eq!(
            dtd.attributes["r"][0].kind,
            AttributeType::Enumeration(vec!["1st".to_string(), "2nd".to_string()])
        );
    }

    #[test]
    fn test_parse_skips_comments_pis_notations() {
        let dtd = parse_dtd(
            "<!-- c --><?pi x?><!NOTATION png SYSTEM 'image/png'>%ext;<!ELEMENT r ANY>",
        )
        .unwrap();
        assert!(dtd.elements.contains_key("r"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_dtd("<!ELEMENT>").is_err());
        assert!(parse_dtd("<!ELEMENT a (b, c | d)>").is_err());
        assert!(parse_dtd("<!ELEMENT a (#PCDATA|b)>").is_err());
        assert!(parse_dtd("<!ELEMENT a ANY><!ELEMENT a EMPTY>").is_err());
        assert!(parse_dtd("garbage").is_err());
        let err = parse_dtd("\n<!ATTLIST a b BOGUS #IMPLIED>").unwrap_err();
        assert_eq!(err.location.line, 2);
    }

    #[test]
    fn test_content_matching() {
        assert!(accepts("(a, b)", &["a", "b"]));
        assert!(!accepts("(a, b)", &["b", "a"]));
        assert!(accepts("(a | b)+", &["b", "a", "b"]));
        assert!(accepts("(a*, a)", &["a", "a", "a"]));
        assert!(!accepts("(a*, a)", &[]));
        assert!(accepts("(a?, b*)", &[]));
        assert!(accepts("((a, b)*, c)", &["a", "b", "a", "b", "c"]));
        assert!(!accepts("((a, b)*, c)", &["a", "c"]));
    }

    #[test]
    fn test_char_refs_in_literals() {
        assert_eq!(expand_char_refs("a&#65;&#x42;c"), "aABc");
        assert_eq!(expand_char_refs("&amp; &#bad;"), "&amp; &#bad;");
    }

    #[test]
    fn test_nested_entities_expand() {
        let dtd = parse_dtd(
            "<!ENTITY c 'z'><!ENTITY b '&c;&lt;'><!ENTITY a '&b;y&#38;#65;'>",
        )
        .unwrap();
        let expanded = dtd.expand_entities(DEFAULT_MAX_ENTITY_EXPANSIONS);
        let a = expanded["a"].as_ref().unwrap();
        assert_eq!(a.text, "z<yA");
        assert_eq!(a.expansions, 3);
        assert_eq!(a.depth, 3);
    }

    #[test]
    fn test_entity_loops_fail() {
        let dtd = parse_dtd(
            "<!ENTITY self 'x&self;'><!ENTITY ping '&pong;'><!ENTITY pong '&ping;'>\
             <!ENTITY ok 'fine'>",
        )
        .unwrap();
        let expanded = dtd.expand_entities(DEFAULT_MAX_ENTITY_EXPANSIONS);
        assert_eq!(
            expanded["self"],
            Err(EntityError::Loop("self".to_string()))
        );
        assert!(expanded["ping"].is_err());
        assert!(expanded["pong"].is_err());
        assert_eq!(expanded["ok"].as_ref().unwrap().text, "fine");
    }

    #[test]
    fn test_undeclared_and_external_references_fail() {
        let dtd = parse_dtd(
            "<!ENTITY a '&missing;'><!ENTITY ext SYSTEM 'x.ent'><!ENTITY b '&ext;'>",
        )
        .unwrap();
        let expanded = dtd.expand_entities(DEFAULT_MAX_ENTITY_EXPANSIONS);
        assert_eq!(expanded["a"], Err(EntityError::Undefined("missing".to_string())));
        assert_eq!(expanded["b"], Err(EntityError::External("ext".to_string())));
        assert!(!expanded.contains_key("ext"));
    }

    #[test]
    fn test_entity_nesting_is_capped() {
        let mut subset = String::from("<!ENTITY e0 'end'>");
        for level in 1..=60 {
            subset.push_str(&format!("<!ENTITY e{level} '&e{};'>", level - 1));
        }
        let expanded = parse_dtd(&subset)
            .unwrap()
            .expand_entities(DEFAULT_MAX_ENTITY_EXPANSIONS);
        assert_eq!(expanded["e39"].as_ref().unwrap().text, "end");
        assert_eq!(expanded["e39"].as_ref().unwrap().depth, 40);
        assert!(expanded["e40"].is_err());
        assert_eq!(
            expanded["e60"],
            Err(EntityError::TooDeep)
        );
    }

    #[test]
    fn test_exponential_entities_hit_the_limit() {
        let mut subset = String::from("<!ENTITY l0 'lol'>");
        for level in 1..10 {
            let prev = format!("&l{};", level - 1);
            subset.push_str(&format!("<!ENTITY l{level} '{}'>", prev.repeat(10)));
        }
        let expanded = parse_dtd(&subset)
            .unwrap()
            .expand_entities(DEFAULT_MAX_ENTITY_EXPANSIONS);
        assert_eq!(expanded["l3"].as_ref().unwrap().expansions, 1110);
        assert_eq!(expanded["l9"], Err(EntityError::LimitExceeded(10_000)));
        assert_eq!(
            expanded["l4"].as_ref().unwrap_err().to_string(),
            "entity expansion limit exceeded (10000)"
        );
    }
}
