//! Error types and diagnostics.
//!
//! Two layers live here. [`ParseError`] and [`ParseDiagnostic`] describe what
//! the XML engine found in a piece of text, with line/column positions.
//! [`XmlError`] is the closed set of failures every document operation can
//! report; its `Display` form is the exact text handed back across the
//! string command boundary.

use std::fmt;

use thiserror::Error;

/// Severity level for a parse diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Informational; the input was accepted as written.
    Warning,
    /// The input was malformed but tolerant parsing carried on.
    Error,
    /// Parsing stopped here.
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal error",
        })
    }
}

/// Position within a text input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number, counted in characters.
    pub column: u32,
    /// 0-based byte offset from the start of the input.
    pub byte_offset: usize,
}

impl SourceLocation {
    /// Computes the line and column of `byte_offset` within `input`.
    ///
    /// Offsets past the end are clamped to the end of the input.
    #[must_use]
    pub fn at(input: &str, byte_offset: usize) -> Self {
        let mut end = byte_offset.min(input.len());
        while !input.is_char_boundary(end) {
            end -= 1;
        }
        let before = &input[..end];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |p| p + 1);
        let column = before[line_start..].chars().count() + 1;
        Self {
            line: u32::try_from(line).unwrap_or(u32::MAX),
            column: u32::try_from(column).unwrap_or(u32::MAX),
            byte_offset: end,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One problem reported while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    /// How bad it was.
    pub severity: ErrorSeverity,
    /// Human-readable message.
    pub message: String,
    /// Where it happened.
    pub location: SourceLocation,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.severity, self.message)
    }
}

/// Failure of the XML engine to turn text into a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: {message}")]
pub struct ParseError {
    /// The message for the error that stopped parsing.
    pub message: String,
    /// Where parsing stopped.
    pub location: SourceLocation,
    /// Everything reported before the fatal error.
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseError {
    /// Creates a fatal error at `location` with no earlier diagnostics.
    #[must_use]
    pub fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
            diagnostics: Vec::new(),
        }
    }
}

/// Every way a document operation can fail.
///
/// All variants are recoverable and carry no partial results: an operation
/// that fails leaves every document exactly as it found it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    /// The call had the wrong number or shape of arguments.
    #[error("xmlerr, invalid number of arguments")]
    BadArguments,
    /// The XML engine rejected the text; carries its diagnostic.
    #[error("xmlerr, can't parse xml\n{0}")]
    BadXml(String),
    /// A path did not resolve to a node.
    #[error("xmlerr, can't find element")]
    BadElement,
    /// An attribute was missing or could not be written.
    #[error("xmlerr, can't find attribute")]
    BadAttribute,
    /// No live document has this id.
    #[error("xmlerr, bad document id")]
    BadDocId,
    /// A DTD was malformed or the document did not conform to it.
    #[error("xmlerr, validation error\n{0}")]
    BadDtd(String),
    /// A node would have been moved into its own subtree.
    #[error("xmlerr, can't move node into itself")]
    BadMove,
    /// A copy would have been placed into the source's own subtree.
    #[error("xmlerr, can't copy node into itself")]
    BadCopy,
    /// The file access policy refused the path.
    #[error("xmlerr, file access not permitted")]
    NoFilePermission,
}

impl From<ParseError> for XmlError {
    fn from(err: ParseError) -> Self {
        Self::BadXml(err.to_string())
    }
}

/// Shorthand for results of document operations.
pub type Result<T, E = XmlError> = std::result::Result<T, E>;
