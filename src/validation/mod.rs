//! Document validation against DTDs.
//!
//! [`dtd`] holds the declaration model, its parser and the validator. This
//! module holds the shared result types and the two document-level entry
//! points, [`Document::validate_dtd`] and [`Document::add_dtd`].

pub mod dtd;

use std::fmt;

use crate::error::{Result, XmlError};
use crate::tree::{Doctype, Document};

/// Outcome of validating a document.
///
/// # Examples
///
/// ```
/// use xmlgrove::validation::ValidationResult;
///
/// let result = ValidationResult {
///     is_valid: true,
///     errors: vec![],
/// };
/// assert_eq!(result.to_string(), "valid");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// `true` when no errors were found.
    pub is_valid: bool,
    /// Every violation found, in document order.
    pub errors: Vec<ValidationError>,
}

/// One validity violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// What is wrong.
    pub message: String,
    /// Path of the offending element, when there is one.
    pub path: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            f.write_str("valid")
        } else {
            write!(f, "invalid ({} error(s))", self.errors.len())
        }
    }
}

impl ValidationResult {
    /// Joins every error message, one per line.
    #[must_use]
    pub fn report(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Document {
    /// Validates the document against DTD text without changing it.
    ///
    /// On failure the diagnostic is also kept as the document's last error;
    /// success clears it.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadDtd`] if the DTD is malformed or the document
    /// does not conform to it.
    pub fn validate_dtd(&mut self, dtd_text: &str) -> Result<()> {
        let outcome = dtd::parse_dtd(dtd_text)
            .map_err(|e| e.to_string())
            .and_then(|parsed| {
                let result = dtd::validate(self, &parsed);
                if result.is_valid {
                    Ok(())
                } else {
                    Err(result.report())
                }
            });
        match outcome {
            Ok(()) => {
                self.clear_last_error();
                Ok(())
            }
            Err(report) => {
                self.set_last_error(report.clone());
                Err(XmlError::BadDtd(report))
            }
        }
    }

    /// Validates the document against DTD text and, if it conforms, attaches
    /// the DTD as the document's internal subset.
    ///
    /// A document without a `<!DOCTYPE>` gets one named after its root
    /// element.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BadDtd`] as [`validate_dtd`](Self::validate_dtd)
    /// does; the document is left unchanged.
    pub fn add_dtd(&mut self, dtd_text: &str) -> Result<()> {
        self.validate_dtd(dtd_text)?;
        let subset = Some(dtd_text.trim().to_string());
        match &mut self.doctype {
            Some(doctype) => doctype.internal_subset = subset,
            None => {
                let name = self
                    .root_element()
                    .and_then(|root| self.node_name(root))
                    .unwrap_or_default()
                    .to_string();
                self.doctype = Some(Doctype {
                    name,
                    public_id: None,
                    system_id: None,
                    internal_subset: subset,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const DTD: &str = "<!ELEMENT books (book*)>\n\
                       <!ELEMENT book (#PCDATA)>\n\
                       <!ATTLIST book id ID #REQUIRED>";

    #[test]
    fn test_validation_error_display() {
        let located = ValidationError {
            message: "No declaration for element x".to_string(),
            path: Some("/r/x".to_string()),
        };
        assert_eq!(located.to_string(), "/r/x: No declaration for element x");
        let bare = ValidationError {
            message: "duplicate ID".to_string(),
            path: None,
        };
        assert_eq!(bare.to_string(), "duplicate ID");
    }

    #[test]
    fn test_validate_dtd_accepts_conforming_document() {
        let mut doc = Document::parse(r#"<books><book id="a">x</book></books>"#, false).unwrap();
        assert_eq!(doc.validate_dtd(DTD), Ok(()));
        assert_eq!(doc.last_error(), None);
        assert!(doc.doctype.is_none());
    }

    #[test]
    fn test_validate_dtd_reports_and_records_errors() {
        let mut doc = Document::parse("<books><book>x</book><pamphlet/></books>", false).unwrap();
        let err = doc.validate_dtd(DTD).unwrap_err();
        let XmlError::BadDtd(report) = &err else {
            panic!("unexpected error {err:?}");
        };
        assert!(report.contains("does not carry attribute id"));
        assert!(report.contains("No declaration for element pamphlet"));
        assert_eq!(doc.last_error(), Some(report.as_str()));
    }

    #[test]
    fn test_malformed_dtd_is_bad_dtd() {
        let mut doc = Document::parse("<books/>", false).unwrap();
        assert!(matches!(doc.validate_dtd("<!ELEMENT books"), Err(XmlError::BadDtd(_))));
        assert!(doc.last_error().is_some());
    }

    #[test]
    fn test_add_dtd_attaches_internal_subset() {
        let mut doc = Document::parse(r#"<books><book id="a">x</book></books>"#, false).unwrap();
        doc.add_dtd(DTD).unwrap();
        let doctype = doc.doctype.clone().unwrap();
        assert_eq!(doctype.name, "books");
        assert_eq!(doctype.internal_subset.as_deref(), Some(DTD));
        assert!(doc.serialize(doc.root(), false).contains("<!DOCTYPE books ["));
    }

    #[test]
    fn test_add_dtd_leaves_invalid_document_untouched() {
        let mut doc = Document::parse("<books><book/></books>", false).unwrap();
        assert!(doc.add_dtd(DTD).is_err());
        assert!(doc.doctype.is_none());
    }
}
