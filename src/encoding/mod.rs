//! Decoding of document bytes read from files.
//!
//! Text handed to the engine is always UTF-8. File contents are decoded by
//! looking first at a byte order mark and then at the `encoding` pseudo
//! attribute of the XML declaration, with `encoding_rs` doing the actual
//! transcoding.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use thiserror::Error;

/// Bytes that could not be turned into UTF-8 text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("encoding error: {message}")]
pub struct EncodingError {
    /// What went wrong.
    pub message: String,
}

impl EncodingError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Returns the encoding announced by a byte order mark and the BOM length.
///
/// # Examples
///
/// ```
/// use xmlgrove::encoding::sniff_bom;
///
/// let (enc, skip) = sniff_bom(b"\xFF\xFE<\x00");
/// assert_eq!(enc.map(|e| e.name()), Some("UTF-16LE"));
/// assert_eq!(skip, 2);
/// assert_eq!(sniff_bom(b"<root/>").0, None);
/// ```
#[must_use]
pub fn sniff_bom(bytes: &[u8]) -> (Option<&'static Encoding>, usize) {
    match Encoding::for_bom(bytes) {
        Some((encoding, len)) => (Some(encoding), len),
        None => (None, 0),
    }
}

/// Decodes raw document bytes into UTF-8 text.
///
/// A BOM wins over everything else. Without one, the bytes are read as
/// UTF-8 unless the XML declaration names another encoding that
/// `encoding_rs` knows.
///
/// # Errors
///
/// Returns `EncodingError` if the declared encoding is unknown or the bytes
/// are malformed for the chosen encoding.
pub fn decode_to_utf8(bytes: &[u8]) -> Result<String, EncodingError> {
    let (bom, skip) = sniff_bom(bytes);
    let body = &bytes[skip..];
    let encoding = match bom {
        Some(encoding) => encoding,
        None => match declared_encoding(body) {
            Some(label) => Encoding::for_label(label.as_bytes())
                .ok_or_else(|| EncodingError::new(format!("unsupported encoding {label}")))?,
            None => UTF_8,
        },
    };
    // A declaration claiming UTF-16 on a BOM-less ASCII-compatible stream
    // cannot be right; read it as UTF-8.
    let encoding = if bom.is_none() && (encoding == UTF_16LE || encoding == UTF_16BE) {
        UTF_8
    } else {
        encoding
    };
    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    if had_errors {
        return Err(EncodingError::new(format!(
            "input is not valid {}",
            encoding.name()
        )));
    }
    Ok(text.into_owned())
}

/// Reads the `encoding` value out of a leading `<?xml ...?>` declaration.
///
/// The declaration is ASCII in every encoding this path handles, so the
/// scan works on raw bytes.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = bytes.strip_prefix(b"<?xml")?;
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&head[..end]).ok()?;
    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    Some(value[..value.find(quote)?].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_utf8() {
        assert_eq!(decode_to_utf8(b"<r>caf\xC3\xA9</r>").ok().as_deref(), Some("<r>café</r>"));
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        assert_eq!(decode_to_utf8(b"\xEF\xBB\xBF<r/>").ok().as_deref(), Some("<r/>"));
    }

    #[test]
    fn test_utf16le_with_bom() {
        let bytes = b"\xFF\xFE<\x00r\x00/\x00>\x00";
        assert_eq!(decode_to_utf8(bytes).ok().as_deref(), Some("<r/>"));
    }

    #[test]
    fn test_declared_latin1() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r>\xE9</r>";
        let text = decode_to_utf8(bytes).ok();
        assert!(text.is_some_and(|t| t.ends_with("<r>é</r>")));
    }

    #[test]
    fn test_unknown_declared_encoding() {
        let err = decode_to_utf8(b"<?xml version='1.0' encoding='x-klingon'?><r/>");
        assert!(err.is_err_and(|e| e.message.contains("x-klingon")));
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(decode_to_utf8(b"<r>\xC3</r>").is_err());
    }

    #[test]
    fn test_declared_encoding_scan() {
        assert_eq!(
            declared_encoding(b"<?xml version='1.0' encoding = 'UTF-8' ?>").as_deref(),
            Some("UTF-8")
        );
        assert_eq!(declared_encoding(b"<?xml version='1.0'?>"), None);
        assert_eq!(declared_encoding(b"<r/>"), None);
    }
}
