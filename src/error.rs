//! Error types for the layout analysis library.
//!
//! This module defines all error types that can occur while reading
//! extraction XML, analyzing page layout, and serializing documents.

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during document processing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed XML in an extraction file
    #[error("XML error in {file}: {source}")]
    Xml {
        /// Path of the offending input file
        file: String,
        /// Underlying quick-xml error
        #[source]
        source: quick_xml::Error,
    },

    /// An XML attribute failed numeric conversion
    #[error("Invalid attribute {attribute}={value:?} on <{element}> in {file}")]
    InvalidAttribute {
        /// Path of the offending input file
        file: String,
        /// Element carrying the attribute
        element: String,
        /// Attribute name
        attribute: String,
        /// Raw attribute value
        value: String,
    },

    /// A required XML attribute is absent
    #[error("Missing attribute {attribute} on <{element}> in {file}")]
    MissingAttribute {
        /// Path of the offending input file
        file: String,
        /// Element expected to carry the attribute
        element: String,
        /// Attribute name
        attribute: String,
    },

    /// A serialized document line could not be parsed
    #[error("Malformed document line {lineno}: {reason}")]
    MalformedLine {
        /// 1-based line number in the serialized file
        lineno: usize,
        /// Reason for the failure
        reason: String,
    },

    /// A data line appeared before any block header
    #[error("Line record before any block header at line {0}")]
    OrphanLine(usize),

    /// Unknown text encoding label
    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    /// IGT span sidecar record is malformed
    #[error("Malformed span record: {0:?}")]
    MalformedSpan(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_attribute_error() {
        let err = Error::InvalidAttribute {
            file: "doc.xml".to_string(),
            element: "Page".to_string(),
            attribute: "width".to_string(),
            value: "wide".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("width"));
        assert!(msg.contains("Page"));
        assert!(msg.contains("doc.xml"));
    }

    #[test]
    fn test_malformed_line_error() {
        let err = Error::MalformedLine {
            lineno: 12,
            reason: "no preamble separator".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("12"));
        assert!(msg.contains("no preamble separator"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
