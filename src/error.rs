//! Error handling for pdfgraph

use std::fmt;
use std::io;
use thiserror::Error;

use crate::pdf::object::ObjRef;

/// The main error type for pdfgraph operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Structural error at offset {offset}: {message}")]
    Structural { offset: u64, message: String },
    #[error("Cross-reference error: {0}")]
    Index(String),
    #[error("Unresolved reference {0}")]
    Resolution(ObjRef),
    #[error("Type error: {0}")]
    Type(String),
    #[error("Invariant violation: {0}")]
    Invariant(String),
    #[error("Filter error: {0}")]
    Filter(String),
    #[error("Encryption error: {0}")]
    Encryption(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("System error: {0}")]
    System(#[from] io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Unexpected end of file")]
    Eof,
}

impl Error {
    pub fn structural<S: Into<String>>(offset: u64, msg: S) -> Self {
        Error::Structural {
            offset,
            message: msg.into(),
        }
    }
    pub fn index<S: Into<String>>(msg: S) -> Self {
        Error::Index(msg.into())
    }
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        Error::Type(msg.into())
    }
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        Error::Invariant(msg.into())
    }
    pub fn filter<S: Into<String>>(msg: S) -> Self {
        Error::Filter(msg.into())
    }
    pub fn encryption<S: Into<String>>(msg: S) -> Self {
        Error::Encryption(msg.into())
    }
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Whether a parser may skip past this error and keep going.
    ///
    /// Invariant violations are never recoverable: continuing would emit a
    /// self-contradictory file.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Structural { .. }
                | Error::Index(_)
                | Error::Resolution(_)
                | Error::Filter(_)
                | Error::Eof
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal problem noticed while parsing or resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub offset: Option<u64>,
    pub message: String,
}

impl Diagnostic {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            offset: None,
            message: message.into(),
        }
    }

    pub fn at<S: Into<String>>(offset: u64, message: S) -> Self {
        Self {
            offset: Some(offset),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (at offset {})", self.message, offset),
            None => f.write_str(&self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_structural() {
        let e = Error::structural(42, "missing endobj");
        assert!(matches!(e, Error::Structural { offset: 42, .. }));
        assert!(format!("{}", e).contains("offset 42"));
        assert!(e.is_recoverable());
    }

    #[test]
    fn test_error_index() {
        let e = Error::index("W must have three entries");
        assert!(matches!(e, Error::Index(_)));
        assert!(format!("{}", e).contains("W must have"));
    }

    #[test]
    fn test_error_resolution() {
        let e = Error::Resolution(ObjRef::new(7, 0));
        assert_eq!(format!("{}", e), "Unresolved reference 7 0 R");
    }

    #[test]
    fn test_error_invariant_is_fatal() {
        let e = Error::invariant("duplicate object 3 0");
        assert!(!e.is_recoverable());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::System(_)));
    }

    #[test]
    fn test_diagnostic_display() {
        assert_eq!(Diagnostic::new("bad").to_string(), "bad");
        assert_eq!(Diagnostic::at(10, "bad").to_string(), "bad (at offset 10)");
    }
}
