//! Error types of the sampling engine
//!
//! Failures are split along the pipeline: the raw reader reports I/O trouble
//! as a `ReadError`, schema parsers report text they cannot make sense of as
//! a `ParseError`, and the sampler wraps both into an `Error` which also
//! covers misuse of the sampling API. None of these is fatal to a sampler: a
//! failed tick is just a tick without a sample.

use crate::pseudo_file::{AccessMode, SchemaId};
use std::io;
use std::path::PathBuf;


/// Failure to fetch the contents of a pseudo-file
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The file does not exist (anymore). For process-scoped files, this
    /// usually means that the process exited, which ends the session.
    #[error("{0} does not exist")]
    NotFound(PathBuf),

    /// The file is restricted to a higher privilege level. Retrying is
    /// pointless unless privileges change.
    #[error("access to {0} was denied")]
    PermissionDenied(PathBuf),

    /// The kernel asked us to come back later, twice in a row
    #[error("transient failure while reading {path}")]
    TransientReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file grew beyond the configured maximum buffer size
    #[error("{path} is larger than the {limit} bytes read limit")]
    Truncated { path: PathBuf, limit: usize },

    /// Any other I/O error
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}


/// Failure to make sense of the contents of a pseudo-file
///
/// Field names are the ones used by the kernel whenever possible, with a
/// record prefix when the same field name appears on several lines (e.g.
/// "cpu3.idle" or "intr[12]").
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A line did not have the structure that its grammar requires
    #[error("line {0} is malformed: {1:?}")]
    MalformedLine(usize, String),

    /// A field that the record cannot do without was not found
    #[error("required field {0} is missing")]
    MissingField(String),

    /// A field was found, but its text could not be parsed
    #[error("field {0} has invalid value {1:?}")]
    InvalidValue(String, String),

    /// The file contents are not text (index of the first invalid byte)
    #[error("file contents are not valid UTF-8 (first bad byte at {0})")]
    InvalidEncoding(usize),
}
//
impl ParseError {
    /// Shorthand for reporting a missing field
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        ParseError::MissingField(field.into())
    }

    /// Shorthand for reporting an unparseable field
    pub(crate) fn invalid(field: impl Into<String>, raw: &str) -> Self {
        ParseError::InvalidValue(field.into(), raw.to_owned())
    }
}


/// Everything that can go wrong during one sampler tick
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pseudo-file could not be read
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The pseudo-file was read, but not understood
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// Continuous sampling was requested on a one-shot pseudo-file
    #[error("{path} is configured for {mode:?} access")]
    ModeMismatch { path: PathBuf, mode: AccessMode },

    /// A sampler was built for a pseudo-file of another kind
    #[error("expected a {expected:?} pseudo-file, got a {found:?} one")]
    SchemaMismatch { expected: SchemaId, found: SchemaId },

    /// A process path was requested for a system-wide pseudo-file
    #[error("{0:?} is not a per-process pseudo-file")]
    NotProcessScoped(SchemaId),
}
//
impl Error {
    /// Truth that the underlying pseudo-file vanished, which for per-process
    /// files means that the monitored process is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Read(ReadError::NotFound(_)))
    }

    /// Access the parse error behind this error, if that is what it is
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            Error::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::{Error, ParseError, ReadError};
    use std::path::PathBuf;

    /// Check that error messages name what went wrong
    #[test]
    fn messages() {
        let missing = ParseError::missing("ctxt");
        assert_eq!(missing.to_string(), "required field ctxt is missing");

        let invalid = ParseError::invalid("cpu0.user", "12a");
        assert_eq!(invalid.to_string(),
                   "field cpu0.user has invalid value \"12a\"");

        let truncated = ReadError::Truncated {
            path: PathBuf::from("/proc/stat"),
            limit: 16,
        };
        assert_eq!(truncated.to_string(),
                   "/proc/stat is larger than the 16 bytes read limit");
    }

    /// Check the error classification helpers
    #[test]
    fn classification() {
        let gone = Error::from(ReadError::NotFound(PathBuf::from("/proc/1")));
        assert!(gone.is_not_found());
        assert_eq!(gone.parse_error(), None);

        let parse = Error::Parse {
            path: PathBuf::from("/proc/uptime"),
            source: ParseError::missing("idle"),
        };
        assert!(!parse.is_not_found());
        assert_eq!(parse.parse_error(), Some(&ParseError::missing("idle")));
    }
}
