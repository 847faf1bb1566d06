//! Structured errors for procfs stat parsing.
//!
//! [`StatParseError`] carries enough context (key, value, line number) to
//! pinpoint the offending line of a procfs file. It converts into
//! [`std::io::Error`] with [`std::io::ErrorKind::InvalidData`] so the parsing
//! traits can keep plain `io::Result` signatures.

use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatParseError {
    #[error("duplicate field '{field}' at line {line}")]
    DuplicateField { field: String, line: usize },

    #[error("invalid value for '{key}' at line {line}: '{value}': {source}")]
    InvalidKeyValue {
        key: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid value at line {line}: '{value}': {source}")]
    InvalidValue {
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("malformed stat line {line}: '{content}'")]
    MalformedLine { content: String, line: usize },

    #[error("error during I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StatParseError> for std::io::Error {
    fn from(err: StatParseError) -> Self {
        match err {
            StatParseError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

/// Extracts a `StatParseError` from an `std::io::Error` assuming it was wrapped.
///
/// Panics if the inner error is not a `StatParseError`. Intended for use in test assertions only.
#[cfg(test)]
pub(super) fn extract_stat_parse_error(err: &std::io::Error) -> &StatParseError {
    err.get_ref()
        .and_then(|e| e.downcast_ref::<StatParseError>())
        .unwrap()
}
