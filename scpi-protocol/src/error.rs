use std::{
    io,
    num::{ParseFloatError, ParseIntError},
    str::Utf8Error,
    time::Duration,
};

use thiserror::Error;

use crate::definition::FieldType;

/// Result type used throughout the SCPI crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that may occur anywhere in the client or server stack.
///
/// A single error type is shared by every layer so that a failure in the framer
/// surfaces unchanged through the SCPI and attribute layers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("Timed out waiting for a response (timeout is {0:?})")]
    Timeout(Duration),

    /// An arbitrary block unit carried more payload bytes than its header declared.
    #[error(
        "Framing error: arbitrary block header declared {declared} payload bytes, but {observed} were received"
    )]
    BlockLength { declared: usize, observed: usize },

    #[error("Unit too large! Maximum is {max}, but got {got}")]
    TooManyBytes { max: usize, got: usize },

    #[error(
        "Mismatch: unpacked {} value(s): {values:?} but {} field(s) were provided: {fields:?}",
        .values.len(),
        .fields.len()
    )]
    CountMismatch {
        values: Vec<String>,
        fields: Vec<String>,
    },

    #[error("Field {field} declares unknown field type '{field_type}'")]
    UnknownFieldType { field: String, field_type: String },

    #[error("Cannot unmarshall SCPI field {field} with field type {field_type}")]
    UnsupportedFieldType { field: String, field_type: FieldType },

    #[error("Malformed value for arbitrary_block field {field} does not start with '#'")]
    BlockMarker { field: String },

    #[error("Received {received} bytes, expected {expected} for arbitrary_block field {field}")]
    BlockSize {
        field: String,
        expected: usize,
        received: usize,
    },

    #[error("Invalid value '{value}' for {expected} field {field}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Unknown attribute {0}")]
    UnknownAttribute(String),

    #[error("Attribute {0} has no read binding")]
    NotReadable(String),

    #[error("Attribute {0} has no write binding")]
    NotWritable(String),

    #[error("Received a value for unknown SCPI field {0}")]
    UnknownField(String),

    #[error("Set operation on {0} requires an argument")]
    MissingArgument(String),

    #[error("{0}")]
    InvalidFormat(String),

    #[error("Invalid interface definition: {0}")]
    Definition(String),

    #[error("Attribute handler failed: {0}")]
    Handler(String),
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::InvalidFormat(format!("Invalid UTF8: {}", value))
    }
}

impl From<ParseIntError> for Error {
    fn from(value: ParseIntError) -> Self {
        Error::InvalidFormat(format!("Invalid integer: {}", value))
    }
}

impl From<ParseFloatError> for Error {
    fn from(value: ParseFloatError) -> Self {
        Error::InvalidFormat(format!("Invalid float: {}", value))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Error::Definition(value.to_string())
    }
}

impl Error {
    /// Whether this error is a transport timeout that a caller may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

#[test]
fn count_mismatch_names_both_lists() {
    let err = Error::CountMismatch {
        values: vec!["1".into(), "2".into()],
        fields: vec!["A".into(), "B".into(), "C".into()],
    };
    assert_eq!(
        err.to_string(),
        r#"Mismatch: unpacked 2 value(s): ["1", "2"] but 3 field(s) were provided: ["A", "B", "C"]"#
    );
}
