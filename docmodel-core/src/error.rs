//! Error types and result types for document mapping and store operations.
//!
//! This module provides error handling for every layer of the crate, from field
//! validation up to storage commands. Use [`DocumentStoreResult<T>`] as the return
//! type for fallible operations.
//!
//! Validation failures are never reported as bare strings: they carry an
//! [`ErrorMessages`] tree keyed by field name (and by list index or dict key for
//! nested values), so callers can attribute every message to the value that caused it.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

/// Key under which messages that belong to the whole value are kept when merged
/// with keyed messages.
pub const SCHEMA_KEY: &str = "_schema";

/// Structured validation messages.
///
/// Either a flat list of messages for a single value, or a map from field name
/// (or list index / dict key) to the nested messages for that entry.
///
/// # Example
///
/// ```ignore
/// use docmodel::error::ErrorMessages;
///
/// let errors = ErrorMessages::field("nick", ErrorMessages::message("Field value must be unique."));
/// assert_eq!(errors.get("nick").unwrap().messages(), ["Field value must be unique."]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorMessages {
    /// Messages attached directly to a value.
    Messages(Vec<String>),
    /// Messages keyed by field name, list index or dict key.
    Fields(BTreeMap<String, ErrorMessages>),
}

impl ErrorMessages {
    /// Creates a single-message error.
    pub fn message(message: impl Into<String>) -> Self {
        ErrorMessages::Messages(vec![message.into()])
    }

    /// Creates an error with a single keyed entry.
    pub fn field(key: impl Into<String>, messages: ErrorMessages) -> Self {
        ErrorMessages::Fields(BTreeMap::from([(key.into(), messages)]))
    }

    /// Returns the nested messages for `key`, if this is a keyed error.
    pub fn get(&self, key: &str) -> Option<&ErrorMessages> {
        match self {
            ErrorMessages::Fields(fields) => fields.get(key),
            ErrorMessages::Messages(_) => None,
        }
    }

    /// Returns the flat messages, or an empty slice for keyed errors.
    pub fn messages(&self) -> &[String] {
        match self {
            ErrorMessages::Messages(messages) => messages,
            ErrorMessages::Fields(_) => &[],
        }
    }

    /// Returns `true` if there is nothing to report.
    pub fn is_empty(&self) -> bool {
        match self {
            ErrorMessages::Messages(messages) => messages.is_empty(),
            ErrorMessages::Fields(fields) => fields.is_empty(),
        }
    }

    /// Merges `other` into this error.
    ///
    /// Lists are concatenated and keyed maps are merged recursively. When a flat
    /// list meets a keyed map, the list is kept under the `_schema` key.
    pub fn merge(&mut self, other: ErrorMessages) {
        match other {
            ErrorMessages::Messages(right) => match self {
                ErrorMessages::Messages(left) => left.extend(right),
                ErrorMessages::Fields(left) => left
                    .entry(SCHEMA_KEY.to_string())
                    .or_insert_with(|| ErrorMessages::Messages(vec![]))
                    .merge(ErrorMessages::Messages(right)),
            },
            ErrorMessages::Fields(right) => {
                if let ErrorMessages::Messages(left) = self {
                    let left = std::mem::take(left);
                    let mut fields = BTreeMap::new();

                    if !left.is_empty() {
                        fields.insert(SCHEMA_KEY.to_string(), ErrorMessages::Messages(left));
                    }

                    *self = ErrorMessages::Fields(fields);
                }

                if let ErrorMessages::Fields(left) = self {
                    for (key, value) in right {
                        match left.get_mut(&key) {
                            Some(existing) => existing.merge(value),
                            None => {
                                left.insert(key, value);
                            }
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Display for ErrorMessages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMessages::Messages(messages) => write!(f, "{messages:?}"),
            ErrorMessages::Fields(fields) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Accumulates keyed validation errors while walking a set of fields.
#[derive(Debug, Default)]
pub(crate) struct ErrorCollector {
    errors: BTreeMap<String, ErrorMessages>,
}

impl ErrorCollector {
    pub(crate) fn add(&mut self, key: impl Into<String>, messages: ErrorMessages) {
        let key = key.into();

        match self.errors.get_mut(&key) {
            Some(existing) => existing.merge(messages),
            None => {
                self.errors.insert(key, messages);
            }
        }
    }

    pub(crate) fn finish(self) -> Result<(), ErrorMessages> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ErrorMessages::Fields(self.errors))
        }
    }
}

/// Represents all possible errors that can occur when mapping or persisting documents.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// One or more values failed validation.
    #[error("Validation error: {0}")]
    Validation(ErrorMessages),
    /// The operation requires a document that exists in the store.
    #[error("Document not created: {0}")]
    NotCreated(String),
    /// An update or replace matched fewer records than expected.
    ///
    /// Either the record vanished or the commit conditions no longer hold.
    #[error("Update matched {matched} document(s) in collection {collection}")]
    Update {
        /// Name of the collection the command targeted.
        collection: String,
        /// Number of records the storage reported as matched.
        matched: u64,
    },
    /// A delete removed fewer records than expected.
    #[error("Delete removed {deleted} document(s) in collection {collection}")]
    Delete {
        /// Name of the collection the command targeted.
        collection: String,
        /// Number of records the storage reported as deleted.
        deleted: u64,
    },
    /// A stored record holds a key that no field of the schema maps to.
    #[error("{document}: unknown \"{field}\" field found in DB.")]
    UnknownFieldInDb {
        /// Name of the schema decoding the record.
        document: String,
        /// The offending storage key.
        field: String,
    },
    /// The API was used in a way that cannot succeed.
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
    /// The storage reported a uniqueness-constraint violation.
    ///
    /// `key_pattern` lists the storage names composing the violated index.
    #[error("Duplicate key on {key_pattern:?}: {message}")]
    DuplicateKey {
        /// Storage names of the fields composing the violated index.
        key_pattern: Vec<String>,
        /// Message reported by the storage.
        message: String,
    },
    /// A reference without an identity was dereferenced.
    #[error("Cannot retrieve a None reference")]
    NoneReference,
    /// A schema name could not be resolved through the registry.
    #[error("Unknown document `{0}`")]
    NotRegistered(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during schema construction, store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The document has an invalid structure for the requested operation.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns the structured messages if this is a validation error.
    pub fn validation_messages(&self) -> Option<&ErrorMessages> {
        match self {
            DocumentStoreError::Validation(messages) => Some(messages),
            _ => None,
        }
    }
}

/// A specialized `Result` type for document mapping and store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<ErrorMessages> for DocumentStoreError {
    fn from(messages: ErrorMessages) -> Self {
        DocumentStoreError::Validation(messages)
    }
}

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<std::convert::Infallible> for DocumentStoreError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_nested_messages() {
        let mut errors = ErrorMessages::field("name", ErrorMessages::message("first"));
        errors.merge(ErrorMessages::field("name", ErrorMessages::message("second")));
        errors.merge(ErrorMessages::field("age", ErrorMessages::message("third")));

        assert_eq!(errors.get("name").unwrap().messages(), ["first", "second"]);
        assert_eq!(errors.get("age").unwrap().messages(), ["third"]);
    }

    #[test]
    fn merge_keeps_flat_messages_under_schema_key() {
        let mut errors = ErrorMessages::message("broken");
        errors.merge(ErrorMessages::field("name", ErrorMessages::message("missing")));

        assert_eq!(errors.get("_schema").unwrap().messages(), ["broken"]);
        assert_eq!(errors.get("name").unwrap().messages(), ["missing"]);
    }

    #[test]
    fn display_renders_keyed_tree() {
        let errors = ErrorMessages::field("nick", ErrorMessages::message("taken"));

        assert_eq!(errors.to_string(), r#"{"nick": ["taken"]}"#);
    }
}
