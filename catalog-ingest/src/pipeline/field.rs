//! Field-index parser
//!
//! Turns flat form-field names such as `products[3][price]` into typed
//! [`FieldTarget`]s. Names without brackets are top-level scalars; names with
//! brackets must be exactly `collection[index][attribute]`.
//!
//! Parsing is per name and never fails the batch: problems come back as
//! [`FieldParseError`] and are reported as submission-level issues.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::types::{BatchIssue, FormField, RecordIndex};

static INDEXED_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^\[\]]*)\[([^\[\]]*)\]\[([^\[\]]*)\]$").expect("indexed field pattern is valid")
});

/// Where a field's value goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    /// Top-level field with no index (single-record submissions)
    Scalar(String),
    /// `collection[index][attribute]`
    Indexed(RecordIndex, String),
}

impl FieldTarget {
    pub fn attribute(&self) -> &str {
        match self {
            FieldTarget::Scalar(attribute) | FieldTarget::Indexed(_, attribute) => attribute,
        }
    }

    pub fn index(&self) -> Option<RecordIndex> {
        match self {
            FieldTarget::Scalar(_) => None,
            FieldTarget::Indexed(index, _) => Some(*index),
        }
    }
}

/// Why a field name could not be tokenized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldParseError {
    #[error("field name is empty")]
    EmptyName,

    #[error("field `{field}` is not of the form collection[index][attribute]")]
    Malformed { field: String },

    #[error("field `{field}` has a non-numeric index `{index}`")]
    NonNumericIndex { field: String, index: String },

    #[error("field `{field}` has an index that is out of range")]
    IndexOutOfRange { field: String },

    #[error("field `{field}` has an empty attribute name")]
    EmptyAttribute { field: String, index: RecordIndex },

    #[error("field `{field}` targets collection `{found}`, expected `{expected}`")]
    UnexpectedCollection {
        field: String,
        found: String,
        expected: String,
        index: Option<RecordIndex>,
    },
}

impl FieldParseError {
    /// Index recovered from the name despite the error, if any
    pub fn best_effort_index(&self) -> Option<RecordIndex> {
        match self {
            FieldParseError::EmptyAttribute { index, .. } => Some(*index),
            FieldParseError::UnexpectedCollection { index, .. } => *index,
            _ => None,
        }
    }

    pub fn to_issue(&self, field: &str) -> BatchIssue {
        BatchIssue::parse_error(Some(field), self.best_effort_index(), self.to_string())
    }
}

/// One successfully tokenized scalar field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldToken {
    pub target: FieldTarget,
    pub value: String,
}

/// Output of tokenizing all scalar fields of a submission
#[derive(Debug, Default)]
pub struct ParsedFields {
    pub tokens: Vec<FieldToken>,
    pub issues: Vec<BatchIssue>,
}

impl ParsedFields {
    pub fn has_indexed(&self) -> bool {
        self.tokens
            .iter()
            .any(|token| matches!(token.target, FieldTarget::Indexed(..)))
    }
}

/// Tokenizer for field names belonging to one collection
#[derive(Debug, Clone)]
pub struct FieldParser {
    collection: String,
}

impl FieldParser {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Tokenize one field name
    pub fn parse(&self, name: &str) -> Result<FieldTarget, FieldParseError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FieldParseError::EmptyName);
        }

        if !name.contains(['[', ']']) {
            return Ok(FieldTarget::Scalar(name.to_string()));
        }

        let captures = INDEXED_FIELD
            .captures(name)
            .ok_or_else(|| FieldParseError::Malformed {
                field: name.to_string(),
            })?;

        let collection = &captures[1];
        let raw_index = captures[2].trim();
        let attribute = captures[3].trim();

        let index = parse_index(name, raw_index)?;

        if collection != self.collection {
            return Err(FieldParseError::UnexpectedCollection {
                field: name.to_string(),
                found: collection.to_string(),
                expected: self.collection.clone(),
                index: Some(index),
            });
        }

        if attribute.is_empty() {
            return Err(FieldParseError::EmptyAttribute {
                field: name.to_string(),
                index,
            });
        }

        Ok(FieldTarget::Indexed(index, attribute.to_string()))
    }

    /// Tokenize every scalar field, collecting parse errors as issues
    pub fn parse_fields(&self, fields: Vec<FormField>) -> ParsedFields {
        let mut parsed = ParsedFields::default();

        for field in fields {
            match self.parse(&field.name) {
                Ok(target) => parsed.tokens.push(FieldToken {
                    target,
                    value: field.value,
                }),
                Err(err) => {
                    tracing::debug!(field = %field.name, error = %err, "Rejected form field");
                    parsed.issues.push(err.to_issue(&field.name));
                }
            }
        }

        parsed
    }
}

fn parse_index(field: &str, raw: &str) -> Result<RecordIndex, FieldParseError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldParseError::NonNumericIndex {
            field: field.to_string(),
            index: raw.to_string(),
        });
    }

    raw.parse::<RecordIndex>()
        .map_err(|_| FieldParseError::IndexOutOfRange {
            field: field.to_string(),
        })
}

/// Whether a submission carries one implicit record or indexed records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionShape {
    /// No indexed names anywhere: top-level fields form the record at index 0
    SingleRecord,
    Indexed,
}

impl SubmissionShape {
    /// Indexed as soon as any field or attachment name carries an index
    pub fn detect<'a>(targets: impl IntoIterator<Item = &'a FieldTarget>) -> Self {
        if targets
            .into_iter()
            .any(|target| matches!(target, FieldTarget::Indexed(..)))
        {
            SubmissionShape::Indexed
        } else {
            SubmissionShape::SingleRecord
        }
    }

    /// Resolve a target to its (index, attribute) slot
    ///
    /// Returns `None` for a top-level field inside an indexed submission.
    pub fn place(self, target: FieldTarget) -> Option<(RecordIndex, String)> {
        match (self, target) {
            (_, FieldTarget::Indexed(index, attribute)) => Some((index, attribute)),
            (SubmissionShape::SingleRecord, FieldTarget::Scalar(attribute)) => Some((0, attribute)),
            (SubmissionShape::Indexed, FieldTarget::Scalar(_)) => None,
        }
    }
}
