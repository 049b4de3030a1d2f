//! Shared types for the bulk ingestion pipeline
//!
//! These types are the data contracts between the pipeline stages:
//! parser → matcher → assembler → validator → coordinator. Only
//! [`BatchResult`] leaves the pipeline.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::coordinator::FailurePolicy;

/// Position identifying which logical record a field or attachment belongs to
pub type RecordIndex = u32;

// ============================================================================
// Pipeline input
// ============================================================================

/// One scalar form field as submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// One uploaded binary attachment as submitted
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Form field name the attachment arrived under (e.g. `products[2][image]`)
    pub field_name: String,
    /// Client-side file name
    pub file_name: String,
    /// Declared MIME type, if the client sent one
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Attachment {
    pub fn new(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content_type: content_type.map(str::to_string),
            data: data.into(),
        }
    }
}

/// A decoded multi-part submission
///
/// Transport-agnostic: the HTTP layer decodes the wire format into this shape.
/// Field order is submission order; attachment order decides duplicate handling.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub fields: Vec<FormField>,
    pub attachments: Vec<Attachment>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(FormField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.attachments.is_empty()
    }
}

// ============================================================================
// Errors and issues
// ============================================================================

/// Reason code attached to every reported problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    /// Malformed field or attachment name
    ParseError,
    /// Attachment content type not accepted
    UnsupportedMedia,
    /// Earlier attachment for the same index replaced by a later one
    DiscardedDuplicate,
    MissingField,
    InvalidType,
    OutOfRange,
    /// The store rejected a valid record
    PersistenceFailed,
    /// Record was valid but the whole batch was rolled back
    BatchAborted,
}

/// A per-record failure, always attributed to exactly one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    pub index: RecordIndex,
    pub reason: ErrorReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    pub message: String,
}

impl RecordError {
    pub fn new(index: RecordIndex, reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            index,
            reason,
            attributes: Vec::new(),
            message: message.into(),
        }
    }

    pub fn for_attribute(
        index: RecordIndex,
        reason: ErrorReason,
        attribute: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            reason,
            attributes: vec![attribute.to_string()],
            message: message.into(),
        }
    }
}

/// A submission-level note that does not decide any index's outcome
///
/// Parse errors, rejected attachments and discarded duplicates land here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchIssue {
    pub reason: ErrorReason,
    /// Best-effort index, when one could be recovered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<RecordIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl BatchIssue {
    pub fn parse_error(
        field: Option<&str>,
        index: Option<RecordIndex>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            reason: ErrorReason::ParseError,
            index,
            field: field.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn new(
        reason: ErrorReason,
        field: &str,
        index: Option<RecordIndex>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            reason,
            index,
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

// ============================================================================
// Pipeline output
// ============================================================================

/// Outcome status of one index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryStatus {
    Persisted,
    ValidationError,
    PersistenceError,
}

/// Status-specific detail of one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryDetail {
    Persisted { id: String },
    Errors { errors: Vec<RecordError> },
}

/// The fate of one index: `{index, status, detail}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub index: RecordIndex,
    pub status: EntryStatus,
    pub detail: EntryDetail,
}

impl BatchEntry {
    pub fn persisted(index: RecordIndex, id: impl Into<String>) -> Self {
        Self {
            index,
            status: EntryStatus::Persisted,
            detail: EntryDetail::Persisted { id: id.into() },
        }
    }

    pub fn validation_failed(index: RecordIndex, errors: Vec<RecordError>) -> Self {
        Self {
            index,
            status: EntryStatus::ValidationError,
            detail: EntryDetail::Errors { errors },
        }
    }

    pub fn persistence_failed(error: RecordError) -> Self {
        Self {
            index: error.index,
            status: EntryStatus::PersistenceError,
            detail: EntryDetail::Errors { errors: vec![error] },
        }
    }

    /// Store-assigned id, when persisted
    pub fn persisted_id(&self) -> Option<&str> {
        match &self.detail {
            EntryDetail::Persisted { id } => Some(id),
            EntryDetail::Errors { .. } => None,
        }
    }

    pub fn errors(&self) -> &[RecordError] {
        match &self.detail {
            EntryDetail::Persisted { .. } => &[],
            EntryDetail::Errors { errors } => errors,
        }
    }
}

/// Aggregate counts over all entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub persisted: usize,
    pub validation_failed: usize,
    pub persistence_failed: usize,
}

/// Result of one submission: one entry per observed index, in index order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub policy: FailurePolicy,
    /// True when an all-or-nothing batch was rolled back
    pub aborted: bool,
    pub entries: Vec<BatchEntry>,
    pub summary: BatchSummary,
    pub issues: Vec<BatchIssue>,
}

impl BatchResult {
    /// Build a result, sorting entries by index and computing the summary
    pub fn new(
        policy: FailurePolicy,
        aborted: bool,
        mut entries: Vec<BatchEntry>,
        issues: Vec<BatchIssue>,
    ) -> Self {
        entries.sort_by_key(|entry| entry.index);

        let mut summary = BatchSummary {
            total: entries.len(),
            ..BatchSummary::default()
        };
        for entry in &entries {
            match entry.status {
                EntryStatus::Persisted => summary.persisted += 1,
                EntryStatus::ValidationError => summary.validation_failed += 1,
                EntryStatus::PersistenceError => summary.persistence_failed += 1,
            }
        }

        Self {
            policy,
            aborted,
            entries,
            summary,
            issues,
        }
    }

    pub fn entry(&self, index: RecordIndex) -> Option<&BatchEntry> {
        self.entries.iter().find(|entry| entry.index == index)
    }

    /// True when every entry persisted (and there was at least one)
    pub fn is_complete_success(&self) -> bool {
        self.summary.total > 0 && self.summary.persisted == self.summary.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_sorts_entries_and_counts() {
        let result = BatchResult::new(
            FailurePolicy::ContinueOnError,
            false,
            vec![
                BatchEntry::validation_failed(
                    7,
                    vec![RecordError::for_attribute(
                        7,
                        ErrorReason::MissingField,
                        "name",
                        "name is required",
                    )],
                ),
                BatchEntry::persisted(2, "a"),
                BatchEntry::persistence_failed(RecordError::new(
                    4,
                    ErrorReason::PersistenceFailed,
                    "constraint violation",
                )),
            ],
            Vec::new(),
        );

        let indices: Vec<_> = result.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![2, 4, 7]);
        assert_eq!(
            result.summary,
            BatchSummary {
                total: 3,
                persisted: 1,
                validation_failed: 1,
                persistence_failed: 1,
            }
        );
        assert!(!result.is_complete_success());
    }

    #[test]
    fn test_entry_wire_shape() {
        let entry = BatchEntry::persisted(0, "abc");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["index"], 0);
        assert_eq!(json["status"], "persisted");
        assert_eq!(json["detail"]["id"], "abc");

        let entry = BatchEntry::validation_failed(
            1,
            vec![RecordError::for_attribute(
                1,
                ErrorReason::OutOfRange,
                "price",
                "price must be greater than 0",
            )],
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "validation-error");
        assert_eq!(json["detail"]["errors"][0]["reason"], "OutOfRange");
        assert_eq!(json["detail"]["errors"][0]["attributes"][0], "price");
    }

    #[test]
    fn test_summary_uses_camel_case() {
        let result = BatchResult::new(FailurePolicy::AllOrNothing, false, Vec::new(), Vec::new());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["summary"]["validationFailed"], 0);
        assert_eq!(json["summary"]["persistenceFailed"], 0);
        assert_eq!(json["policy"], "all-or-nothing");
    }
}
