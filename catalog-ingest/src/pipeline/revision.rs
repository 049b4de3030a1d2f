//! Updates and deletes of stored records
//!
//! An update is a single-record submission applied on top of a stored record:
//! only the attributes present are checked and overwritten, and an uploaded
//! attachment replaces the stored one. The replaced attachment is removed only
//! after the store accepted the change.

use thiserror::Error;

use super::assembler::{RecordAssembler, RecordDraft};
use super::attachment::ParsedAttachments;
use super::field::{FieldTarget, SubmissionShape};
use super::types::{Attachment, BatchIssue, ErrorReason, RecordError, Submission};
use super::IngestEngine;
use crate::kinds::FieldValue;
use crate::store::{columns_for, ColumnValue, StoreError, StoredRecord};

/// Why an update or delete did not happen
#[derive(Debug, Error)]
pub enum RevisionError {
    /// Submitted values or attachment were rejected
    #[error("invalid update: {}", summarize(.0))]
    Invalid(Vec<RecordError>),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Replacement attachment could not be written
    #[error("failed to store attachment: {0}")]
    Attachment(catalog_common::Error),
}

fn summarize(errors: &[RecordError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn issue_to_error(issue: BatchIssue) -> RecordError {
    RecordError {
        index: 0,
        reason: issue.reason,
        attributes: issue.field.into_iter().collect(),
        message: issue.message,
    }
}

impl IngestEngine {
    /// Apply a partial update to one stored record
    ///
    /// Returns `Ok(None)` when no record has this id.
    pub async fn update(
        &self,
        id: &str,
        submission: Submission,
    ) -> Result<Option<StoredRecord>, RevisionError> {
        let kind = self.kind.as_ref();
        let (draft, attachment) = self.assemble_update(submission)?;

        let mut columns: Vec<ColumnValue> = match &draft {
            Some(draft) => {
                let values = self
                    .validator
                    .validate_changes(draft)
                    .map_err(RevisionError::Invalid)?;
                columns_for(kind, &values)
            }
            None => Vec::new(),
        };

        let Some(existing) = self.store.fetch(kind, id).await? else {
            return Ok(None);
        };

        let replacement = match attachment {
            Some(attachment) => {
                let reference = self
                    .sink
                    .store(&attachment)
                    .await
                    .map_err(RevisionError::Attachment)?;
                columns.push(ColumnValue {
                    column: kind.attachment_column(),
                    value: FieldValue::Text(reference.clone()),
                });
                Some(reference)
            }
            None => None,
        };

        let updated = match self.store.update(kind, id, &columns).await {
            Ok(updated) => updated,
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "Update rejected by store");
                self.discard_attachment(replacement.as_deref()).await;
                return Err(err.into());
            }
        };

        let Some(updated) = updated else {
            self.discard_attachment(replacement.as_deref()).await;
            return Ok(None);
        };

        if replacement.is_some() {
            self.discard_attachment(Some(existing.attachment.as_str())).await;
        }

        tracing::info!(
            kind = kind.name(),
            id = %id,
            columns = columns.len(),
            "Record updated"
        );
        Ok(Some(updated))
    }

    /// Delete one stored record and its attachment
    ///
    /// Returns the deleted record, or `Ok(None)` when no record has this id.
    pub async fn delete(&self, id: &str) -> Result<Option<StoredRecord>, RevisionError> {
        let kind = self.kind.as_ref();

        let Some(removed) = self.store.delete(kind, id).await? else {
            return Ok(None);
        };

        self.discard_attachment(Some(removed.attachment.as_str())).await;
        tracing::info!(kind = kind.name(), id = %id, "Record deleted");

        Ok(Some(removed))
    }

    /// Split an update submission into its draft and replacement attachment
    fn assemble_update(
        &self,
        submission: Submission,
    ) -> Result<(Option<RecordDraft>, Option<Attachment>), RevisionError> {
        let parsed_fields = self.parser.parse_fields(submission.fields);
        let parsed_attachments = self.matcher.parse(submission.attachments);

        let mut errors: Vec<RecordError> = parsed_fields
            .issues
            .into_iter()
            .map(issue_to_error)
            .collect();

        let mut assembler = RecordAssembler::new();
        for token in parsed_fields.tokens {
            match token.target {
                FieldTarget::Scalar(attribute) => {
                    assembler.add_field(0, attribute, token.value);
                }
                FieldTarget::Indexed(index, attribute) => {
                    errors.push(RecordError::for_attribute(
                        0,
                        ErrorReason::ParseError,
                        &attribute,
                        format!("field for index {} not allowed in an update", index),
                    ));
                }
            }
        }

        let (top_level, indexed): (Vec<_>, Vec<_>) = parsed_attachments
            .attachments
            .into_iter()
            .partition(|parsed| parsed.target.index().is_none());
        for parsed in indexed {
            errors.push(RecordError::new(
                0,
                ErrorReason::ParseError,
                format!(
                    "attachment `{}` not allowed in an update: use a top-level `{}` field",
                    parsed.attachment.field_name,
                    self.kind.attachment_attribute()
                ),
            ));
        }

        let matched = self.matcher.bind(
            ParsedAttachments {
                attachments: top_level,
                issues: parsed_attachments.issues,
            },
            SubmissionShape::SingleRecord,
        );
        errors.extend(
            matched
                .issues
                .into_iter()
                .filter(|issue| issue.reason != ErrorReason::DiscardedDuplicate)
                .map(issue_to_error),
        );

        // Only top-level attachments remain, all bound to index 0
        let attachment = matched.bound.into_values().next();

        if !errors.is_empty() {
            return Err(RevisionError::Invalid(errors));
        }

        Ok((assembler.finish().into_iter().next(), attachment))
    }

    /// Remove a stored attachment unless it is the placeholder
    async fn discard_attachment(&self, reference: Option<&str>) {
        let Some(reference) = reference else {
            return;
        };
        if reference == self.kind.placeholder_attachment() {
            return;
        }
        if let Err(err) = self.sink.remove(reference).await {
            tracing::warn!(
                reference = %reference,
                error = %err,
                "Failed to remove stored attachment"
            );
        }
    }
}
