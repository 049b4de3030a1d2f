//! Attachment matcher
//!
//! Binds uploaded attachments to the record index named by their field name.
//! Each attachment is judged on its own: a rejected attachment never affects
//! its siblings. At most one attachment is bound per index; when several
//! target the same index the later one in submission order wins and the
//! earlier one is reported as a discarded duplicate.

use std::collections::BTreeMap;

use super::field::{FieldParser, FieldTarget, SubmissionShape};
use super::types::{Attachment, BatchIssue, ErrorReason, RecordIndex};

/// An attachment whose field name has been tokenized
#[derive(Debug)]
pub struct ParsedAttachment {
    pub target: FieldTarget,
    pub attachment: Attachment,
}

/// Attachments after tokenizing their field names
#[derive(Debug, Default)]
pub struct ParsedAttachments {
    pub attachments: Vec<ParsedAttachment>,
    pub issues: Vec<BatchIssue>,
}

/// Attachments bound to indices
#[derive(Debug, Default)]
pub struct MatchedAttachments {
    pub bound: BTreeMap<RecordIndex, Attachment>,
    pub issues: Vec<BatchIssue>,
}

/// Binds attachments to record indices
#[derive(Debug, Clone)]
pub struct AttachmentMatcher {
    parser: FieldParser,
    attribute: String,
    allowed_content_prefix: String,
}

impl AttachmentMatcher {
    /// # Arguments
    /// * `parser` - Same tokenizer used for scalar fields
    /// * `attribute` - The record kind's attachment attribute (e.g. `image`)
    /// * `allowed_content_prefix` - Accepted MIME prefix (e.g. `image/`); empty accepts all
    pub fn new(
        parser: FieldParser,
        attribute: impl Into<String>,
        allowed_content_prefix: impl Into<String>,
    ) -> Self {
        Self {
            parser,
            attribute: attribute.into(),
            allowed_content_prefix: allowed_content_prefix.into(),
        }
    }

    /// Tokenize attachment field names
    ///
    /// Runs before the submission shape is known, so targets are kept as-is.
    pub fn parse(&self, attachments: Vec<Attachment>) -> ParsedAttachments {
        let mut parsed = ParsedAttachments::default();

        for attachment in attachments {
            match self.parser.parse(&attachment.field_name) {
                Ok(target) => parsed.attachments.push(ParsedAttachment { target, attachment }),
                Err(err) => {
                    tracing::debug!(
                        field = %attachment.field_name,
                        error = %err,
                        "Rejected attachment field name"
                    );
                    parsed.issues.push(err.to_issue(&attachment.field_name));
                }
            }
        }

        parsed
    }

    /// Bind parsed attachments to indices for the given submission shape
    pub fn bind(&self, parsed: ParsedAttachments, shape: SubmissionShape) -> MatchedAttachments {
        let mut matched = MatchedAttachments {
            bound: BTreeMap::new(),
            issues: parsed.issues,
        };

        for ParsedAttachment { target, attachment } in parsed.attachments {
            let field = attachment.field_name.clone();
            let best_effort_index = target.index();

            let Some((index, attribute)) = shape.place(target) else {
                matched.issues.push(BatchIssue::parse_error(
                    Some(field.as_str()),
                    None,
                    format!("attachment `{}` has no index in an indexed submission", field),
                ));
                continue;
            };

            if attribute != self.attribute {
                matched.issues.push(BatchIssue::parse_error(
                    Some(field.as_str()),
                    best_effort_index,
                    format!(
                        "attachment `{}` targets attribute `{}`, expected `{}`",
                        field, attribute, self.attribute
                    ),
                ));
                continue;
            }

            if !self.accepts_content_type(attachment.content_type.as_deref()) {
                matched.issues.push(BatchIssue::new(
                    ErrorReason::UnsupportedMedia,
                    &field,
                    Some(index),
                    format!(
                        "attachment `{}` has content type `{}`, only `{}*` is accepted",
                        attachment.file_name,
                        attachment.content_type.as_deref().unwrap_or("unknown"),
                        self.allowed_content_prefix
                    ),
                ));
                continue;
            }

            if let Some(earlier) = matched.bound.insert(index, attachment) {
                tracing::warn!(
                    index,
                    discarded = %earlier.file_name,
                    "Duplicate attachment for index, keeping the later one"
                );
                matched.issues.push(BatchIssue::new(
                    ErrorReason::DiscardedDuplicate,
                    &field,
                    Some(index),
                    format!(
                        "attachment `{}` discarded: a later attachment targets index {}",
                        earlier.file_name, index
                    ),
                ));
            }
        }

        matched
    }

    fn accepts_content_type(&self, content_type: Option<&str>) -> bool {
        if self.allowed_content_prefix.is_empty() {
            return true;
        }
        content_type
            .map(|ct| ct.trim().to_ascii_lowercase())
            .is_some_and(|ct| ct.starts_with(&self.allowed_content_prefix.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> AttachmentMatcher {
        AttachmentMatcher::new(FieldParser::new("items"), "image", "image/")
    }

    fn png(field: &str, file: &str) -> Attachment {
        Attachment::new(field, file, Some("image/png"), b"\x89PNG".to_vec())
    }

    fn bind(attachments: Vec<Attachment>, shape: SubmissionShape) -> MatchedAttachments {
        let m = matcher();
        let parsed = m.parse(attachments);
        m.bind(parsed, shape)
    }

    #[test]
    fn test_binds_by_index() {
        let matched = bind(
            vec![png("items[2][image]", "b.png"), png("items[0][image]", "a.png")],
            SubmissionShape::Indexed,
        );

        assert!(matched.issues.is_empty());
        assert_eq!(matched.bound.len(), 2);
        assert_eq!(matched.bound[&0].file_name, "a.png");
        assert_eq!(matched.bound[&2].file_name, "b.png");
    }

    #[test]
    fn test_later_duplicate_wins() {
        let matched = bind(
            vec![png("items[0][image]", "first.png"), png("items[0][image]", "second.png")],
            SubmissionShape::Indexed,
        );

        assert_eq!(matched.bound.len(), 1);
        assert_eq!(matched.bound[&0].file_name, "second.png");
        assert_eq!(matched.issues.len(), 1);
        assert_eq!(matched.issues[0].reason, ErrorReason::DiscardedDuplicate);
        assert_eq!(matched.issues[0].index, Some(0));
        assert!(matched.issues[0].message.contains("first.png"));
    }

    #[test]
    fn test_wrong_attribute_rejected_without_failing_siblings() {
        let matched = bind(
            vec![png("items[0][photo]", "a.png"), png("items[1][image]", "b.png")],
            SubmissionShape::Indexed,
        );

        assert_eq!(matched.bound.len(), 1);
        assert!(matched.bound.contains_key(&1));
        assert_eq!(matched.issues.len(), 1);
        assert_eq!(matched.issues[0].reason, ErrorReason::ParseError);
        assert_eq!(matched.issues[0].index, Some(0));
    }

    #[test]
    fn test_non_image_rejected() {
        let matched = bind(
            vec![Attachment::new(
                "items[0][image]",
                "notes.txt",
                Some("text/plain"),
                b"hello".to_vec(),
            )],
            SubmissionShape::Indexed,
        );

        assert!(matched.bound.is_empty());
        assert_eq!(matched.issues[0].reason, ErrorReason::UnsupportedMedia);
        assert_eq!(matched.issues[0].index, Some(0));
    }

    #[test]
    fn test_bare_image_binds_to_zero_for_single_record() {
        let matched = bind(vec![png("image", "a.png")], SubmissionShape::SingleRecord);
        assert!(matched.bound.contains_key(&0));
    }

    #[test]
    fn test_bare_image_rejected_in_indexed_submission() {
        let matched = bind(vec![png("image", "a.png")], SubmissionShape::Indexed);
        assert!(matched.bound.is_empty());
        assert_eq!(matched.issues[0].reason, ErrorReason::ParseError);
    }

    #[test]
    fn test_malformed_attachment_name() {
        let matched = bind(vec![png("items[x][image]", "a.png")], SubmissionShape::Indexed);
        assert!(matched.bound.is_empty());
        assert_eq!(matched.issues.len(), 1);
    }
}
