//! Bulk ingestion pipeline
//!
//! One submission flows through five stages:
//!
//! 1. [`FieldParser`] tokenizes field names into [`FieldTarget`]s
//! 2. [`AttachmentMatcher`] binds uploaded files to indices
//! 3. [`RecordAssembler`] groups everything by index into drafts
//! 4. [`RecordValidator`] applies the record kind's declarations
//! 5. [`PersistenceCoordinator`] persists under the chosen [`FailurePolicy`]
//!
//! The result is a [`BatchResult`] with exactly one entry per index observed
//! in the submission. Problems that cannot be tied to a record outcome (bad
//! field names, rejected or superseded attachments) are reported as issues
//! and never stop the batch.
//!
//! Stored records are changed through [`IngestEngine::update`] and
//! [`IngestEngine::delete`], which reuse the same parser, matcher and
//! attribute declarations.

pub mod assembler;
pub mod attachment;
pub mod coordinator;
pub mod field;
pub mod revision;
pub mod types;
pub mod validator;

pub use assembler::{RecordAssembler, RecordDraft};
pub use attachment::AttachmentMatcher;
pub use coordinator::{FailurePolicy, PersistenceCoordinator};
pub use field::{FieldParser, FieldTarget, SubmissionShape};
pub use revision::RevisionError;
pub use types::*;
pub use validator::{AttachmentSlot, RecordValidator, ValidatedRecord};

use std::sync::Arc;

use crate::attachments::AttachmentSink;
use crate::config::IngestConfig;
use crate::kinds::RecordKind;
use crate::store::RecordStore;

/// Runs submissions through the pipeline for one record kind
pub struct IngestEngine {
    kind: Arc<dyn RecordKind>,
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn AttachmentSink>,
    parser: FieldParser,
    matcher: AttachmentMatcher,
    validator: RecordValidator,
    coordinator: PersistenceCoordinator,
    default_policy: FailurePolicy,
}

impl IngestEngine {
    pub fn new(
        config: &IngestConfig,
        kind: Arc<dyn RecordKind>,
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn AttachmentSink>,
    ) -> Self {
        let parser = FieldParser::new(config.collection.trim());
        let matcher = AttachmentMatcher::new(
            parser.clone(),
            kind.attachment_attribute(),
            config.allowed_content_prefix.clone(),
        );

        Self {
            parser,
            matcher,
            validator: RecordValidator::new(kind.clone()),
            coordinator: PersistenceCoordinator::new(
                kind.clone(),
                store.clone(),
                sink.clone(),
                config.max_concurrency,
            ),
            default_policy: config.failure_policy,
            kind,
            store,
            sink,
        }
    }

    pub fn kind(&self) -> &Arc<dyn RecordKind> {
        &self.kind
    }

    /// Ingest one submission
    ///
    /// Never fails as a whole: every problem is reported inside the result.
    pub async fn ingest(
        &self,
        submission: Submission,
        policy: Option<FailurePolicy>,
    ) -> BatchResult {
        let policy = policy.unwrap_or(self.default_policy);

        if submission.is_empty() {
            tracing::info!(kind = self.kind.name(), "Empty submission");
            return BatchResult::new(
                policy,
                false,
                Vec::new(),
                vec![BatchIssue::parse_error(
                    None,
                    None,
                    "submission contains no fields or attachments",
                )],
            );
        }

        let Submission {
            fields,
            attachments,
        } = submission;
        let field_count = fields.len();
        let attachment_count = attachments.len();

        let parsed_fields = self.parser.parse_fields(fields);
        let parsed_attachments = self.matcher.parse(attachments);

        let shape = SubmissionShape::detect(
            parsed_fields
                .tokens
                .iter()
                .map(|token| &token.target)
                .chain(parsed_attachments.attachments.iter().map(|a| &a.target)),
        );

        let mut issues = parsed_fields.issues;
        let mut assembler = RecordAssembler::new();

        for token in parsed_fields.tokens {
            let attribute = token.target.attribute().to_string();
            match shape.place(token.target) {
                Some((index, attribute)) => assembler.add_field(index, attribute, token.value),
                None => {
                    tracing::debug!(
                        field = %attribute,
                        "Ignoring top-level field in indexed submission"
                    );
                    issues.push(BatchIssue::parse_error(
                        Some(attribute.as_str()),
                        None,
                        format!(
                            "top-level field `{}` ignored: submission uses {}[index][...] names",
                            attribute,
                            self.parser.collection()
                        ),
                    ));
                }
            }
        }

        let matched = self.matcher.bind(parsed_attachments, shape);
        issues.extend(matched.issues);
        for (index, attachment) in matched.bound {
            assembler.bind_attachment(index, attachment);
        }

        let drafts = assembler.finish();
        tracing::info!(
            kind = self.kind.name(),
            policy = %policy,
            shape = ?shape,
            fields = field_count,
            attachments = attachment_count,
            records = drafts.len(),
            issues = issues.len(),
            "Submission assembled"
        );

        let verdicts = self.validator.partition(&drafts);
        let coordinated = self.coordinator.run(policy, verdicts).await;

        if drafts.is_empty()
            && issues
                .iter()
                .all(|issue| issue.reason != ErrorReason::ParseError)
        {
            issues.push(BatchIssue::parse_error(
                None,
                None,
                "submission contains no records",
            ));
        }

        let result = BatchResult::new(policy, coordinated.aborted, coordinated.entries, issues);
        tracing::info!(
            total = result.summary.total,
            persisted = result.summary.persisted,
            validation_failed = result.summary.validation_failed,
            persistence_failed = result.summary.persistence_failed,
            aborted = result.aborted,
            "Submission processed"
        );

        result
    }
}
