//! Record assembler
//!
//! Reconciles tokenized scalar fields with bound attachments into one
//! [`RecordDraft`] per distinct index. Drafts live in an arena keyed by index
//! and are created lazily on first reference; the arena is consumed by
//! [`RecordAssembler::finish`], after which drafts are never mutated.
//!
//! Assembly is total: completeness is the validator's concern.

use std::collections::BTreeMap;

use super::types::{Attachment, RecordIndex};

/// Unvalidated reconstruction of one record
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    index: RecordIndex,
    fields: BTreeMap<String, String>,
    attachment: Option<Attachment>,
}

impl RecordDraft {
    fn new(index: RecordIndex) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn index(&self) -> RecordIndex {
        self.index
    }

    /// Raw value of an attribute, as submitted
    pub fn field(&self, attribute: &str) -> Option<&str> {
        self.fields.get(attribute).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }
}

/// Arena of drafts keyed by index
#[derive(Debug, Default)]
pub struct RecordAssembler {
    drafts: BTreeMap<RecordIndex, RecordDraft>,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn draft_mut(&mut self, index: RecordIndex) -> &mut RecordDraft {
        self.drafts
            .entry(index)
            .or_insert_with(|| RecordDraft::new(index))
    }

    /// Record a scalar value; a repeated attribute keeps the last value
    pub fn add_field(&mut self, index: RecordIndex, attribute: String, value: String) {
        let draft = self.draft_mut(index);
        if let Some(previous) = draft.fields.insert(attribute.clone(), value) {
            tracing::debug!(
                index,
                attribute = %attribute,
                previous = %previous,
                "Repeated field, keeping last value"
            );
        }
    }

    /// Attach the matched attachment for an index
    pub fn bind_attachment(&mut self, index: RecordIndex, attachment: Attachment) {
        self.draft_mut(index).attachment = Some(attachment);
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// Freeze the arena into drafts sorted ascending by index
    pub fn finish(self) -> Vec<RecordDraft> {
        self.drafts.into_values().collect()
    }
}
