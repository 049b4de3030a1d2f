//! Batch persistence coordinator
//!
//! Applies the failure policy to validated records:
//!
//! - `continue-on-error`: every record is persisted on its own, with up to
//!   `max_concurrency` inserts in flight. A store failure only affects the
//!   record that caused it.
//! - `all-or-nothing`: any invalid record aborts the batch before the store is
//!   touched. Otherwise records are inserted one by one inside a single
//!   transaction; the first failure rolls everything back. When the
//!   transaction itself cannot be opened or committed there is no culprit
//!   record, and every record is reported as `BatchAborted` with the store
//!   message.
//!
//! Attachments are written just before their record is inserted and removed
//! again when that record does not end up persisted.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::types::{BatchEntry, ErrorReason, RecordError, RecordIndex};
use super::validator::{AttachmentSlot, ValidatedRecord, Verdicts};
use crate::attachments::AttachmentSink;
use crate::kinds::RecordKind;
use crate::store::{NewRecord, RecordStore, StoreTransaction};

/// How failures of individual records affect the rest of the batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    ContinueOnError,
    AllOrNothing,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::ContinueOnError => write!(f, "continue-on-error"),
            FailurePolicy::AllOrNothing => write!(f, "all-or-nothing"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue-on-error" | "continue_on_error" => Ok(FailurePolicy::ContinueOnError),
            "all-or-nothing" | "all_or_nothing" => Ok(FailurePolicy::AllOrNothing),
            other => Err(format!(
                "unknown failure policy `{}` (expected continue-on-error or all-or-nothing)",
                other
            )),
        }
    }
}

/// Entries produced by the coordinator
#[derive(Debug)]
pub struct Coordinated {
    pub entries: Vec<BatchEntry>,
    /// True when an all-or-nothing batch was abandoned
    pub aborted: bool,
}

/// Outcome of staging one record inside a transaction
enum Staged {
    Ok {
        index: RecordIndex,
        id: String,
        attachment: Option<String>,
    },
    Failed {
        error: RecordError,
        attachment: Option<String>,
    },
}

pub struct PersistenceCoordinator {
    kind: Arc<dyn RecordKind>,
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn AttachmentSink>,
    max_concurrency: usize,
}

impl PersistenceCoordinator {
    pub fn new(
        kind: Arc<dyn RecordKind>,
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn AttachmentSink>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            kind,
            store,
            sink,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Decide one outcome for every validated and every invalid index
    pub async fn run(&self, policy: FailurePolicy, verdicts: Verdicts) -> Coordinated {
        let Verdicts { valid, invalid } = verdicts;
        let any_invalid = !invalid.is_empty();

        let mut entries: Vec<BatchEntry> = invalid
            .into_iter()
            .map(|(index, errors)| BatchEntry::validation_failed(index, errors))
            .collect();

        let aborted = match policy {
            FailurePolicy::ContinueOnError => {
                entries.extend(self.persist_each(valid).await);
                false
            }
            FailurePolicy::AllOrNothing if any_invalid => {
                tracing::info!(
                    invalid = entries.len(),
                    collateral = valid.len(),
                    "Batch aborted before persistence: validation errors present"
                );
                entries.extend(valid.iter().map(|record| {
                    aborted_entry(record.index, "batch aborted: other records failed validation")
                }));
                true
            }
            FailurePolicy::AllOrNothing => {
                let (staged, aborted) = self.persist_all(valid).await;
                entries.extend(staged);
                aborted
            }
        };

        entries.sort_by_key(|entry| entry.index);
        Coordinated { entries, aborted }
    }

    async fn persist_each(&self, records: Vec<ValidatedRecord>) -> Vec<BatchEntry> {
        stream::iter(records)
            .map(|record| self.persist_one(record))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await
    }

    async fn persist_one(&self, record: ValidatedRecord) -> BatchEntry {
        let index = record.index;

        let (reference, stored) = match self.stage_attachment(&record).await {
            Ok(staged) => staged,
            Err(error) => return BatchEntry::persistence_failed(error),
        };

        let new_record = NewRecord::from_validated(self.kind.as_ref(), &record, &reference);
        match self.store.persist(&new_record).await {
            Ok(id) => BatchEntry::persisted(index, id),
            Err(err) => {
                tracing::warn!(index, error = %err, "Record rejected by store");
                if stored {
                    self.discard_attachments(std::slice::from_ref(&reference)).await;
                }
                BatchEntry::persistence_failed(RecordError::new(
                    index,
                    ErrorReason::PersistenceFailed,
                    err.to_string(),
                ))
            }
        }
    }

    async fn persist_all(&self, records: Vec<ValidatedRecord>) -> (Vec<BatchEntry>, bool) {
        let all_indices: Vec<RecordIndex> = records.iter().map(|r| r.index).collect();

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                tracing::error!(error = %err, "Failed to open transaction");
                let message = format!("batch aborted: failed to open transaction: {}", err);
                return (abort_all(&all_indices, &message), true);
            }
        };

        let mut persisted: Vec<(RecordIndex, String)> = Vec::with_capacity(records.len());
        let mut stored_attachments: Vec<String> = Vec::new();
        let mut culprit: Option<RecordError> = None;

        for record in &records {
            match self.stage(&mut tx, record).await {
                Staged::Ok {
                    index,
                    id,
                    attachment,
                } => {
                    stored_attachments.extend(attachment);
                    persisted.push((index, id));
                }
                Staged::Failed { error, attachment } => {
                    stored_attachments.extend(attachment);
                    culprit = Some(error);
                    break;
                }
            }
        }

        let Some(culprit) = culprit else {
            return match tx.commit().await {
                Ok(()) => {
                    tracing::info!(persisted = persisted.len(), "All-or-nothing batch committed");
                    let entries = persisted
                        .into_iter()
                        .map(|(index, id)| BatchEntry::persisted(index, id))
                        .collect();
                    (entries, false)
                }
                Err(err) => {
                    tracing::error!(error = %err, "Commit failed, batch not persisted");
                    self.discard_attachments(&stored_attachments).await;
                    let message = format!("batch aborted: commit failed: {}", err);
                    (abort_all(&all_indices, &message), true)
                }
            };
        };

        tracing::warn!(
            index = culprit.index,
            error = %culprit.message,
            "Rolling back all-or-nothing batch"
        );
        if let Err(err) = tx.rollback().await {
            tracing::error!(error = %err, "Rollback failed");
        }
        self.discard_attachments(&stored_attachments).await;

        let message = format!("batch aborted: record {} could not be persisted", culprit.index);
        let culprit_index = culprit.index;
        let mut entries: Vec<BatchEntry> = all_indices
            .into_iter()
            .filter(|&index| index != culprit_index)
            .map(|index| aborted_entry(index, &message))
            .collect();
        entries.push(BatchEntry::persistence_failed(culprit));

        (entries, true)
    }

    async fn stage(
        &self,
        tx: &mut Box<dyn StoreTransaction>,
        record: &ValidatedRecord,
    ) -> Staged {
        let index = record.index;

        let (reference, stored) = match self.stage_attachment(record).await {
            Ok(staged) => staged,
            Err(error) => {
                return Staged::Failed {
                    error,
                    attachment: None,
                }
            }
        };
        let attachment = stored.then(|| reference.clone());

        let new_record = NewRecord::from_validated(self.kind.as_ref(), record, &reference);
        match tx.persist(&new_record).await {
            Ok(id) => Staged::Ok {
                index,
                id,
                attachment,
            },
            Err(err) => Staged::Failed {
                error: RecordError::new(index, ErrorReason::PersistenceFailed, err.to_string()),
                attachment,
            },
        }
    }

    /// Write a pending attachment; returns the reference and whether a file was written
    async fn stage_attachment(
        &self,
        record: &ValidatedRecord,
    ) -> Result<(String, bool), RecordError> {
        match &record.attachment {
            AttachmentSlot::Placeholder(reference) => Ok((reference.clone(), false)),
            AttachmentSlot::Pending(attachment) => match self.sink.store(attachment).await {
                Ok(reference) => Ok((reference, true)),
                Err(err) => {
                    tracing::error!(
                        index = record.index,
                        error = %err,
                        "Failed to store attachment"
                    );
                    Err(RecordError::new(
                        record.index,
                        ErrorReason::PersistenceFailed,
                        format!("failed to store attachment: {}", err),
                    ))
                }
            },
        }
    }

    async fn discard_attachments(&self, references: &[String]) {
        for reference in references {
            if let Err(err) = self.sink.remove(reference).await {
                tracing::warn!(
                    reference = %reference,
                    error = %err,
                    "Failed to remove stored attachment"
                );
            }
        }
    }
}

fn aborted_entry(index: RecordIndex, message: &str) -> BatchEntry {
    BatchEntry::persistence_failed(RecordError::new(
        index,
        ErrorReason::BatchAborted,
        message,
    ))
}

fn abort_all(indices: &[RecordIndex], message: &str) -> Vec<BatchEntry> {
    indices
        .iter()
        .map(|&index| aborted_entry(index, message))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{FieldValue, ProductKind};
    use crate::pipeline::types::{Attachment, EntryStatus};
    use crate::store::{ColumnValue, StoreError, StoredRecord};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory store; lower indices take longer to insert
    #[derive(Default)]
    struct SlowStore {
        completed: Mutex<Vec<RecordIndex>>,
        fail_begin: bool,
        fail_commit: bool,
        rolled_back: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RecordStore for SlowStore {
        async fn persist(&self, record: &NewRecord) -> Result<String, StoreError> {
            let delay = 10 * 8u64.saturating_sub(u64::from(record.index));
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.completed.lock().unwrap().push(record.index);
            Ok(format!("id-{}", record.index))
        }

        async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
            if self.fail_begin {
                return Err(StoreError::Backend(catalog_common::Error::Internal(
                    "pool closed".into(),
                )));
            }
            Ok(Box::new(ScriptedTransaction {
                fail_commit: self.fail_commit,
                rolled_back: self.rolled_back.clone(),
            }))
        }

        async fn fetch(
            &self,
            _kind: &dyn RecordKind,
            _id: &str,
        ) -> Result<Option<StoredRecord>, StoreError> {
            Ok(None)
        }

        async fn update(
            &self,
            _kind: &dyn RecordKind,
            _id: &str,
            _columns: &[ColumnValue],
        ) -> Result<Option<StoredRecord>, StoreError> {
            Ok(None)
        }

        async fn delete(
            &self,
            _kind: &dyn RecordKind,
            _id: &str,
        ) -> Result<Option<StoredRecord>, StoreError> {
            Ok(None)
        }
    }

    struct ScriptedTransaction {
        fail_commit: bool,
        rolled_back: Arc<AtomicBool>,
    }

    #[async_trait]
    impl StoreTransaction for ScriptedTransaction {
        async fn persist(&mut self, record: &NewRecord) -> Result<String, StoreError> {
            Ok(format!("tx-{}", record.index))
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            if self.fail_commit {
                return Err(StoreError::Backend(catalog_common::Error::Internal(
                    "disk I/O error".into(),
                )));
            }
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.rolled_back.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Keeps references in memory; file names starting with `broken` fail
    #[derive(Default)]
    struct MemorySink {
        files: Mutex<Vec<String>>,
    }

    impl MemorySink {
        fn files(&self) -> Vec<String> {
            self.files.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AttachmentSink for MemorySink {
        async fn store(&self, attachment: &Attachment) -> catalog_common::Result<String> {
            if attachment.file_name.starts_with("broken") {
                return Err(std::io::Error::other("disk full").into());
            }
            self.files.lock().unwrap().push(attachment.file_name.clone());
            Ok(attachment.file_name.clone())
        }

        async fn remove(&self, reference: &str) -> catalog_common::Result<()> {
            self.files.lock().unwrap().retain(|file| file != reference);
            Ok(())
        }
    }

    fn record(index: RecordIndex, image: Option<&str>) -> ValidatedRecord {
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), FieldValue::Text(format!("item {}", index)));

        let attachment = match image {
            Some(file) => AttachmentSlot::Pending(Attachment::new(
                "image",
                file,
                Some("image/png"),
                b"png".to_vec(),
            )),
            None => AttachmentSlot::Placeholder("default.png".to_string()),
        };

        ValidatedRecord {
            index,
            values,
            attachment,
        }
    }

    fn valid(records: Vec<ValidatedRecord>) -> Verdicts {
        Verdicts {
            valid: records,
            invalid: Vec::new(),
        }
    }

    fn coordinator(
        store: &Arc<SlowStore>,
        sink: &Arc<MemorySink>,
        max_concurrency: usize,
    ) -> PersistenceCoordinator {
        PersistenceCoordinator::new(
            Arc::new(ProductKind::default()),
            store.clone(),
            sink.clone(),
            max_concurrency,
        )
    }

    fn reasons(coordinated: &Coordinated) -> Vec<Option<ErrorReason>> {
        coordinated
            .entries
            .iter()
            .map(|entry| entry.errors().first().map(|e| e.reason))
            .collect()
    }

    #[tokio::test]
    async fn test_concurrent_inserts_reported_in_index_order() {
        let store = Arc::new(SlowStore::default());
        let sink = Arc::new(MemorySink::default());

        let records = (0..6).map(|i| record(i, None)).collect();
        let coordinated = coordinator(&store, &sink, 4)
            .run(FailurePolicy::ContinueOnError, valid(records))
            .await;

        // Inserts finished out of order...
        let completed = store.completed.lock().unwrap().clone();
        assert_eq!(completed.len(), 6);
        assert_ne!(completed, vec![0, 1, 2, 3, 4, 5]);

        // ...but entries come back sorted by index
        let ids: Vec<_> = coordinated
            .entries
            .iter()
            .map(|e| (e.index, e.persisted_id().map(str::to_string)))
            .collect();
        assert_eq!(
            ids,
            (0..6)
                .map(|i| (i, Some(format!("id-{}", i))))
                .collect::<Vec<_>>()
        );
        assert!(!coordinated.aborted);
    }

    #[tokio::test]
    async fn test_attachment_failure_fails_only_that_record() {
        let store = Arc::new(SlowStore::default());
        let sink = Arc::new(MemorySink::default());

        let records = vec![
            record(0, Some("a.png")),
            record(1, Some("broken.png")),
            record(2, None),
        ];
        let coordinated = coordinator(&store, &sink, 2)
            .run(FailurePolicy::ContinueOnError, valid(records))
            .await;

        assert_eq!(
            reasons(&coordinated),
            vec![None, Some(ErrorReason::PersistenceFailed), None]
        );
        let failed = &coordinated.entries[1];
        assert_eq!(failed.status, EntryStatus::PersistenceError);
        assert!(failed.errors()[0].message.contains("failed to store attachment"));

        assert_eq!(sink.files(), vec!["a.png".to_string()]);
        assert!(!coordinated.aborted);
    }

    #[tokio::test]
    async fn test_attachment_failure_rolls_back_all_or_nothing() {
        let store = Arc::new(SlowStore::default());
        let sink = Arc::new(MemorySink::default());

        let records = vec![
            record(0, Some("a.png")),
            record(1, Some("broken.png")),
            record(2, Some("c.png")),
        ];
        let coordinated = coordinator(&store, &sink, 4)
            .run(FailurePolicy::AllOrNothing, valid(records))
            .await;

        assert_eq!(
            reasons(&coordinated),
            vec![
                Some(ErrorReason::BatchAborted),
                Some(ErrorReason::PersistenceFailed),
                Some(ErrorReason::BatchAborted),
            ]
        );
        assert!(coordinated.aborted);
        assert!(store.rolled_back.load(Ordering::SeqCst));
        assert!(sink.files().is_empty(), "{:?}", sink.files());
    }

    #[tokio::test]
    async fn test_commit_failure_aborts_every_record() {
        let store = Arc::new(SlowStore {
            fail_commit: true,
            ..SlowStore::default()
        });
        let sink = Arc::new(MemorySink::default());

        let records = vec![record(0, Some("a.png")), record(1, None)];
        let coordinated = coordinator(&store, &sink, 4)
            .run(FailurePolicy::AllOrNothing, valid(records))
            .await;

        assert_eq!(
            reasons(&coordinated),
            vec![Some(ErrorReason::BatchAborted), Some(ErrorReason::BatchAborted)]
        );
        for entry in &coordinated.entries {
            assert_eq!(entry.status, EntryStatus::PersistenceError);
            assert!(entry.errors()[0].message.contains("commit failed"));
        }
        assert!(coordinated.aborted);
        assert!(sink.files().is_empty());
    }

    #[tokio::test]
    async fn test_begin_failure_writes_no_attachments() {
        let store = Arc::new(SlowStore {
            fail_begin: true,
            ..SlowStore::default()
        });
        let sink = Arc::new(MemorySink::default());

        let records = vec![record(0, Some("a.png")), record(3, None)];
        let coordinated = coordinator(&store, &sink, 4)
            .run(FailurePolicy::AllOrNothing, valid(records))
            .await;

        assert_eq!(
            reasons(&coordinated),
            vec![Some(ErrorReason::BatchAborted), Some(ErrorReason::BatchAborted)]
        );
        assert!(coordinated.entries[0].errors()[0]
            .message
            .contains("failed to open transaction"));
        assert!(coordinated.aborted);
        assert!(sink.files().is_empty());
    }

    #[test]
    fn test_policy_parse_and_display() {
        assert_eq!(
            "all-or-nothing".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::AllOrNothing
        );
        assert_eq!(
            " Continue_On_Error ".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::ContinueOnError
        );
        assert!("sometimes".parse::<FailurePolicy>().is_err());

        assert_eq!(FailurePolicy::default(), FailurePolicy::ContinueOnError);
        assert_eq!(FailurePolicy::AllOrNothing.to_string(), "all-or-nothing");
    }

    #[test]
    fn test_policy_serde() {
        let json = serde_json::to_string(&FailurePolicy::AllOrNothing).unwrap();
        assert_eq!(json, "\"all-or-nothing\"");
        let parsed: FailurePolicy = serde_json::from_str("\"continue-on-error\"").unwrap();
        assert_eq!(parsed, FailurePolicy::ContinueOnError);
    }
}
