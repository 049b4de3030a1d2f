//! Record store interface
//!
//! The pipeline talks to durable storage only through [`RecordStore`] and
//! [`StoreTransaction`]. The store is the arbiter of uniqueness: constraint
//! violations come back as [`StoreError::Constraint`] for the record that
//! caused them.

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::kinds::{FieldValue, RecordKind};
use crate::pipeline::{RecordIndex, ValidatedRecord};

/// Store-level failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record violates a store constraint (e.g. duplicate name)
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Any other backend failure
    #[error(transparent)]
    Backend(catalog_common::Error),
}

impl StoreError {
    pub fn is_constraint(&self) -> bool {
        matches!(self, StoreError::Constraint(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation()
                || db_err.is_check_violation()
                || matches!(db_err.kind(), sqlx::error::ErrorKind::NotNullViolation)
                || db_err.is_foreign_key_violation()
            {
                return StoreError::Constraint(db_err.message().to_string());
            }
        }
        StoreError::Backend(catalog_common::Error::Database(err))
    }
}

impl From<catalog_common::Error> for StoreError {
    fn from(err: catalog_common::Error) -> Self {
        match err {
            catalog_common::Error::Database(db_err) => db_err.into(),
            other => StoreError::Backend(other),
        }
    }
}

/// One column value of a record about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue {
    pub column: &'static str,
    pub value: FieldValue,
}

/// Map typed attribute values onto the kind's columns, in column order
pub fn columns_for(
    kind: &dyn RecordKind,
    values: &BTreeMap<String, FieldValue>,
) -> Vec<ColumnValue> {
    kind.attributes()
        .iter()
        .filter_map(|spec| {
            values.get(spec.name).map(|value| ColumnValue {
                column: spec.column,
                value: value.clone(),
            })
        })
        .collect()
}

/// A validated record mapped onto store columns
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub index: RecordIndex,
    pub table: &'static str,
    pub columns: Vec<ColumnValue>,
}

impl NewRecord {
    /// Map a validated record onto the kind's columns
    ///
    /// `attachment_ref` is the stored attachment name or the placeholder.
    pub fn from_validated(
        kind: &dyn RecordKind,
        record: &ValidatedRecord,
        attachment_ref: &str,
    ) -> Self {
        let mut columns = columns_for(kind, &record.values);

        columns.push(ColumnValue {
            column: kind.attachment_column(),
            value: FieldValue::Text(attachment_ref.to_string()),
        });

        Self {
            index: record.index,
            table: kind.table(),
            columns,
        }
    }
}

/// A record read back from the store
///
/// Serializes as one flat object: `id`, every present attribute (the
/// attachment reference under the kind's attachment attribute, e.g. `image`)
/// and `createdAt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    /// Values keyed by attribute name; absent optional attributes are omitted
    #[serde(flatten)]
    pub values: BTreeMap<String, FieldValue>,
    /// Attachment reference (stored file name or placeholder)
    #[serde(skip)]
    pub attachment: String,
    pub created_at: String,
}

/// Durable record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one record outside any transaction, returning its id
    async fn persist(&self, record: &NewRecord) -> Result<String, StoreError>;

    /// Open a transaction for all-or-nothing batches
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Read a record back by id
    async fn fetch(
        &self,
        kind: &dyn RecordKind,
        id: &str,
    ) -> Result<Option<StoredRecord>, StoreError>;

    /// Overwrite the given columns of one record
    ///
    /// Returns the updated record, or `None` when no record has this id.
    async fn update(
        &self,
        kind: &dyn RecordKind,
        id: &str,
        columns: &[ColumnValue],
    ) -> Result<Option<StoredRecord>, StoreError>;

    /// Delete one record, returning it as it was before deletion
    async fn delete(
        &self,
        kind: &dyn RecordKind,
        id: &str,
    ) -> Result<Option<StoredRecord>, StoreError>;
}

/// An open store transaction
#[async_trait]
pub trait StoreTransaction: Send {
    async fn persist(&mut self, record: &NewRecord) -> Result<String, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
