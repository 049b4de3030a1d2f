//! SQLite record store
//!
//! Statements are built from the record kind's column list, so one store
//! serves every kind whose table exists. Standalone writes and `begin` retry
//! on lock contention; inserts inside a transaction do not.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{ColumnValue, NewRecord, RecordStore, StoreError, StoreTransaction, StoredRecord};
use crate::db::retry::retry_on_lock;
use crate::kinds::{AttributeType, FieldValue, RecordKind};

/// Record store backed by a SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// One page of records, oldest first
    pub async fn list(
        &self,
        kind: &dyn RecordKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
            kind.table()
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row_to_record(kind, row).map_err(StoreError::from))
            .collect()
    }

    pub async fn count(&self, kind: &dyn RecordKind) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn persist(&self, record: &NewRecord) -> Result<String, StoreError> {
        let pool = &self.pool;
        let id = retry_on_lock("insert record", self.max_lock_wait_ms, || async move {
            insert(pool, record).await.map_err(catalog_common::Error::from)
        })
        .await?;

        tracing::debug!(table = record.table, index = record.index, id = %id, "Record inserted");
        Ok(id)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let pool = &self.pool;
        let tx = retry_on_lock("begin transaction", self.max_lock_wait_ms, || async move {
            pool.begin().await.map_err(catalog_common::Error::from)
        })
        .await?;

        Ok(Box::new(SqliteStoreTransaction { tx }))
    }

    async fn fetch(
        &self,
        kind: &dyn RecordKind,
        id: &str,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", kind.table());
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(Some(row_to_record(kind, &row)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        kind: &dyn RecordKind,
        id: &str,
        columns: &[ColumnValue],
    ) -> Result<Option<StoredRecord>, StoreError> {
        if columns.is_empty() {
            return self.fetch(kind, id).await;
        }

        let sql = update_sql(kind.table(), columns);
        let pool = &self.pool;
        let sql_ref = sql.as_str();
        let affected = retry_on_lock("update record", self.max_lock_wait_ms, || async move {
            let mut query = sqlx::query(sql_ref);
            for column in columns {
                query = bind_value(query, &column.value);
            }
            let result = query
                .bind(id)
                .execute(pool)
                .await
                .map_err(catalog_common::Error::from)?;
            Ok(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            return Ok(None);
        }

        tracing::debug!(table = kind.table(), id = %id, columns = columns.len(), "Record updated");
        self.fetch(kind, id).await
    }

    async fn delete(
        &self,
        kind: &dyn RecordKind,
        id: &str,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let Some(existing) = self.fetch(kind, id).await? else {
            return Ok(None);
        };

        let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
        let pool = &self.pool;
        let sql_ref = sql.as_str();
        let affected = retry_on_lock("delete record", self.max_lock_wait_ms, || async move {
            let result = sqlx::query(sql_ref)
                .bind(id)
                .execute(pool)
                .await
                .map_err(catalog_common::Error::from)?;
            Ok(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            return Ok(None);
        }

        tracing::debug!(table = kind.table(), id = %id, "Record deleted");
        Ok(Some(existing))
    }
}

/// Open all-or-nothing transaction
struct SqliteStoreTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTransaction for SqliteStoreTransaction {
    async fn persist(&mut self, record: &NewRecord) -> Result<String, StoreError> {
        let id = insert(&mut *self.tx, record).await?;
        tracing::debug!(table = record.table, index = record.index, id = %id, "Record staged");
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn insert_sql(record: &NewRecord) -> String {
    let columns: Vec<&str> = std::iter::once("id")
        .chain(record.columns.iter().map(|c| c.column))
        .chain(std::iter::once("created_at"))
        .collect();
    let placeholders = vec!["?"; columns.len()].join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        record.table,
        columns.join(", "),
        placeholders
    )
}

fn update_sql(table: &str, columns: &[ColumnValue]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .map(|c| format!("{} = ?", c.column))
        .collect();

    format!("UPDATE {} SET {} WHERE id = ?", table, assignments.join(", "))
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &FieldValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        FieldValue::Integer(v) => query.bind(*v),
        FieldValue::Decimal(v) => query.bind(*v),
        FieldValue::Text(v) => query.bind(v.clone()),
    }
}

async fn insert<'e, E>(executor: E, record: &NewRecord) -> Result<String, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = Uuid::new_v4().to_string();
    let sql = insert_sql(record);

    let mut query = sqlx::query(&sql).bind(id.clone());
    for column in &record.columns {
        query = bind_value(query, &column.value);
    }

    query
        .bind(Utc::now().to_rfc3339())
        .execute(executor)
        .await?;

    Ok(id)
}

fn row_to_record(kind: &dyn RecordKind, row: &SqliteRow) -> Result<StoredRecord, sqlx::Error> {
    let mut values = BTreeMap::new();

    for spec in kind.attributes() {
        let value = match spec.ty {
            AttributeType::Text => row
                .try_get::<Option<String>, _>(spec.column)?
                .map(FieldValue::Text),
            AttributeType::Decimal => row
                .try_get::<Option<f64>, _>(spec.column)?
                .map(FieldValue::Decimal),
            AttributeType::Integer => row
                .try_get::<Option<i64>, _>(spec.column)?
                .map(FieldValue::Integer),
        };
        if let Some(value) = value {
            values.insert(spec.name.to_string(), value);
        }
    }

    let attachment: String = row.try_get(kind.attachment_column())?;
    values.insert(
        kind.attachment_attribute().to_string(),
        FieldValue::Text(attachment.clone()),
    );

    Ok(StoredRecord {
        id: row.try_get("id")?,
        values,
        attachment,
        created_at: row.try_get("created_at")?,
    })
}
