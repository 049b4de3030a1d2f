//! Test utilities shared by the integration tests
//!
//! Every harness gets its own in-memory database and temporary upload
//! directory. Submissions use the `items` collection.

#![allow(dead_code)]

use catalog_ingest::attachments::DiskAttachmentSink;
use catalog_ingest::config::IngestConfig;
use catalog_ingest::kinds::ProductKind;
use catalog_ingest::pipeline::{Attachment, FailurePolicy, IngestEngine};
use catalog_ingest::store::SqliteRecordStore;
use catalog_ingest::AppState;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

pub const COLLECTION: &str = "items";

/// In-memory database with the catalog tables
///
/// One connection only: each in-memory connection is a separate database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");

    catalog_ingest::db::init_tables(&pool)
        .await
        .expect("create tables");

    pool
}

pub fn test_config(policy: FailurePolicy) -> IngestConfig {
    IngestConfig {
        collection: COLLECTION.to_string(),
        failure_policy: policy,
        max_lock_wait_ms: 500,
        ..IngestConfig::default()
    }
}

pub struct Harness {
    pub engine: Arc<IngestEngine>,
    pub store: Arc<SqliteRecordStore>,
    pub kind: Arc<ProductKind>,
    pub uploads: TempDir,
}

impl Harness {
    pub async fn new(policy: FailurePolicy) -> Self {
        let store = Arc::new(SqliteRecordStore::new(memory_pool().await, 500));
        let kind = Arc::new(ProductKind::default());
        let uploads = tempfile::tempdir().expect("temp upload dir");

        let engine = Arc::new(IngestEngine::new(
            &test_config(policy),
            kind.clone(),
            store.clone(),
            Arc::new(DiskAttachmentSink::new(uploads.path())),
        ));

        Self {
            engine,
            store,
            kind,
            uploads,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.engine.clone(), self.store.clone(), 1024 * 1024)
    }

    pub async fn product_count(&self) -> i64 {
        self.store.count(self.kind.as_ref()).await.expect("count products")
    }

    /// Names of files currently in the upload directory
    pub fn uploaded_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.uploads.path())
            .expect("read upload dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn png(field: &str, file_name: &str) -> Attachment {
    Attachment::new(field, file_name, Some("image/png"), b"\x89PNG\r\n".to_vec())
}
