//! catalog-ingest library interface
//!
//! Bulk product ingestion: multipart submissions carrying many records are
//! reconciled by index, validated and persisted under a failure policy.

pub mod api;
pub mod attachments;
pub mod config;
pub mod db;
pub mod error;
pub mod kinds;
pub mod pagination;
pub mod pipeline;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::pipeline::IngestEngine;
use crate::store::SqliteRecordStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Pipeline for the product kind
    pub engine: Arc<IngestEngine>,
    /// Store used for listing and lookups
    pub store: Arc<SqliteRecordStore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Multipart request body limit
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        engine: Arc<IngestEngine>,
        store: Arc<SqliteRecordStore>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            engine,
            store,
            startup_time: Utc::now(),
            max_body_bytes,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .merge(api::product_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
