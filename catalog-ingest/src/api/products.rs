//! Product endpoints
//!
//! Both create endpoints run the same pipeline; `/products` is the
//! single-record form and `/products/bulk` the indexed one. Their response
//! body is always the batch result, with the status code summarizing it.
//! `PUT /products/:id` applies a partial update and may replace the image.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{PageQuery, PageWindow};
use crate::pipeline::{BatchResult, FailurePolicy};
use crate::store::{RecordStore, StoredRecord};
use crate::AppState;

use super::form::read_submission;

/// `?policy=` query parameter
#[derive(Debug, Default, Deserialize)]
pub struct PolicyQuery {
    pub policy: Option<String>,
}

impl PolicyQuery {
    fn resolve(&self) -> ApiResult<Option<FailurePolicy>> {
        self.policy
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(str::parse)
            .transpose()
            .map_err(ApiError::BadRequest)
    }
}

/// One page of products
#[derive(Debug, Serialize)]
pub struct ProductPage {
    #[serde(flatten)]
    pub window: PageWindow,
    pub products: Vec<StoredRecord>,
}

/// HTTP status summarizing a batch
///
/// 201 when everything persisted, 207 on partial success, 422 when nothing
/// persisted, 400 when the submission held no records at all.
pub fn batch_status(result: &BatchResult) -> StatusCode {
    let summary = &result.summary;
    if summary.total == 0 {
        StatusCode::BAD_REQUEST
    } else if summary.persisted == summary.total {
        StatusCode::CREATED
    } else if summary.persisted > 0 {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    }
}

/// POST /products/bulk
pub async fn bulk_create(
    State(state): State<AppState>,
    Query(query): Query<PolicyQuery>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<BatchResult>)> {
    let policy = query.resolve()?;
    let submission = read_submission(multipart).await?;

    let result = state.engine.ingest(submission, policy).await;
    Ok((batch_status(&result), Json(result)))
}

/// POST /products
pub async fn create_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<BatchResult>)> {
    let submission = read_submission(multipart).await?;

    let result = state.engine.ingest(submission, None).await;
    Ok((batch_status(&result), Json(result)))
}

/// GET /products?page=N
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ProductPage>> {
    let kind = state.engine.kind().as_ref();

    let total = state.store.count(kind).await?;
    let window = PageWindow::resolve(total, query.page);
    let products = state.store.list(kind, window.limit, window.offset).await?;

    Ok(Json(ProductPage { window, products }))
}

/// GET /products/:id
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StoredRecord>> {
    let kind = state.engine.kind().as_ref();

    state
        .store
        .fetch(kind, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("product {}", id)))
}

/// Response to a successful delete
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub id: String,
}

/// PUT /products/:id
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<StoredRecord>> {
    let submission = read_submission(multipart).await?;

    state
        .engine
        .update(&id, submission)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("product {}", id)))
}

/// DELETE /products/:id
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    match state.engine.delete(&id).await? {
        Some(removed) => Ok(Json(DeleteResponse {
            message: "Product removed".to_string(),
            id: removed.id,
        })),
        None => Err(ApiError::NotFound(format!("product {}", id))),
    }
}

/// Build product routes
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product).get(list_products))
        .route("/products/bulk", post(bulk_create))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}
