//! Error types for catalog-ingest HTTP handlers
//!
//! Every error body has the shape `{"error": {"code", "message"}}`; rejected
//! updates add `details` with one entry per failed check. Batch outcomes are
//! not errors: they always come back as a `BatchResult`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::{RecordError, RevisionError};
use crate::store::StoreError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request, e.g. undecodable multipart body (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Submitted values failed validation (422)
    #[error("Validation failed: {} error(s)", .0.len())]
    Validation(Vec<RecordError>),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Record store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// catalog-common error
    #[error("Common error: {0}")]
    Common(#[from] catalog_common::Error),
}

impl From<RevisionError> for ApiError {
    fn from(err: RevisionError) -> Self {
        match err {
            RevisionError::Invalid(errors) => ApiError::Validation(errors),
            RevisionError::Store(err) => ApiError::Store(err),
            RevisionError::Attachment(err) => {
                ApiError::Internal(format!("failed to store attachment: {}", err))
            }
        }
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Store(StoreError::Constraint(_)) => {
                (StatusCode::CONFLICT, "CONSTRAINT_VIOLATION")
            }
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = match &self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            ApiError::Validation(errors) => errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, error = %message, "Request failed");
        }

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let ApiError::Validation(errors) = &self {
            error["details"] = json!(errors);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ErrorReason;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Store(StoreError::Constraint("UNIQUE".into()))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Common(catalog_common::Error::Config("bad".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_revision_errors_map_to_status() {
        let invalid = RevisionError::Invalid(vec![RecordError::for_attribute(
            0,
            ErrorReason::OutOfRange,
            "price",
            "price must be greater than 0 (got -1)",
        )]);
        assert_eq!(
            ApiError::from(invalid).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let attachment = RevisionError::Attachment(catalog_common::Error::Io(
            std::io::Error::other("disk full"),
        ));
        let err = ApiError::from(attachment);
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
