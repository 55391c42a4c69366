//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`].  Failure bodies always have the shape
//! `{"error": <kind>, "message": <text>, "details": <optional>}`.
//!
//! Internal errors (database, upstream providers, files) are logged with full
//! detail; clients receive a generic message plus, for provider failures,
//! the provider and failure class.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use farmgen_core::{CatalogError, FieldError};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// All errors that can occur in the farmgen-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body of every failed request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<Value>,
}

fn fields_json(fields: &[FieldError]) -> Value {
    json!(fields)
}

impl ServerError {
    fn parts(&self) -> (StatusCode, &'static str, String, Option<Value>) {
        const INTERNAL: &str = "internal server error";
        match self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone(), None),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m.clone(), None),
            ServerError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "missing or invalid bearer token".to_owned(),
                None,
            ),
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", INTERNAL.to_owned(), None)
            }
            ServerError::Catalog(e) => match e {
                CatalogError::Validation(fields) => (
                    StatusCode::BAD_REQUEST,
                    "validation",
                    "validation failed".to_owned(),
                    Some(fields_json(fields)),
                ),
                CatalogError::NoFieldsProvided => (
                    StatusCode::BAD_REQUEST,
                    "validation",
                    e.to_string(),
                    None,
                ),
                CatalogError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone(), None),
                CatalogError::DuplicateKey(m) => (StatusCode::CONFLICT, "duplicate_key", m.clone(), None),
                CatalogError::File(f) => {
                    error!(error = %f, "import file error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "file",
                        "failed to read import file".to_owned(),
                        Some(json!(f.to_string())),
                    )
                }
                CatalogError::Upstream(u) => {
                    error!(provider = u.provider, kind = %u.kind, error = %u.message, "upstream provider error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "upstream",
                        format!("{} request failed", u.provider),
                        Some(json!({ "provider": u.provider, "kind": u.kind.to_string() })),
                    )
                }
                CatalogError::Timeout(provider) => {
                    error!(provider, "upstream call timed out");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "timeout",
                        format!("{provider} request timed out"),
                        None,
                    )
                }
                CatalogError::GenerationEmpty
                | CatalogError::InvalidOutputFormat(_)
                | CatalogError::Download { .. } => {
                    error!(error = %e, "generation failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "upstream", e.to_string(), None)
                }
                CatalogError::Database(_) | CatalogError::Corrupt(_) => {
                    error!(error = %e, "database error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "database", INTERNAL.to_owned(), None)
                }
            },
        }
    }
}

impl ServerError {
    /// Status and body this error is rendered as.
    pub fn body(&self) -> (StatusCode, ErrorBody) {
        let (status, error, message, details) = self.parts();
        (status, ErrorBody { error, message, details })
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = self.body();
        (status, Json(body)).into_response()
    }
}

impl From<farmgen_core::StoreError> for ServerError {
    fn from(e: farmgen_core::StoreError) -> Self {
        ServerError::Catalog(e.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: ServerError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_carry_field_details() {
        let err = ServerError::from(CatalogError::invalid("shortDescription", "too long"));
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
        assert_eq!(body["details"][0]["field"], "shortDescription");
    }

    #[tokio::test]
    async fn duplicate_key_is_conflict() {
        let (status, body) = body_of(CatalogError::DuplicateKey("farm id 'A1'".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "farm id 'A1'");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn upstream_errors_hide_provider_message() {
        let upstream = farmgen_core::UpstreamError::new(
            "openai",
            farmgen_core::UpstreamErrorKind::Unauthorized,
            "invalid api key sk-123",
        );
        let (status, body) = body_of(CatalogError::from(upstream).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"]["kind"], "unauthorized");
        assert!(!body.to_string().contains("sk-123"));
    }
}
