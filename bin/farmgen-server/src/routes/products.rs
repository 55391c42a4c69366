use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use farmgen_core::entities::{HistoryKind, HistoryStore, ImageAttempt, ProductStatus, ProductStore};
use farmgen_core::services::ReviewSubmission;
use farmgen_core::FieldError;
use utoipa::OpenApi;

use crate::error::{ErrorBody, ServerError};
use crate::middleware::Actor;
use crate::routes::parse_id;
use crate::schemas::product::{DescriptionsResponse, HistoryResponse, ProductResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_product, save_product, generate_descriptions, generate_images, product_history),
    components(schemas(
        ProductResponse,
        DescriptionsResponse,
        HistoryResponse,
        ReviewSubmission,
        ImageAttempt,
        ProductStatus,
        HistoryKind,
        FieldError,
        ErrorBody
    ))
)]
pub struct ProductsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/products/{productId}", get(get_product).put(save_product))
        .route("/products/{productId}/generate-descriptions", post(generate_descriptions))
        .route("/products/{productId}/generate-images", post(generate_images))
        .route("/products/{productId}/history", get(product_history))
}

#[utoipa::path(
    get,
    path = "/products/{productId}",
    tag = "products",
    params(("productId" = String, Path, description = "Product UUID")),
    responses(
        (status = 200, description = "Product", body = ProductResponse),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 404, description = "Unknown product", body = ErrorBody),
    )
)]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<ProductResponse>, ServerError> {
    let id = parse_id(&raw_id, "product")?;
    let product = state
        .store
        .get_product(id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("product {id} not found")))?;
    Ok(Json(ProductResponse::from(&product)))
}

/// Save an operator review.  Descriptions, the selected image and the status
/// are validated together; on failure nothing changes.
#[utoipa::path(
    put,
    path = "/products/{productId}",
    tag = "products",
    params(("productId" = String, Path, description = "Product UUID")),
    request_body = ReviewSubmission,
    responses(
        (status = 200, description = "Review saved", body = ProductResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 404, description = "Unknown product", body = ErrorBody),
    )
)]
pub async fn save_product(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    Actor(actor): Actor,
    payload: Result<Json<ReviewSubmission>, JsonRejection>,
) -> Result<Json<ProductResponse>, ServerError> {
    let id = parse_id(&raw_id, "product")?;
    let Json(submission) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let saved = state.workflow.save(id, submission, &actor).await?;
    Ok(Json(ProductResponse::from(&saved)))
}

#[utoipa::path(
    post,
    path = "/products/{productId}/generate-descriptions",
    tag = "products",
    params(("productId" = String, Path, description = "Product UUID")),
    responses(
        (status = 200, description = "Descriptions generated and stored", body = DescriptionsResponse),
        (status = 404, description = "Unknown product", body = ErrorBody),
        (status = 500, description = "Text generation failed", body = ErrorBody),
    )
)]
pub async fn generate_descriptions(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<DescriptionsResponse>, ServerError> {
    let id = parse_id(&raw_id, "product")?;
    let descriptions = state.workflow.generate_descriptions(id, &actor).await?;
    Ok(Json(descriptions.into()))
}

/// Run one image generation; answers with the public URLs of the new attempt.
#[utoipa::path(
    post,
    path = "/products/{productId}/generate-images",
    tag = "products",
    params(("productId" = String, Path, description = "Product UUID")),
    responses(
        (status = 200, description = "Public URLs of the new attempt", body = Vec<String>),
        (status = 404, description = "Unknown product", body = ErrorBody),
        (status = 500, description = "Image generation or upload failed", body = ErrorBody),
    )
)]
pub async fn generate_images(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<Vec<String>>, ServerError> {
    let id = parse_id(&raw_id, "product")?;
    let attempt = state.workflow.generate_images(id, &actor).await?;
    Ok(Json(attempt.urls))
}

#[utoipa::path(
    get,
    path = "/products/{productId}/history",
    tag = "products",
    params(("productId" = String, Path, description = "Product UUID")),
    responses(
        (status = 200, description = "History, newest first", body = Vec<HistoryResponse>),
        (status = 404, description = "No history", body = ErrorBody),
    )
)]
pub async fn product_history(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<Vec<HistoryResponse>>, ServerError> {
    let id = parse_id(&raw_id, "product")?;
    let history = state.store.list_history(id).await?;
    if history.is_empty() {
        return Err(ServerError::NotFound(format!("no history for product {id}")));
    }
    Ok(Json(history.iter().map(HistoryResponse::from).collect()))
}
