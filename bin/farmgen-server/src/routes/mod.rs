//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - middleware layers (CORS, per-request trace id, body limit)
//! - optional Swagger UI / OpenAPI document (`FARMGEN_ENABLE_SWAGGER=false` disables it)
//! - `/health`, open to everyone
//! - farm and product routes, behind the optional API token

pub mod doc;
mod farms;
mod health;
mod products;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::error::ServerError;
use crate::middleware::{auth, cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .merge(farms::router())
        .merge(products::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::check_api_token,
        ));

    let mut app = Router::new().merge(health::router()).merge(api_router);

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(trace::trace_middleware))
            .layer(cors::cors_layer(&state.config))
            .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
    )
    .with_state(state)
}

/// Parse a UUID path segment.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ServerError> {
    raw.parse()
        .map_err(|_| ServerError::BadRequest(format!("invalid {what} id '{raw}'")))
}
