//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use farmgen_core::services::ProductWorkflow;
use farmgen_core::SqliteStore;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Farms, products and history.
    pub store: Arc<SqliteStore>,
    /// Generation and review operations, serialized per product.
    pub workflow: Arc<ProductWorkflow<SqliteStore>>,
}
