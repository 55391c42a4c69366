use utoipa::OpenApi;

use crate::routes::{farms, health, products};

#[derive(OpenApi)]
#[openapi(info(
    title = "farmgen-server",
    description = "Farm product catalog import, AI-assisted content generation and review",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(farms::FarmsApi::openapi());
    root.merge(products::ProductsApi::openapi());
    root
}
