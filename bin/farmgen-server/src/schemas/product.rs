use farmgen_core::entities::{HistoryEntry, HistoryKind, ImageAttempt, Product, ProductStatus};
use farmgen_core::services::Descriptions;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub farm_id: String,
    pub name: String,
    pub sku: String,
    pub ingredients: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub selected_image_url: Option<String>,
    pub image_attempts: Vec<ImageAttempt>,
    pub status: ProductStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionsResponse {
    pub short_description: String,
    pub long_description: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub id: String,
    pub product_id: String,
    pub timestamp: String,
    pub kind: HistoryKind,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub selected_image_url: Option<String>,
    pub actor: String,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id.to_string(),
            farm_id: p.farm_id.to_string(),
            name: p.name.clone(),
            sku: p.sku.clone(),
            ingredients: p.ingredients.clone(),
            short_description: p.short_description.clone(),
            long_description: p.long_description.clone(),
            selected_image_url: p.selected_image_url.clone(),
            image_attempts: p.image_attempts.clone(),
            status: p.status,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

impl From<Descriptions> for DescriptionsResponse {
    fn from(d: Descriptions) -> Self {
        Self {
            short_description: d.short_description,
            long_description: d.long_description,
        }
    }
}

impl From<&HistoryEntry> for HistoryResponse {
    fn from(h: &HistoryEntry) -> Self {
        Self {
            id: h.id.to_string(),
            product_id: h.product_id.to_string(),
            timestamp: h.timestamp.to_rfc3339(),
            kind: h.kind,
            short_description: h.short_description.clone(),
            long_description: h.long_description.clone(),
            selected_image_url: h.selected_image_url.clone(),
            actor: h.actor.clone(),
        }
    }
}
