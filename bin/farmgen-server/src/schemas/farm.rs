use farmgen_core::entities::Farm;
use farmgen_core::services::ImportReport;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ErrorBody;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FarmResponse {
    pub id: String,
    pub name: String,
    pub external_farm_id: String,
    pub import_file_ref: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// `POST /farms` answer: the farm plus the outcome of the optional CSV import.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFarmResponse {
    #[serde(flatten)]
    pub farm: FarmResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportReport>,
    /// Present when the farm was created but its CSV was not imported.
    /// The upload can be repeated with `POST /farms/{farmId}/import`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RenameFarmRequest {
    pub name: String,
}

/// Multipart form accepted by `POST /farms` (documentation only).
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFarmForm {
    pub name: String,
    /// External (CMS) farm identifier; must be unique.
    pub farm_id: String,
    /// Optional CSV with `name,shop_sku,ingredients` columns.
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
}

/// Multipart form accepted by `POST /farms/{farmId}/import` (documentation only).
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
pub struct ImportForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

impl From<&Farm> for FarmResponse {
    fn from(farm: &Farm) -> Self {
        Self {
            id: farm.id.to_string(),
            name: farm.name.clone(),
            external_farm_id: farm.external_farm_id.clone(),
            import_file_ref: farm.import_file_ref.clone(),
            created_at: farm.created_at.to_rfc3339(),
            updated_at: farm.updated_at.to_rfc3339(),
        }
    }
}
