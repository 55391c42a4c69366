use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// What happened to a product.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Description,
    Image,
    Save,
}

/// A row in the `product_history` table.  Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: HistoryKind,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub selected_image_url: Option<String>,
    /// User id of whoever triggered the change.
    pub actor: String,
}

impl HistoryEntry {
    pub fn new(product_id: Uuid, kind: HistoryKind, actor: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            timestamp: Utc::now(),
            kind,
            short_description: None,
            long_description: None,
            selected_image_url: None,
            actor: actor.to_owned(),
        }
    }
}
