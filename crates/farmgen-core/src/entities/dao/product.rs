use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Review state of a product.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    InProgress,
    Completed,
}

/// One batch of images produced by a single generation call.
///
/// Stored as an element of the JSON array in
/// `products.image_generation_attempts`; attempts are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttempt {
    pub id: String,
    /// Public URLs in the order the provider returned them.
    pub urls: Vec<String>,
    /// Whether the product's selected image came from this attempt.
    #[serde(default)]
    pub selected: bool,
    pub created_at: DateTime<Utc>,
}

impl ImageAttempt {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            urls,
            selected: false,
            created_at: Utc::now(),
        }
    }
}

/// A row in the `products` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub name: String,
    pub sku: String,
    pub ingredients: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub selected_image_url: Option<String>,
    pub image_attempts: Vec<ImageAttempt>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `url` was produced by any recorded generation attempt.
    pub fn has_generated_image(&self, url: &str) -> bool {
        self.image_attempts
            .iter()
            .any(|a| a.urls.iter().any(|u| u == url))
    }
}

/// Input for inserting a product during CSV import.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub farm_id: Uuid,
    pub name: String,
    pub sku: String,
    pub ingredients: Option<String>,
}

/// Partial update of a product.  `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub ingredients: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub selected_image_url: Option<String>,
    pub image_attempts: Option<Vec<ImageAttempt>>,
    pub status: Option<ProductStatus>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.ingredients.is_none()
            && self.short_description.is_none()
            && self.long_description.is_none()
            && self.selected_image_url.is_none()
            && self.image_attempts.is_none()
            && self.status.is_none()
    }
}
