//! Product Workflow Controller.
//!
//! Orchestrates the text and image adapters for a single product and owns
//! the review/save cycle.  Every mutating operation holds the product's
//! entry in [`ProductLocks`] from the initial read to the history append, so
//! concurrent calls for one product are applied one after another.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::entities::{
    HistoryEntry, HistoryKind, HistoryStore, ImageAttempt, Product, ProductPatch, ProductStatus,
    ProductStore,
};
use crate::error::{CatalogError, FieldError};
use crate::services::image::normalize_product_name;
use crate::services::image_pipeline::ImagePipeline;
use crate::services::locks::ProductLocks;
use crate::services::text::{Classification, Descriptions, TextGenerator};

/// Operator's review of a product, submitted on save.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmission {
    #[serde(default)]
    #[validate(length(min = 1, max = 150, message = "must be between 1 and 150 characters"))]
    pub short_description: String,
    #[serde(default)]
    #[validate(length(min = 100, message = "must be at least 100 characters"))]
    pub long_description: String,
    #[serde(default)]
    #[validate(url(message = "must be a valid URL"))]
    pub selected_image_url: String,
    /// Target status; `completed` when omitted.
    #[serde(default)]
    pub status: Option<ProductStatus>,
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = camel_case(&field);
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                FieldError::new(field.clone(), message)
            })
        })
        .collect()
}

pub struct ProductWorkflow<S> {
    store: Arc<S>,
    text: Arc<dyn TextGenerator>,
    images: ImagePipeline,
    locks: ProductLocks,
    classify_products: bool,
}

impl<S> ProductWorkflow<S>
where
    S: ProductStore + HistoryStore,
{
    pub fn new(store: Arc<S>, text: Arc<dyn TextGenerator>, images: ImagePipeline) -> Self {
        Self {
            store,
            text,
            images,
            locks: ProductLocks::new(),
            classify_products: true,
        }
    }

    /// Whether product names are translated and classified before image
    /// generation.  Enabled by default.
    pub fn with_classification(mut self, enabled: bool) -> Self {
        self.classify_products = enabled;
        self
    }

    async fn load(&self, id: Uuid) -> Result<Product, CatalogError> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("product {id}")))
    }

    /// Generate and store short/long descriptions.  A `draft` product moves
    /// to `in_progress`; other statuses are left alone.
    pub async fn generate_descriptions(&self, id: Uuid, actor: &str) -> Result<Descriptions, CatalogError> {
        let _guard = self.locks.acquire(id).await;
        let product = self.load(id).await?;

        let descriptions = self
            .text
            .generate_descriptions(&product.name, product.ingredients.as_deref())
            .await?;

        let patch = ProductPatch {
            short_description: Some(descriptions.short_description.clone()),
            long_description: Some(descriptions.long_description.clone()),
            status: (product.status == ProductStatus::Draft).then_some(ProductStatus::InProgress),
            ..Default::default()
        };
        self.store.update_product(id, &patch).await?;

        let mut entry = HistoryEntry::new(id, HistoryKind::Description, actor);
        entry.short_description = patch.short_description;
        entry.long_description = patch.long_description;
        self.store.append_history(&entry).await?;

        info!(product_id = %id, sku = %product.sku, actor, "descriptions generated");
        Ok(descriptions)
    }

    /// Run one image generation and append its result as a new attempt.
    pub async fn generate_images(&self, id: Uuid, actor: &str) -> Result<ImageAttempt, CatalogError> {
        let _guard = self.locks.acquire(id).await;
        let product = self.load(id).await?;

        let name = normalize_product_name(&product.name);
        let classification = if self.classify_products {
            match self.text.classify(&name).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(product_id = %id, error = %e, "classification failed; using neutral prompt");
                    Classification::unknown(&name)
                }
            }
        } else {
            Classification::unknown(&name)
        };

        let urls = self
            .images
            .generate_for(&classification.english_name, &product.sku, classification.product_type)
            .await?;

        let attempt = ImageAttempt::new(urls);
        let mut attempts = product.image_attempts;
        attempts.push(attempt.clone());
        let patch = ProductPatch {
            image_attempts: Some(attempts),
            ..Default::default()
        };
        self.store.update_product(id, &patch).await?;

        // Nothing is selected by a generation; only saves record a selection.
        let entry = HistoryEntry::new(id, HistoryKind::Image, actor);
        self.store.append_history(&entry).await?;

        info!(
            product_id = %id,
            attempt = %attempt.id,
            images = attempt.urls.len(),
            product_type = %classification.product_type,
            actor,
            "image attempt recorded"
        );
        Ok(attempt)
    }

    /// Validate and persist an operator review.
    ///
    /// On any field error nothing is written.  The selected image must be one
    /// of the URLs produced by a recorded attempt.
    pub async fn save(&self, id: Uuid, submission: ReviewSubmission, actor: &str) -> Result<Product, CatalogError> {
        let _guard = self.locks.acquire(id).await;
        let product = self.load(id).await?;

        let mut errors = match submission.validate() {
            Ok(()) => Vec::new(),
            Err(e) => field_errors(&e),
        };
        let url = submission.selected_image_url.trim();
        if !url.is_empty()
            && !errors.iter().any(|e| e.field == "selectedImageUrl")
            && !product.has_generated_image(url)
        {
            errors.push(FieldError::new(
                "selectedImageUrl",
                "must be one of the generated image URLs",
            ));
        }
        if !errors.is_empty() {
            errors.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.message.cmp(&b.message)));
            return Err(CatalogError::Validation(errors));
        }

        let attempts = product
            .image_attempts
            .into_iter()
            .map(|mut a| {
                a.selected = a.urls.iter().any(|u| u == url);
                a
            })
            .collect();
        let status = submission.status.unwrap_or(ProductStatus::Completed);
        let patch = ProductPatch {
            short_description: Some(submission.short_description.clone()),
            long_description: Some(submission.long_description.clone()),
            selected_image_url: Some(url.to_owned()),
            image_attempts: Some(attempts),
            status: Some(status),
            ..Default::default()
        };
        let saved = self.store.update_product(id, &patch).await?;

        let mut entry = HistoryEntry::new(id, HistoryKind::Save, actor);
        entry.short_description = patch.short_description;
        entry.long_description = patch.long_description;
        entry.selected_image_url = patch.selected_image_url;
        self.store.append_history(&entry).await?;

        info!(product_id = %id, %status, actor, "product saved");
        Ok(saved)
    }
}
