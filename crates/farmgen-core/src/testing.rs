//! In-memory stand-ins for the external collaborators.
//!
//! Compiled for this crate's own tests and, behind the `test-support`
//! feature, for downstream crates that want to drive the workflow without
//! network access.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::entities::SqliteStore;
use crate::error::CatalogError;
use crate::services::image::{ImageBatch, ImageGenerator, KeyLayout, ProductType};
use crate::services::image_pipeline::{ImageFetcher, ImagePipeline};
use crate::services::storage::ObjectStore;
use crate::services::text::{Classification, Descriptions, TextGenerator};
use crate::services::workflow::ProductWorkflow;

#[cfg(test)]
pub(crate) mod http_stub;

/// Fresh in-memory database with migrations applied.
pub async fn memory_store() -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite"),
    )
}

/// Workflow over `store` with the given fakes, a successful fetcher and an
/// in-memory object store.
pub fn workflow_with(
    store: Arc<SqliteStore>,
    text: FakeTextGenerator,
    images: FakeImageGenerator,
) -> ProductWorkflow<SqliteStore> {
    let pipeline = ImagePipeline::new(
        Arc::new(images),
        Arc::new(StaticImageFetcher::ok()),
        Arc::new(MemoryObjectStore::default()),
    );
    ProductWorkflow::new(store, Arc::new(text), pipeline)
}

/// Deterministic text generator.
#[derive(Debug, Clone, Default)]
pub struct FakeTextGenerator {
    classification: Option<(String, ProductType)>,
    fail_classification: bool,
    fail_descriptions: bool,
}

impl FakeTextGenerator {
    pub fn classifying(mut self, english_name: &str, product_type: ProductType) -> Self {
        self.classification = Some((english_name.to_owned(), product_type));
        self
    }

    pub fn failing_classification(mut self) -> Self {
        self.fail_classification = true;
        self
    }

    pub fn failing_descriptions(mut self) -> Self {
        self.fail_descriptions = true;
        self
    }
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    async fn generate_descriptions(
        &self,
        name: &str,
        ingredients: Option<&str>,
    ) -> Result<Descriptions, CatalogError> {
        if self.fail_descriptions {
            return Err(CatalogError::GenerationEmpty);
        }
        let ingredients = ingredients.unwrap_or("local ingredients");
        Ok(Descriptions {
            short_description: format!("{name} from the farm."),
            long_description: format!(
                "{name} is made from {ingredients} by a small family farm. \
                 It is produced in small batches and delivered fresh to the shop."
            ),
        })
    }

    async fn classify(&self, name: &str) -> Result<Classification, CatalogError> {
        if self.fail_classification {
            return Err(CatalogError::GenerationEmpty);
        }
        Ok(match &self.classification {
            Some((english_name, product_type)) => Classification {
                english_name: english_name.clone(),
                product_type: *product_type,
            },
            None => Classification::unknown(name),
        })
    }
}

enum FakeImageMode {
    Many(usize),
    Single,
    Failing,
}

/// Image generator returning numbered provider URLs and recording prompts.
pub struct FakeImageGenerator {
    mode: FakeImageMode,
    calls: AtomicU32,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeImageGenerator {
    fn with_mode(mode: FakeImageMode) -> Self {
        Self {
            mode,
            calls: AtomicU32::new(0),
            prompts: Arc::default(),
        }
    }

    /// `count` images per call, keyed `products/{sku}_{i}.jpg`.
    pub fn many(count: usize) -> Self {
        Self::with_mode(FakeImageMode::Many(count))
    }

    /// One image per call, keyed `products/{sku}.jpg`.
    pub fn single() -> Self {
        Self::with_mode(FakeImageMode::Single)
    }

    /// Every call fails with an unrecognised output shape.
    pub fn failing() -> Self {
        Self::with_mode(FakeImageMode::Failing)
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<ImageBatch, CatalogError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FakeImageMode::Many(count) => Ok(ImageBatch {
                urls: (0..count)
                    .map(|i| format!("https://provider.test/{call}/{i}.png"))
                    .collect(),
                layout: KeyLayout::Indexed,
            }),
            FakeImageMode::Single => Ok(ImageBatch {
                urls: vec![format!("https://provider.test/{call}/0.png")],
                layout: KeyLayout::Single,
            }),
            FakeImageMode::Failing => Err(CatalogError::InvalidOutputFormat("42".into())),
        }
    }
}

/// Fetcher that answers every URL with the same status.
#[derive(Debug, Clone, Copy)]
pub struct StaticImageFetcher {
    status: u16,
}

impl StaticImageFetcher {
    pub fn ok() -> Self {
        Self { status: 200 }
    }

    pub fn status(status: u16) -> Self {
        Self { status }
    }
}

#[async_trait]
impl ImageFetcher for StaticImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, CatalogError> {
        if (200..300).contains(&self.status) {
            Ok(Bytes::from_static(b"\xFF\xD8\xFF\xE0fake-jpeg"))
        } else {
            Err(CatalogError::Download {
                url: url.to_owned(),
                status: self.status,
            })
        }
    }
}

/// Object store keeping uploads in a map; URLs are `https://objects.test/{key}`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
}

impl MemoryObjectStore {
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|(body, _)| body.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_public(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, CatalogError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_owned(), (body, content_type.to_owned()));
        Ok(format!("https://objects.test/{key}"))
    }
}
