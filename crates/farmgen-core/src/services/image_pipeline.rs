use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use tracing::info;

use crate::error::{CatalogError, UpstreamError, UpstreamErrorKind};
use crate::http::{with_backoff, RetryPolicy};
use crate::services::image::{build_image_prompt, ImageGenerator, ProductType};
use crate::services::storage::ObjectStore;

const CONTENT_TYPE: &str = "image/jpeg";

/// Downloads the bytes behind a provider image URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, CatalogError>;
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

/// A download that failed after the transport succeeded.
enum FetchFailure {
    Status(u16),
    Upstream(UpstreamError),
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, CatalogError> {
        // Non-success statuses are reported as download errors, not retried.
        let outcome = with_backoff(&self.retry, "image.download", move || async move {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| UpstreamError::from_reqwest("image-host", e))?;
            let status = resp.status();
            if !status.is_success() {
                return Ok(Err(FetchFailure::Status(status.as_u16())));
            }
            match resp.bytes().await {
                Ok(bytes) => Ok(Ok(bytes)),
                Err(e) => Ok(Err(FetchFailure::Upstream(UpstreamError::new(
                    "image-host",
                    UpstreamErrorKind::Network,
                    e.to_string(),
                )))),
            }
        })
        .await?;

        match outcome {
            Ok(bytes) => Ok(bytes),
            Err(FetchFailure::Status(status)) => Err(CatalogError::Download {
                url: url.to_owned(),
                status,
            }),
            Err(FetchFailure::Upstream(e)) => Err(e.into()),
        }
    }
}

/// Prompt → provider → download → object storage, for one generation call.
#[derive(Clone)]
pub struct ImagePipeline {
    generator: Arc<dyn ImageGenerator>,
    fetcher: Arc<dyn ImageFetcher>,
    store: Arc<dyn ObjectStore>,
}

impl ImagePipeline {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        fetcher: Arc<dyn ImageFetcher>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            generator,
            fetcher,
            store,
        }
    }

    /// Generate images for a product and return their public URLs in
    /// provider order.
    ///
    /// Every image is downloaded and uploaded concurrently; the first failure
    /// fails the whole call.
    pub async fn generate_for(
        &self,
        prompt_name: &str,
        sku: &str,
        product_type: ProductType,
    ) -> Result<Vec<String>, CatalogError> {
        let prompt = build_image_prompt(prompt_name, product_type);
        let batch = self.generator.generate(&prompt).await?;

        let uploads = batch.urls.iter().enumerate().map(|(index, source)| {
            let key = batch.layout.object_key(sku, index);
            async move {
                let bytes = self.fetcher.fetch(source).await?;
                self.store.put_public(&key, bytes, CONTENT_TYPE).await
            }
        });
        let urls = try_join_all(uploads).await?;

        info!(sku, %product_type, images = urls.len(), "images stored");
        Ok(urls)
    }
}
