//! Object storage for generated images (S3-compatible; DigitalOcean Spaces
//! by default).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use bytes::Bytes;
use tracing::debug;

use crate::config::SpacesConfig;
use crate::error::{CatalogError, UpstreamError, UpstreamErrorKind};
use crate::http::with_backoff;

const PROVIDER: &str = "spaces";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` with public-read access and return the URL
    /// it is served from.  Writing an existing key replaces the object.
    async fn put_public(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, CatalogError>;
}

pub struct SpacesObjectStore {
    client: aws_sdk_s3::Client,
    config: SpacesConfig,
}

impl std::fmt::Debug for SpacesObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpacesObjectStore")
            .field("endpoint", &self.config.endpoint)
            .field("bucket", &self.config.bucket)
            .finish()
    }
}

impl SpacesObjectStore {
    /// Build the S3 client.  Static credentials from `config` win; when they
    /// are empty the default AWS provider chain is consulted.
    pub async fn connect(config: SpacesConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if !config.access_key.is_empty() && !config.secret_key.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                None,
                None,
                "farmgen-config",
            ));
        }
        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .endpoint_url(config.endpoint_url())
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            config,
        }
    }
}

fn classify(e: &SdkError<PutObjectError, HttpResponse>) -> UpstreamErrorKind {
    match e {
        SdkError::TimeoutError(_) => UpstreamErrorKind::Timeout,
        SdkError::DispatchFailure(_) => UpstreamErrorKind::Network,
        _ => e
            .raw_response()
            .map(|r| UpstreamErrorKind::from_status(r.status().as_u16()))
            .unwrap_or(UpstreamErrorKind::BadResponse),
    }
}

#[async_trait]
impl ObjectStore for SpacesObjectStore {
    async fn put_public(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, CatalogError> {
        let size = body.len();
        let body = &body;
        with_backoff(&self.config.retry, "spaces.put_object", move || async move {
            let request = self
                .client
                .put_object()
                .bucket(&self.config.bucket)
                .key(key)
                .body(ByteStream::from(body.clone()))
                .content_type(content_type)
                .acl(ObjectCannedAcl::PublicRead)
                .send();
            match tokio::time::timeout(self.config.timeout, request).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(UpstreamError::new(
                    PROVIDER,
                    classify(&e),
                    DisplayErrorContext(&e).to_string(),
                )),
                Err(_) => Err(UpstreamError::new(
                    PROVIDER,
                    UpstreamErrorKind::Timeout,
                    format!("put_object {key} exceeded {:?}", self.config.timeout),
                )),
            }
        })
        .await?;

        debug!(key, size, "object uploaded");
        Ok(self.config.public_url(key))
    }
}
