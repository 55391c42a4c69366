//! Image Generation Adapter: prompt construction and the Replicate
//! predictions client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, info};

use crate::config::ReplicateConfig;
use crate::error::{CatalogError, UpstreamError, UpstreamErrorKind};
use crate::http::{with_backoff, with_backoff_if};

const PROVIDER: &str = "replicate";

const NAME_MAX_CHARS: usize = 15;

const FILLER_WORDS: &[&str] = &[
    "produkt",
    "potravina",
    "čerstvé",
    "bio",
    "organické",
    "selský",
    "měkký",
    "tučný",
    "bílý",
    "černý",
    "krémový",
    "čerstvý",
];

const NEGATIVE_PROMPT: &str = " No watermarks, no text, no logos, no background objects.";

/// Consistency class of a product; selects the image prompt template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ProductType {
    Solid,
    SemiSolid,
    Liquid,
    #[default]
    Unknown,
}

/// Strip quantities such as `1 kg`, drop filler words, and shorten to at
/// most 15 characters on word boundaries.
pub fn normalize_product_name(name: &str) -> String {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    let mut words = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        if is_quantity(token) {
            i += 1;
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit())
            && tokens.get(i + 1).is_some_and(|next| next.eq_ignore_ascii_case("kg"))
        {
            i += 2;
            continue;
        }
        if !FILLER_WORDS.contains(&token.to_lowercase().as_str()) {
            words.push(token);
        }
        i += 1;
    }

    let joined = words.join(" ");
    if joined.chars().count() <= NAME_MAX_CHARS {
        return joined;
    }

    let mut kept = Vec::new();
    let mut used = 0;
    for word in &words {
        let len = word.chars().count();
        if used + len + 1 > NAME_MAX_CHARS {
            break;
        }
        kept.push(*word);
        used += len + 1;
    }
    if kept.is_empty() {
        // A single word longer than the limit.
        return joined.chars().take(NAME_MAX_CHARS).collect();
    }
    kept.join(" ")
}

fn is_quantity(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    lower
        .strip_suffix("kg")
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Compose the text-to-image prompt for a (normalized, English) product name.
pub fn build_image_prompt(name: &str, product_type: ProductType) -> String {
    let body = match product_type {
        ProductType::Liquid => format!(
            "Side view product photo of {name}, placed in a glass pitcher, on a clean white background, \
             well-lit and centered. The {name} appears creamy and smooth. No text."
        ),
        ProductType::SemiSolid => format!(
            "Side view product photo of {name}, served in a black ceramic bowl, on a clean white background, \
             well-lit and centered. The {name} has a rich and creamy texture. No text."
        ),
        ProductType::Solid => format!(
            "Side view product photo of {name}, placed on a clean white background, well-lit and centered. \
             The {name} is firm and has a smooth consistency. No text."
        ),
        ProductType::Unknown => format!(
            "Side view product photo of {name}, placed on a clean white background, well-lit and centered. No text."
        ),
    };
    body + NEGATIVE_PROMPT
}

/// How object keys are derived for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    /// `products/{sku}_{index}.jpg`
    Indexed,
    /// `products/{sku}.jpg`
    Single,
}

impl KeyLayout {
    pub fn object_key(self, sku: &str, index: usize) -> String {
        match self {
            KeyLayout::Indexed => format!("products/{sku}_{index}.jpg"),
            KeyLayout::Single => format!("products/{sku}.jpg"),
        }
    }
}

/// Provider image URLs from one generation call, in provider order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBatch {
    pub urls: Vec<String>,
    pub layout: KeyLayout,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ImageBatch, CatalogError>;
}

// ── Replicate wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct PredictionRequest<'a> {
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

/// The output shapes the predictions API is known to return.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplicateOutput {
    Many(Vec<String>),
    One(String),
    Object { url: String },
}

/// Normalize a prediction `output` value into an [`ImageBatch`].
fn decode_output(output: Option<Value>) -> Result<ImageBatch, CatalogError> {
    let value = output.ok_or_else(|| CatalogError::InvalidOutputFormat("missing output".into()))?;
    let decoded: ReplicateOutput = serde_json::from_value(value.clone())
        .map_err(|_| CatalogError::InvalidOutputFormat(truncate_value(&value)))?;
    let batch = match decoded {
        ReplicateOutput::Many(urls) => ImageBatch {
            urls,
            layout: KeyLayout::Indexed,
        },
        ReplicateOutput::One(url) | ReplicateOutput::Object { url } => ImageBatch {
            urls: vec![url],
            layout: KeyLayout::Single,
        },
    };
    if batch.urls.is_empty() || batch.urls.iter().any(|u| u.trim().is_empty()) {
        return Err(CatalogError::InvalidOutputFormat("empty image URL list".into()));
    }
    Ok(batch)
}

fn truncate_value(value: &Value) -> String {
    let text = value.to_string();
    text.chars().take(200).collect()
}

/// Replicate predictions client.  One instance is shared by all requests.
#[derive(Clone)]
pub struct ReplicateImageGenerator {
    client: reqwest::Client,
    config: ReplicateConfig,
}

impl ReplicateImageGenerator {
    pub fn new(client: reqwest::Client, config: ReplicateConfig) -> Self {
        Self { client, config }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Prediction, UpstreamError> {
        let resp = request
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(PROVIDER, e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::new(
                PROVIDER,
                UpstreamErrorKind::from_status(status.as_u16()),
                format!("HTTP {status}: {text}"),
            ));
        }
        resp.json::<Prediction>()
            .await
            .map_err(|e| UpstreamError::new(PROVIDER, UpstreamErrorKind::BadResponse, e.to_string()))
    }

    async fn create(&self, prompt: &str) -> Result<Prediction, UpstreamError> {
        let url = format!(
            "{}/models/{}/predictions",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let body = PredictionRequest {
            input: PredictionInput { prompt },
        };
        let prefer = self.config.prefer_header();
        let (url, body, prefer) = (&url, &body, &prefer);
        // Every accepted POST starts a billed prediction, so only explicit
        // refusals are sent again.
        with_backoff_if(
            &self.config.retry,
            "replicate.create",
            UpstreamError::is_refusal,
            move || async move {
                self.send(self.client.post(url).header("Prefer", prefer).json(body))
                    .await
            },
        )
        .await
    }

    async fn poll(&self, get_url: &str) -> Result<Prediction, UpstreamError> {
        with_backoff(&self.config.retry, "replicate.poll", move || async move {
            self.send(self.client.get(get_url)).await
        })
        .await
    }
}

#[async_trait]
impl ImageGenerator for ReplicateImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<ImageBatch, CatalogError> {
        let mut prediction = self.create(prompt).await?;
        let mut polls = 0u32;
        loop {
            match prediction.status {
                PredictionStatus::Succeeded => break,
                PredictionStatus::Failed | PredictionStatus::Canceled => {
                    let reason = prediction
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| format!("{:?}", prediction.status).to_lowercase());
                    return Err(UpstreamError::new(
                        PROVIDER,
                        UpstreamErrorKind::BadResponse,
                        format!("prediction {} did not succeed: {reason}", prediction.id),
                    )
                    .into());
                }
                PredictionStatus::Starting | PredictionStatus::Processing => {}
            }

            if polls >= self.config.max_polls {
                return Err(CatalogError::Timeout(PROVIDER));
            }
            let get_url = prediction
                .urls
                .as_ref()
                .map(|u| u.get.clone())
                .ok_or_else(|| CatalogError::InvalidOutputFormat("prediction has no status URL".into()))?;
            tokio::time::sleep(self.config.poll_interval).await;
            polls += 1;
            debug!(prediction = %prediction.id, polls, "polling prediction");
            prediction = self.poll(&get_url).await?;
        }

        let batch = decode_output(prediction.output)?;
        info!(prediction = %prediction.id, images = batch.urls.len(), polls, "image generation finished");
        Ok(batch)
    }
}
