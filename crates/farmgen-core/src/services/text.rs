//! Text Generation Adapter: product descriptions and name classification
//! through an OpenAI-compatible chat-completions endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OpenAiConfig;
use crate::error::{CatalogError, UpstreamError, UpstreamErrorKind};
use crate::http::with_backoff;
use crate::services::image::ProductType;

const PROVIDER: &str = "openai";

pub const SHORT_DESCRIPTION_MAX: usize = 150;
pub const LONG_DESCRIPTION_MAX: usize = 300;

const SYSTEM_PROMPT: &str = "You write factual, third-person product copy for a farm shop catalog. \
Do not invent claims that are not supported by the product name or ingredients.";

const CLASSIFY_PROMPT: &str = "Translate the product name to English and classify its consistency. \
Answer on one line in the form `<english name>; <type>` where <type> is one of: solid, semi-solid, liquid.";

/// Generated copy for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptions {
    pub short_description: String,
    pub long_description: String,
}

/// English image name plus consistency class, used to pick an image prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub english_name: String,
    pub product_type: ProductType,
}

impl Classification {
    /// What the workflow uses when classification is disabled or fails.
    pub fn unknown(name: &str) -> Self {
        Self {
            english_name: name.to_owned(),
            product_type: ProductType::Unknown,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_descriptions(
        &self,
        name: &str,
        ingredients: Option<&str>,
    ) -> Result<Descriptions, CatalogError>;

    async fn classify(&self, name: &str) -> Result<Classification, CatalogError>;
}

// ── OpenAI wire types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client.  One instance is shared by all requests.
#[derive(Clone)]
pub struct OpenAiTextGenerator {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiTextGenerator {
    pub fn new(client: reqwest::Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }

    async fn complete(
        &self,
        system: &str,
        user: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, CatalogError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_owned(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens,
            temperature,
        };

        let (url, body) = (&url, &body);
        let response: ChatResponse = with_backoff(&self.config.retry, "openai.chat", move || async move {
            let resp = self
                .client
                .post(url)
                .bearer_auth(&self.config.api_key)
                .json(body)
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
            resp.json::<ChatResponse>()
                .await
                .map_err(|e| UpstreamError::new(PROVIDER, UpstreamErrorKind::BadResponse, e.to_string()))
        })
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(CatalogError::GenerationEmpty)
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn generate_descriptions(
        &self,
        name: &str,
        ingredients: Option<&str>,
    ) -> Result<Descriptions, CatalogError> {
        let content = self
            .complete(
                SYSTEM_PROMPT,
                description_prompt(name, ingredients),
                self.config.max_tokens,
                self.config.temperature,
            )
            .await?;
        debug!(name, chars = content.len(), "description completion received");
        parse_descriptions(&content)
    }

    async fn classify(&self, name: &str) -> Result<Classification, CatalogError> {
        let content = self
            .complete(CLASSIFY_PROMPT, format!("Product name: {name}"), 100, 0.2)
            .await?;
        Ok(parse_classification(name, &content))
    }
}

fn description_prompt(name: &str, ingredients: Option<&str>) -> String {
    let ingredients = ingredients.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("not specified");
    format!(
        "Product: {name}\nIngredients: {ingredients}\n\n\
         Write two descriptions of this product.\n\
         Line 1: a short description of at most {SHORT_DESCRIPTION_MAX} characters.\n\
         Following lines: a long description between 100 and {LONG_DESCRIPTION_MAX} characters.\n\
         Do not add headings or labels."
    )
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Split a completion into short and long copy.
///
/// The first non-empty line is the short description; all remaining
/// non-empty lines, joined with spaces, are the long description.
pub fn parse_descriptions(content: &str) -> Result<Descriptions, CatalogError> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let short = lines.next().ok_or(CatalogError::GenerationEmpty)?;
    let long = lines.collect::<Vec<_>>().join(" ");
    Ok(Descriptions {
        short_description: truncate_chars(short, SHORT_DESCRIPTION_MAX),
        long_description: truncate_chars(&long, LONG_DESCRIPTION_MAX),
    })
}

/// Parse `<english name>; <type>`.  Anything unrecognised keeps the
/// original name and yields [`ProductType::Unknown`].
pub fn parse_classification(original: &str, content: &str) -> Classification {
    let line = content.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    let Some((name, kind)) = line.rsplit_once(';') else {
        warn!(original, response = line, "unparseable classification response");
        return Classification::unknown(original);
    };
    let english_name = name.trim().trim_matches('"');
    Classification {
        english_name: if english_name.is_empty() {
            original.to_owned()
        } else {
            english_name.to_owned()
        },
        product_type: kind.trim().to_lowercase().parse().unwrap_or(ProductType::Unknown),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::http::{build_client, RetryPolicy};
    use crate::testing::http_stub::{StubResponse, StubServer};

    #[test]
    fn first_line_is_short_rest_is_long() {
        let d = parse_descriptions("\n  Creamy goat cheese.  \nMade from fresh milk.\n\nAged two weeks.").unwrap();
        assert_eq!(d.short_description, "Creamy goat cheese.");
        assert_eq!(d.long_description, "Made from fresh milk. Aged two weeks.");
    }

    #[test]
    fn descriptions_are_truncated_by_characters() {
        let short = "č".repeat(200);
        let long = "ž".repeat(400);
        let d = parse_descriptions(&format!("{short}\n{long}")).unwrap();
        assert_eq!(d.short_description.chars().count(), SHORT_DESCRIPTION_MAX);
        assert_eq!(d.long_description.chars().count(), LONG_DESCRIPTION_MAX);
    }

    #[test]
    fn blank_completion_is_empty_generation() {
        assert!(matches!(parse_descriptions(" \n\n "), Err(CatalogError::GenerationEmpty)));
    }

    #[test]
    fn single_line_leaves_long_empty() {
        let d = parse_descriptions("Only one line").unwrap();
        assert_eq!(d.long_description, "");
    }

    #[test]
    fn classification_is_parsed() {
        let c = parse_classification("Mléko", "Milk; liquid");
        assert_eq!(c.english_name, "Milk");
        assert_eq!(c.product_type, ProductType::Liquid);

        let c = parse_classification("Tvaroh", "\"Quark\"; Semi-Solid");
        assert_eq!(c.english_name, "Quark");
        assert_eq!(c.product_type, ProductType::SemiSolid);
    }

    #[test]
    fn unparseable_classification_falls_back() {
        assert_eq!(parse_classification("Sýr", "I am not sure"), Classification::unknown("Sýr"));
        let c = parse_classification("Sýr", "Cheese; gaseous");
        assert_eq!(c.english_name, "Cheese");
        assert_eq!(c.product_type, ProductType::Unknown);
    }

    // ── chat-completions client against a local server ───────────────────────

    fn client(stub: &StubServer, max_attempts: u32) -> OpenAiTextGenerator {
        let config = OpenAiConfig {
            api_key: "sk-test".into(),
            base_url: format!("{}/v1/", stub.base_url()),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1),
            },
            ..OpenAiConfig::default()
        };
        OpenAiTextGenerator::new(build_client(Duration::from_secs(5)).unwrap(), config)
    }

    fn completion(content: serde_json::Value) -> StubResponse {
        StubResponse::json(200, json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
    }

    #[tokio::test]
    async fn descriptions_request_carries_model_and_credentials() {
        let stub = StubServer::start(vec![completion(json!("Fresh milk.\nFrom our own cows, bottled daily."))]).await;
        let d = client(&stub, 1).generate_descriptions("Mléko", Some("milk")).await.unwrap();

        assert_eq!(d.short_description, "Fresh milk.");
        assert_eq!(d.long_description, "From our own cows, bottled daily.");
        let requests = stub.requests();
        assert_eq!(requests[0].path, "/v1/chat/completions");
        assert_eq!(requests[0].header("authorization"), Some("Bearer sk-test"));
        let body = requests[0].json();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 300);
        assert!(body["messages"][1]["content"].as_str().unwrap().contains("Mléko"));
    }

    #[tokio::test]
    async fn classification_uses_a_small_cool_completion() {
        let stub = StubServer::start(vec![completion(json!("Milk; liquid"))]).await;
        let c = client(&stub, 1).classify("Mléko").await.unwrap();

        assert_eq!(c.product_type, ProductType::Liquid);
        let body = stub.requests()[0].json();
        assert_eq!(body["max_tokens"], 100);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn missing_content_is_empty_generation() {
        for reply in [
            StubResponse::json(200, json!({"choices": []})),
            StubResponse::json(200, json!({})),
            completion(json!(null)),
            completion(json!("   ")),
        ] {
            let stub = StubServer::start(vec![reply]).await;
            let err = client(&stub, 1).generate_descriptions("Sýr", None).await.unwrap_err();
            assert!(matches!(err, CatalogError::GenerationEmpty), "got {err:?}");
        }
    }

    #[tokio::test]
    async fn error_statuses_are_classified() {
        for (status, kind) in [
            (401, UpstreamErrorKind::Unauthorized),
            (429, UpstreamErrorKind::RateLimited),
            (500, UpstreamErrorKind::Server),
            (400, UpstreamErrorKind::BadResponse),
        ] {
            let stub = StubServer::start(vec![StubResponse::json(status, json!({"error": {"message": "nope"}}))]).await;
            let err = client(&stub, 1).generate_descriptions("Sýr", None).await.unwrap_err();
            match err {
                CatalogError::Upstream(e) => {
                    assert_eq!(e.kind, kind, "status {status}");
                    assert_eq!(e.provider, "openai");
                }
                other => panic!("status {status}: unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let stub = StubServer::start(vec![
            StubResponse::json(503, json!({"error": {"message": "overloaded"}})),
            completion(json!("Short.\nLong.")),
        ])
        .await;
        let d = client(&stub, 3).generate_descriptions("Sýr", None).await.unwrap();

        assert_eq!(d.short_description, "Short.");
        assert_eq!(stub.count("POST"), 2);
    }

    #[tokio::test]
    async fn undecodable_body_is_a_bad_response() {
        let stub = StubServer::start(vec![StubResponse::bytes(200, b"<html>gateway</html>")]).await;
        let err = client(&stub, 3).generate_descriptions("Sýr", None).await.unwrap_err();

        assert!(matches!(err, CatalogError::Upstream(ref e) if e.kind == UpstreamErrorKind::BadResponse));
        assert_eq!(stub.count("POST"), 1);
    }
}
