//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use farmgen_core::config::{OpenAiConfig, ReplicateConfig, SpacesConfig};
use farmgen_core::http::RetryPolicy;

/// Runtime configuration for farmgen-server.
///
/// Every field has a default so the server starts without any environment
/// variables set; the external providers then answer with auth errors until
/// their credentials are supplied.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://farmgen.db"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Serve Swagger UI at `/swagger-ui` and the document at
    /// `/api-docs/openapi.json`.
    pub enable_swagger: bool,

    /// Comma-separated allowed CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// When set, every route except `/health` requires
    /// `Authorization: Bearer <token>`.
    pub api_token: Option<String>,

    /// Upper bound for multipart request bodies (CSV uploads).
    pub max_upload_bytes: usize,

    /// Per-call timeout for outbound HTTP requests.
    pub request_timeout: Duration,

    pub retry_attempts: u32,
    pub retry_base_delay: Duration,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub openai_temperature: f32,

    pub replicate_api_token: String,
    pub replicate_base_url: String,
    pub replicate_model: String,
    pub replicate_poll_interval: Duration,
    /// Synchronous wait requested when creating a prediction.  Capped at
    /// half of `request_timeout`.
    pub replicate_wait: Duration,

    pub spaces_endpoint: String,
    pub spaces_region: String,
    pub spaces_bucket: String,
    pub spaces_key: String,
    pub spaces_secret: String,
    pub spaces_public_base_url: Option<String>,

    /// Translate and classify product names before image generation.
    pub classify_products: bool,
}

impl Default for Config {
    fn default() -> Self {
        let openai = OpenAiConfig::default();
        let replicate = ReplicateConfig::default();
        let spaces = SpacesConfig::default();
        let retry = RetryPolicy::default();
        Self {
            bind_address: "0.0.0.0:3000".into(),
            database_url: "sqlite://farmgen.db".into(),
            log_level: "info".into(),
            log_json: false,
            enable_swagger: true,
            cors_allowed_origins: None,
            api_token: None,
            max_upload_bytes: 10 * 1024 * 1024,
            request_timeout: Duration::from_secs(60),
            retry_attempts: retry.max_attempts,
            retry_base_delay: retry.base_delay,
            openai_api_key: openai.api_key,
            openai_base_url: openai.base_url,
            openai_model: openai.model,
            openai_max_tokens: openai.max_tokens,
            openai_temperature: openai.temperature,
            replicate_api_token: replicate.api_token,
            replicate_base_url: replicate.base_url,
            replicate_model: replicate.model,
            replicate_poll_interval: replicate.poll_interval,
            replicate_wait: replicate.wait,
            spaces_endpoint: spaces.endpoint,
            spaces_region: spaces.region,
            spaces_bucket: spaces.bucket,
            spaces_key: spaces.access_key,
            spaces_secret: spaces.secret_key,
            spaces_public_base_url: spaces.public_base_url,
            classify_products: true,
        }
    }
}

impl Config {
    /// Build [`Config`] from `FARMGEN_*` environment variables, falling back
    /// to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind_address: env_or("FARMGEN_BIND", &d.bind_address),
            database_url: env_or("FARMGEN_DATABASE_URL", &d.database_url),
            log_level: env_or("FARMGEN_LOG", &d.log_level),
            log_json: env_flag("FARMGEN_LOG_JSON", d.log_json),
            enable_swagger: env_flag("FARMGEN_ENABLE_SWAGGER", d.enable_swagger),
            cors_allowed_origins: env_opt("FARMGEN_CORS_ORIGINS"),
            api_token: env_opt("FARMGEN_API_TOKEN"),
            max_upload_bytes: parse_env("FARMGEN_MAX_UPLOAD_BYTES", d.max_upload_bytes),
            request_timeout: Duration::from_secs(parse_env(
                "FARMGEN_REQUEST_TIMEOUT_SECS",
                d.request_timeout.as_secs(),
            )),
            retry_attempts: parse_env("FARMGEN_RETRY_ATTEMPTS", d.retry_attempts),
            retry_base_delay: Duration::from_millis(parse_env(
                "FARMGEN_RETRY_BASE_DELAY_MS",
                d.retry_base_delay.as_millis() as u64,
            )),
            openai_api_key: env_or("FARMGEN_OPENAI_API_KEY", &d.openai_api_key),
            openai_base_url: env_or("FARMGEN_OPENAI_BASE_URL", &d.openai_base_url),
            openai_model: env_or("FARMGEN_OPENAI_MODEL", &d.openai_model),
            openai_max_tokens: parse_env("FARMGEN_OPENAI_MAX_TOKENS", d.openai_max_tokens),
            openai_temperature: parse_env("FARMGEN_OPENAI_TEMPERATURE", d.openai_temperature),
            replicate_api_token: env_or("FARMGEN_REPLICATE_API_TOKEN", &d.replicate_api_token),
            replicate_base_url: env_or("FARMGEN_REPLICATE_BASE_URL", &d.replicate_base_url),
            replicate_model: env_or("FARMGEN_REPLICATE_MODEL", &d.replicate_model),
            replicate_poll_interval: Duration::from_millis(parse_env(
                "FARMGEN_REPLICATE_POLL_MS",
                d.replicate_poll_interval.as_millis() as u64,
            )),
            replicate_wait: Duration::from_secs(parse_env(
                "FARMGEN_REPLICATE_WAIT_SECS",
                d.replicate_wait.as_secs(),
            )),
            spaces_endpoint: env_or("FARMGEN_SPACES_ENDPOINT", &d.spaces_endpoint),
            spaces_region: env_or("FARMGEN_SPACES_REGION", &d.spaces_region),
            spaces_bucket: env_or("FARMGEN_SPACES_BUCKET", &d.spaces_bucket),
            spaces_key: env_or("FARMGEN_SPACES_KEY", &d.spaces_key),
            spaces_secret: env_or("FARMGEN_SPACES_SECRET", &d.spaces_secret),
            spaces_public_base_url: env_opt("FARMGEN_SPACES_PUBLIC_URL"),
            classify_products: env_flag("FARMGEN_CLASSIFY_PRODUCTS", d.classify_products),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: self.retry_base_delay,
        }
    }

    pub fn openai(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            model: self.openai_model.clone(),
            max_tokens: self.openai_max_tokens,
            temperature: self.openai_temperature,
            retry: self.retry_policy(),
        }
    }

    pub fn replicate(&self) -> ReplicateConfig {
        ReplicateConfig {
            api_token: self.replicate_api_token.clone(),
            base_url: self.replicate_base_url.clone(),
            model: self.replicate_model.clone(),
            wait: self.replicate_wait.min(self.request_timeout / 2),
            poll_interval: self.replicate_poll_interval,
            retry: self.retry_policy(),
            ..ReplicateConfig::default()
        }
    }

    pub fn spaces(&self) -> SpacesConfig {
        SpacesConfig {
            endpoint: self.spaces_endpoint.clone(),
            region: self.spaces_region.clone(),
            bucket: self.spaces_bucket.clone(),
            access_key: self.spaces_key.clone(),
            secret_key: self.spaces_secret.clone(),
            public_base_url: self.spaces_public_base_url.clone(),
            timeout: self.request_timeout,
            retry: self.retry_policy(),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn adapter_configs_share_the_retry_policy() {
        let cfg = Config {
            retry_attempts: 5,
            retry_base_delay: Duration::from_millis(20),
            spaces_bucket: "media".into(),
            ..Config::default()
        };
        assert_eq!(cfg.openai().retry.max_attempts, 5);
        assert_eq!(cfg.replicate().retry.base_delay, Duration::from_millis(20));
        assert_eq!(cfg.spaces().bucket, "media");
        assert_eq!(cfg.spaces().timeout, cfg.request_timeout);
    }

    #[test]
    fn replicate_wait_stays_below_request_timeout() {
        let cfg = Config::default();
        assert!(cfg.replicate().wait < cfg.request_timeout);

        let cfg = Config {
            request_timeout: Duration::from_secs(20),
            replicate_wait: Duration::from_secs(60),
            ..Config::default()
        };
        assert_eq!(cfg.replicate().wait, Duration::from_secs(10));
    }

    #[test]
    fn defaults_match_provider_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.openai().model, "gpt-4");
        assert_eq!(cfg.replicate().model, "black-forest-labs/flux-1.1-pro");
        assert!(cfg.api_token.is_none());
    }
}
