//! Adapter configuration.
//!
//! Nothing in this crate reads the process environment.  The server builds
//! these structs once at startup and hands them to the adapter
//! constructors, which keeps the adapters trivially constructible in tests.

use std::time::Duration;

use crate::http::RetryPolicy;

/// Settings for the OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Base URL up to and including the version segment,
    /// e.g. `"https://api.openai.com/v1"`.
    pub base_url: String,
    pub model: String,
    /// Output bound for description generation.
    pub max_tokens: u32,
    pub temperature: f32,
    pub retry: RetryPolicy,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4".into(),
            max_tokens: 300,
            temperature: 0.7,
            retry: RetryPolicy::default(),
        }
    }
}

/// Settings for the Replicate predictions API.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub base_url: String,
    /// `owner/name` of the text-to-image model.
    pub model: String,
    /// Sent as `Prefer: wait=N`.  Must stay well below the HTTP client
    /// timeout; a prediction still running after it is polled instead.
    pub wait: Duration,
    /// Delay between status polls when a prediction is still running.
    pub poll_interval: Duration,
    /// Give up (as a timeout) after this many polls.
    pub max_polls: u32,
    pub retry: RetryPolicy,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: "https://api.replicate.com/v1".into(),
            model: "black-forest-labs/flux-1.1-pro".into(),
            wait: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            max_polls: 60,
            retry: RetryPolicy::default(),
        }
    }
}

/// Settings for the S3-compatible bucket (DigitalOcean Spaces by default).
#[derive(Debug, Clone)]
pub struct SpacesConfig {
    /// Endpoint host, with or without scheme, e.g. `"fra1.digitaloceanspaces.com"`.
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    /// Static credentials.  When either is empty the default AWS credential
    /// chain is used instead.
    pub access_key: String,
    pub secret_key: String,
    /// Overrides the `https://{bucket}.{endpoint}` public URL prefix
    /// (useful behind a CDN).
    pub public_base_url: Option<String>,
    /// Upper bound for a single `PutObject` call.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SpacesConfig {
    fn default() -> Self {
        Self {
            endpoint: "fra1.digitaloceanspaces.com".into(),
            region: "fra1".into(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            public_base_url: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl ReplicateConfig {
    /// `Prefer` header value; the API accepts 1 to 60 seconds.
    pub fn prefer_header(&self) -> String {
        format!("wait={}", self.wait.as_secs().clamp(1, 60))
    }
}

impl SpacesConfig {
    /// Endpoint with an `https://` scheme, as the S3 client expects.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else {
            format!("https://{}", self.endpoint)
        }
    }

    /// Public URL under which an object stored at `key` is served.
    pub fn public_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => {
                let host = self
                    .endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/');
                format!("https://{}.{}/{}", self.bucket, host, key)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn public_url_uses_virtual_host_style() {
        let cfg = SpacesConfig {
            endpoint: "https://fra1.digitaloceanspaces.com/".into(),
            bucket: "farm-media".into(),
            ..SpacesConfig::default()
        };
        assert_eq!(
            cfg.public_url("products/SKU-1_0.jpg"),
            "https://farm-media.fra1.digitaloceanspaces.com/products/SKU-1_0.jpg"
        );
    }

    #[test]
    fn public_base_url_overrides_host() {
        let cfg = SpacesConfig {
            bucket: "farm-media".into(),
            public_base_url: Some("https://cdn.example.com/".into()),
            ..SpacesConfig::default()
        };
        assert_eq!(cfg.public_url("products/a.jpg"), "https://cdn.example.com/products/a.jpg");
    }

    #[test]
    fn prefer_header_is_clamped() {
        let mut cfg = ReplicateConfig::default();
        assert_eq!(cfg.prefer_header(), "wait=30");
        cfg.wait = Duration::from_millis(200);
        assert_eq!(cfg.prefer_header(), "wait=1");
        cfg.wait = Duration::from_secs(600);
        assert_eq!(cfg.prefer_header(), "wait=60");
    }

    #[test]
    fn endpoint_url_adds_scheme() {
        let cfg = SpacesConfig::default();
        assert_eq!(cfg.endpoint_url(), "https://fra1.digitaloceanspaces.com");
    }
}
