//! Error taxonomy shared by the storage gateway, the adapters and the
//! workflow controller.
//!
//! [`CatalogError`] is what every public operation returns.  The narrower
//! enums ([`StoreError`], [`UpstreamError`], [`FileError`]) describe one layer
//! each and convert into it with `?`.

use serde::Serialize;
use strum::{Display, IntoStaticStr};
use thiserror::Error;
use utoipa::ToSchema;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    /// API field name, e.g. `"shortDescription"`.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failures of the storage gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint (farm external id, product SKU) was violated.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// `update_product` was called with an empty patch.
    #[error("no fields provided for update")]
    NoFieldsProvided,

    #[error("not found: {0}")]
    NotFound(String),

    /// A stored row could not be decoded (bad UUID, malformed JSON column).
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::DuplicateKey(db.message().to_owned());
            }
        }
        StoreError::Database(e)
    }
}

/// Classification of a failed call to a third-party API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// HTTP 429.
    RateLimited,
    /// HTTP 401 / 403: bad or missing credentials.
    Unauthorized,
    /// HTTP 5xx.
    Server,
    /// Connection refused, DNS failure, reset.
    Network,
    /// The call did not finish within the configured timeout.
    Timeout,
    /// Any other non-success status or an undecodable body.
    BadResponse,
}

impl UpstreamErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::Unauthorized,
            500..=599 => Self::Server,
            _ => Self::BadResponse,
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Server | Self::Network | Self::Timeout
        )
    }
}

/// A failed call to the LLM, image-generation or object-storage provider.
#[derive(Debug, Clone, Error)]
#[error("{provider} {kind}: {message}")]
pub struct UpstreamError {
    /// Short provider name, e.g. `"openai"`.
    pub provider: &'static str,
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(provider: &'static str, kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_reqwest(provider: &'static str, e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            UpstreamErrorKind::Timeout
        } else if let Some(status) = e.status() {
            UpstreamErrorKind::from_status(status.as_u16())
        } else if e.is_decode() {
            UpstreamErrorKind::BadResponse
        } else {
            UpstreamErrorKind::Network
        };
        Self::new(provider, kind, e.to_string())
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// The provider answered and refused the request before doing any work,
    /// so sending it again cannot duplicate a side effect.
    pub fn is_refusal(&self) -> bool {
        self.kind == UpstreamErrorKind::RateLimited
    }
}

/// CSV import input failures.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("failed to read import file: {0}")]
    Io(#[from] std::io::Error),

    /// `line` is the 1-based line of the offending record when known.
    #[error("CSV parse error{}: {message}", .line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Parse { line: Option<u64>, message: String },
}

impl From<csv::Error> for FileError {
    fn from(e: csv::Error) -> Self {
        let line = e.position().map(|p| p.line());
        // csv's own Display repeats the position and a "CSV ... error" prefix.
        let message = match e.kind() {
            csv::ErrorKind::Io(io) => io.to_string(),
            csv::ErrorKind::Utf8 { err, .. } => {
                format!("invalid UTF-8 in field {}", err.field() + 1)
            }
            csv::ErrorKind::UnequalLengths { expected_len, len, .. } => {
                format!("found {len} fields, expected {expected_len}")
            }
            csv::ErrorKind::Deserialize { err, .. } => err.to_string(),
            _ => e.to_string(),
        };
        FileError::Parse { line, message }
    }
}

/// Every error a catalog operation can surface.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// One or more input fields failed validation.
    #[error("validation failed: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("no fields provided for update")]
    NoFieldsProvided,

    /// The completion API answered but produced no text.
    #[error("text generation returned no content")]
    GenerationEmpty,

    /// The image API answered with an output shape that carries no URLs.
    #[error("invalid image generation output: {0}")]
    InvalidOutputFormat(String),

    /// Downloading a generated image returned a non-success status.
    #[error("image download failed with status {status}: {url}")]
    Download { url: String, status: u16 },

    #[error("upstream error: {0}")]
    Upstream(UpstreamError),

    /// An external call exceeded its time budget.
    #[error("{0} call timed out")]
    Timeout(&'static str),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    File(#[from] FileError),
}

impl CatalogError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        CatalogError::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<UpstreamError> for CatalogError {
    fn from(e: UpstreamError) -> Self {
        match e.kind {
            UpstreamErrorKind::Timeout => CatalogError::Timeout(e.provider),
            _ => CatalogError::Upstream(e),
        }
    }
}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateKey(m) => CatalogError::DuplicateKey(m),
            StoreError::NoFieldsProvided => CatalogError::NoFieldsProvided,
            StoreError::NotFound(m) => CatalogError::NotFound(m),
            StoreError::Corrupt(m) => CatalogError::Corrupt(m),
            StoreError::Database(e) => CatalogError::Database(e),
        }
    }
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
