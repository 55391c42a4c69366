//! Storage gateway.
//!
//! One trait per table ([`FarmStore`], [`ProductStore`], [`HistoryStore`]),
//! all implemented by [`SqliteStore`].  To move to another database,
//! implement the traits for a new type and change the concrete type held in
//! the server's `AppState`.
//!
//! All trait methods use `impl Future` in their signatures so no boxing is
//! involved.  Every write goes through the single connection pool; no
//! statement spans more than one row-level operation.

pub mod dao;
pub mod farm;
pub mod history;
pub mod product;

pub use dao::{Farm, HistoryEntry, HistoryKind, ImageAttempt, NewProduct, Product, ProductPatch, ProductStatus};

pub use farm::FarmStore;
pub use history::HistoryStore;
pub use product::ProductStore;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::StoreError;

/// SQLite-backed catalog store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL, e.g. `"sqlite://farmgen.db"` or
    /// `"sqlite::memory:"` for tests.  An in-memory database lives exactly as
    /// long as its connection, so the pool is pinned to one connection that is
    /// never recycled.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options)
                .await?
        };
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

// ── row helpers ──────────────────────────────────────────────────────────────

/// Fixed-width UTC timestamps so that `ORDER BY created_at` on the TEXT
/// column matches chronological order.
pub(crate) fn to_db_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, error = %e, "failed to parse stored timestamp; using now");
        Utc::now()
    })
}

pub(crate) fn parse_uuid(raw: &str, column: &str) -> Result<Uuid, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{column} '{raw}' is not a UUID: {e}")))
}
