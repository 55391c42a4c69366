//! farmgen-server – entry point.
//!
//! Startup order:
//! 1. Load `.env` (if present) and parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database and run pending migrations.
//! 4. Construct the provider adapters and the product workflow once.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use farmgen_core::http::build_client;
use farmgen_core::services::{
    HttpImageFetcher, ImagePipeline, OpenAiTextGenerator, ProductWorkflow, ReplicateImageGenerator,
    SpacesObjectStore,
};
use farmgen_core::SqliteStore;
use tracing::{info, warn};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let dotenv = dotenvy::dotenv();
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: FARMGEN_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "farmgen-server starting");
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to load .env file"),
    }

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = Arc::new(SqliteStore::connect(&cfg.database_url).await?);
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Adapters and workflow ───────────────────────────────────────────────
    let client = build_client(cfg.request_timeout)?;
    if cfg.openai_api_key.is_empty() {
        warn!("FARMGEN_OPENAI_API_KEY is not set; description generation will fail");
    }
    if cfg.replicate_api_token.is_empty() {
        warn!("FARMGEN_REPLICATE_API_TOKEN is not set; image generation will fail");
    }
    if cfg.spaces_bucket.is_empty() {
        warn!("FARMGEN_SPACES_BUCKET is not set; image uploads will fail");
    }

    let text = Arc::new(OpenAiTextGenerator::new(client.clone(), cfg.openai()));
    let images = ImagePipeline::new(
        Arc::new(ReplicateImageGenerator::new(client.clone(), cfg.replicate())),
        Arc::new(HttpImageFetcher::new(client, cfg.retry_policy())),
        Arc::new(SpacesObjectStore::connect(cfg.spaces()).await),
    );
    let workflow = ProductWorkflow::new(store.clone(), text, images)
        .with_classification(cfg.classify_products);
    info!(
        openai_model = %cfg.openai_model,
        replicate_model = %cfg.replicate_model,
        bucket = %cfg.spaces_bucket,
        "content adapters ready"
    );

    // ── 5. Shared application state ────────────────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store,
        workflow: Arc::new(workflow),
    });

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(state);
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("farmgen-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
