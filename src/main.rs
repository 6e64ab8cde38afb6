//! Application entry point for the `sensorflow-ingest` service.
//!
//! This binary orchestrates the startup sequence for the building-sensor
//! ingest API:
//! - Loading `.env.{STAGE}` / `.env` and parsing configuration
//! - Initializing structured logging/tracing
//! - Building the measurement store (PostgreSQL pool + schema, or in-memory)
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `API_KEY` (**required**) – shared secret for the sensor routes
//! - `STORE_BACKEND` (optional) – `postgres` (default) or `memory`
//! - `DATABASE_URL` (**required** for postgres) – PostgreSQL connection string
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config` for the full list.
use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

mod config;
mod context;
mod error;
mod models;
mod routes;
mod schema;
mod service;
mod store;
mod trend;
mod validation;

pub use config::Config;

// Re-exported for routes/*.rs and the store/service layers, so submodules
// depend on their parent module rather than on each other's file layout.
pub use context::{AppContext, TableMap};
pub use error::ApiError;
pub use models::{
    DerivedLogEntry, Dimension, MeasureRecord, MeasureValue, ReadingShape, ScalarType,
    SensorKind, StrictValue, TrendCheck,
};

use config::StoreBackend;
use store::{MeasurementStore, MemoryStore, PgStore};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let env_files = config::load_dotenv_files();
    init_tracing();
    for path in &env_files {
        tracing::debug!("Loaded {}", path.display());
    }

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let store = build_store(&cfg).await?;
    let ctx = AppContext::new(store, TableMap::new(cfg.tables.clone()));

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(ctx, routes::ApiKey::new(&cfg.api_key));

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_store(cfg: &Config) -> Result<Arc<dyn MeasurementStore>> {
    // ---
    let db_url = match (cfg.backend, cfg.db_url.as_deref()) {
        (StoreBackend::Memory, _) => {
            tracing::warn!("Using in-memory store; readings are lost on restart");
            return Ok(Arc::new(MemoryStore::new()));
        }
        (StoreBackend::Postgres, Some(url)) => url,
        (StoreBackend::Postgres, None) => {
            return Err(anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))
        }
    };

    tracing::info!("Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .acquire_timeout(Duration::from_secs(cfg.store_read_timeout_secs))
        .connect(db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    Ok(Arc::new(PgStore::new(pool, cfg.retry_policy())))
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level from `RUST_LOG`, else `AXUM_LOG_LEVEL` (default `debug`)
///
/// Called once at startup, after the dotenv files are loaded so they can
/// set the log variables.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
