// src/routes/sensors.rs
//! Per-sensor ingest and query endpoints.
//!
//! One parametrized route serves every sensor kind:
//! - `POST /{sensor}` stores a reading (and runs trend analysis where it applies)
//! - `GET /{sensor}?limit=N` returns the newest readings, newest first
//! - `OPTIONS /{sensor}` answers CORS preflight with an empty 200
//!
//! The slug is resolved to a [`SensorKind`] here; everything past that point
//! lives in the `service` façade.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{service, ApiError, AppContext, SensorKind};

// ---

pub fn router() -> Router<AppContext> {
    // ---
    Router::new().route("/{sensor}", get(list).post(store).options(preflight))
}

/// Query parameters for `GET /{sensor}`
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    limit: Option<usize>,
}

fn resolve(sensor: &str) -> Result<SensorKind, ApiError> {
    sensor
        .parse::<SensorKind>()
        .map_err(|_| ApiError::UnknownSensor(sensor.to_string()))
}

async fn store(
    State(ctx): State<AppContext>,
    Path(sensor): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let kind = resolve(&sensor)?;
    info!("POST /{} - {} byte body", kind, body.len());

    let ingested = service::ingest(&ctx, kind, &body).await?;
    if let Some(entry) = &ingested.derived {
        debug!(time_ms = ingested.time_ms, "{} trend logged: {}", entry.sensor, entry.log);
    }

    Ok((StatusCode::OK, Json("Data stored successfully")))
}

async fn list(
    State(ctx): State<AppContext>,
    Path(sensor): Path<String>,
    Query(params): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let kind = resolve(&sensor)?;
    let limit = service::clamp_limit(params.limit);
    info!("GET /{} - limit {}", kind, limit);

    let rows = service::recent(&ctx, kind, limit).await?;
    Ok((StatusCode::OK, Json(rows)))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}
