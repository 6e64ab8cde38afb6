// src/routes/health.rs
//! Liveness endpoint for the ingest service.
//!
//! `GET /health` is mounted outside the API-key gate so load balancers and
//! container orchestrators can probe it without credentials. It does not
//! touch the measurement store.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Subrouter with the `/health` route, generic over the gateway's state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
