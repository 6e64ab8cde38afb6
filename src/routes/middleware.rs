// src/routes/middleware.rs
//! Request/response stages shared by the sensor routes.
//!
//! - [`require_api_key`] gates every sensor route on the shared `x-api-key`
//!   secret before any handler runs. Preflight requests pass through.
//! - [`response_headers`] stamps the CORS allow-all headers and a JSON
//!   content type on every response.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

pub const API_KEY_HEADER: &str = "x-api-key";

const ALLOW_HEADERS: &str =
    "Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token,X-Amz-User-Agent";
const ALLOW_METHODS: &str = "OPTIONS,POST,GET";

/// Shared secret every caller must present.
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key))
    }

    fn matches(&self, provided: &str) -> bool {
        !self.0.is_empty() && provided == &*self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

pub async fn require_api_key(State(key): State<ApiKey>, req: Request, next: Next) -> Response {
    // ---
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(p) if key.matches(p) => next.run(req).await,
        _ => {
            warn!(
                "{} {} - rejected: {} API key",
                req.method(),
                req.uri().path(),
                if provided.is_some() { "invalid" } else { "missing" }
            );
            (
                StatusCode::FORBIDDEN,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Forbidden: Invalid API Key",
            )
                .into_response()
        }
    }
}

pub async fn response_headers(req: Request, next: Next) -> Response {
    // ---
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static(ALLOW_METHODS),
    );
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }

    res
}
