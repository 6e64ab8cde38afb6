//! Route gateway: assembles the sensor and health subrouters and the
//! middleware stages in front of them.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};

use crate::AppContext;

mod health;
mod middleware;
mod sensors;

pub use self::middleware::ApiKey;

// ---

pub fn router(ctx: AppContext, api_key: ApiKey) -> Router {
    // ---
    let sensors = sensors::router()
        .route_layer(from_fn_with_state(api_key, middleware::require_api_key));

    Router::new()
        .merge(sensors)
        .merge(health::router())
        .layer(from_fn(middleware::response_headers))
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    // ---
    use super::middleware::API_KEY_HEADER;
    use super::*;
    use crate::store::MemoryStore;
    use crate::TableMap;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn app() -> Router {
        // ---
        let ctx = AppContext::new(Arc::new(MemoryStore::new()), TableMap::default());
        router(ctx, ApiKey::new(KEY))
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        // ---
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(API_KEY_HEADER, KEY)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        // ---
        Request::builder()
            .uri(uri)
            .header(API_KEY_HEADER, KEY)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_then_get_round_trip() {
        // ---
        let app = app();
        let reading = json!({
            "timestamp": "15-Jan-24 03:05:00 PM EDT",
            "trend_flag": "start",
            "zone_id": "zone-1",
            "building_id": "hq",
            "status": "ok",
            "value": 12.75,
        });

        let response = app
            .clone()
            .oneshot(post("/compressor_amps", &reading.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert_eq!(json_body(response).await, json!("Data stored successfully"));

        let response = app.oneshot(get("/compressor_amps?limit=5")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rows = json_body(response).await;
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["value"], json!(12.75));
        assert_eq!(rows[0]["zone_id"], json!("zone-1"));
        assert_eq!(rows[0]["measure_name"], json!("compressor_amps"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        // ---
        let response = app()
            .oneshot(post("/space_co2", "{\"value\": "))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["errors"][0]
            .as_str()
            .unwrap()
            .starts_with("Malformed request body"));
    }

    #[tokio::test]
    async fn test_validation_errors_are_listed() {
        // ---
        let response = app()
            .oneshot(post("/vibration_sensor", r#"{"status": "ok", "trend_flag": ""}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["errors"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_sensor_is_not_found() {
        // ---
        let response = app().oneshot(get("/boiler_pressure")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sensor_routes_require_key_but_health_does_not() {
        // ---
        let unauthenticated = Request::builder()
            .uri("/space_temperature")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(unauthenticated).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(health).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_preflight_on_sensor_route() {
        // ---
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/log_data")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(preflight).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-methods").unwrap(),
            "OPTIONS,POST,GET"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_generic_log_ingest() {
        // ---
        let app = app();
        let response = app
            .clone()
            .oneshot(post("/log_data", r#"{"sensor": "chiller-2", "log": "manual reset"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let rows = json_body(app.oneshot(get("/log_data")).await.unwrap()).await;
        assert_eq!(rows[0]["sensor"], json!("chiller-2"));
        assert_eq!(rows[0]["log"], json!("manual reset"));
    }
}
