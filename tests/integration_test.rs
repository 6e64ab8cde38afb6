//! End-to-end checks against a running server.
//!
//! Start the service (e.g. `STORE_BACKEND=memory API_KEY=... cargo run`) and
//! run with `cargo test -- --ignored`. `BASE_URL` defaults to
//! `http://localhost:8080`; `API_KEY` must match the server's.

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}

fn api_key() -> String {
    std::env::var("API_KEY").unwrap_or_else(|_| "local-dev-key".into())
}

async fn recent(client: &Client, sensor: &str, limit: usize) -> Result<Vec<Value>> {
    // ---
    let url = format!("{}/{}?limit={}", base_url(), sensor, limit);
    let rows = client
        .get(&url)
        .header("x-api-key", api_key())
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(rows)
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn ingest_then_query_newest_first() -> Result<()> {
    // ---
    let client = Client::new();
    let zone = format!("zone-{}", Uuid::new_v4());
    let url = format!("{}/space_humidity", base_url());

    for value in [41.5, 42.0] {
        let reading = json!({
            "timestamp": "15-Jan-24 03:05:00 PM EDT",
            "trend_flag": "",
            "zone_id": zone,
            "building_id": "hq",
            "status": "ok",
            "value": value,
        });
        let response = client
            .post(&url)
            .header("x-api-key", api_key())
            .json(&reading)
            .send()
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*",
            "CORS header missing on {}",
            url
        );
        let body: Value = response.json().await?;
        assert_eq!(body, json!("Data stored successfully"));
    }

    let rows = recent(&client, "space_humidity", 2).await?;
    assert_eq!(rows.len(), 2, "expected two rows from {}", url);
    assert_eq!(rows[0]["zone_id"], json!(zone));
    assert_eq!(rows[0]["value"], json!(42.0));
    assert_eq!(rows[1]["value"], json!(41.5));

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn rejects_bad_key_and_bad_reading() -> Result<()> {
    // ---
    let client = Client::new();
    let url = format!("{}/space_co2", base_url());

    let response = client
        .get(&url)
        .header("x-api-key", "not-the-key")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.text().await?, "Forbidden: Invalid API Key");

    let response = client
        .post(&url)
        .header("x-api-key", api_key())
        .json(&json!({ "value": "high", "trend_flag": "maybe" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await?;
    let errors = body["errors"].as_array().cloned().unwrap_or_default();
    assert!(errors
        .iter()
        .any(|e| e == "Invalid trend_flag. Must be 'start' or ''"));
    assert!(errors
        .iter()
        .any(|e| e == "Missing required field: timestamp"));

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn vibration_trend_lands_in_log_data() -> Result<()> {
    // ---
    let client = Client::new();
    let url = format!("{}/vibration_sensor", base_url());

    // Six posts so the five-sample window before the last one is all ours
    for step in 1..=6 {
        let (acceleration, velocity) = (0.1 * step as f64, 0.2 * step as f64);
        let reading = json!({
            "trend_flag": "",
            "status": "ok",
            "frequency": 120,
            "acceleration": acceleration,
            "velocity": velocity,
        });
        let response = client
            .post(&url)
            .header("x-api-key", api_key())
            .json(&reading)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let logs = recent(&client, "log_data", 1).await?;
    assert_eq!(
        logs.first().map(|row| row["sensor"].clone()),
        Some(json!("vibration"))
    );

    Ok(())
}
