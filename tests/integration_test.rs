//! Black-box tests against a running server.
//!
//! Start the service first (`farmtech-irrigation --memory serve`), then run
//! `cargo test -- --ignored`. `BASE_URL` overrides the default address.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct Reading {
    id: i64,
    timestamp: DateTime<Utc>,
    humidity: f64,
    ph: f64,
    pump_on: bool,
    decision_reason: Option<String>,
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn health_reports_ok() -> Result<()> {
    // ---
    let body: Value = Client::new()
        .get(format!("{}/health", base_url()))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn readings_are_ordered_and_limited() -> Result<()> {
    // ---
    let url = format!("{}/readings?limit=20", base_url());
    let readings: Vec<Reading> = Client::new().get(&url).send().await?.json().await?;

    assert!(!readings.is_empty(), "No readings returned from {}", url);
    assert!(readings.len() <= 20, "Limit ignored");

    for pair in readings.windows(2) {
        assert!(pair[0].timestamp < pair[1].timestamp, "Readings out of order");
    }
    for r in &readings {
        assert!((0.0..=100.0).contains(&r.humidity));
        assert!((0.0..=14.0).contains(&r.ph));
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn create_then_delete_reading() -> Result<()> {
    // ---
    let client = Client::new();
    let base = base_url();

    // Far enough in the future to avoid colliding with seeded data.
    let timestamp = Utc::now() + Duration::days(3650) + Duration::seconds(rand_offset());
    let body = json!({
        "timestamp": timestamp,
        "humidity": 17.0,
        "ph": 6.2,
        "phosphorus_present": true,
        "potassium_present": true
    });

    let resp = client.post(format!("{base}/readings")).json(&body).send().await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Reading = resp.json().await?;
    assert!(created.pump_on, "Critical humidity should turn the pump on");
    assert!(created.decision_reason.is_some());

    let dup = client.post(format!("{base}/readings")).json(&body).send().await?;
    assert_eq!(dup.status(), StatusCode::CONFLICT);

    let del = client
        .delete(format!("{base}/readings/{}", created.id))
        .send()
        .await?;
    assert_eq!(del.status(), StatusCode::NO_CONTENT);

    let gone = client.get(format!("{base}/readings/{}", created.id)).send().await?;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn analytics_report_has_every_step() -> Result<()> {
    // ---
    let report: Value = Client::new()
        .get(format!("{}/analytics", base_url()))
        .send()
        .await?
        .json()
        .await?;

    let suite = &report["suite"];
    assert!(suite["reading_count"].as_u64().unwrap_or(0) > 0);
    for step in ["statistics", "correlation", "classifier", "forecast", "diagnosis"] {
        assert!(
            suite[step]["status"].is_string(),
            "step {step} missing from report"
        );
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn malformed_time_window_is_bad_request() -> Result<()> {
    // ---
    let resp = Client::new()
        .get(format!("{}/analytics?from=2025-04-10&to=2025-04-01", base_url()))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = resp.json().await?;
    assert!(body["error"].is_string());
    Ok(())
}

fn rand_offset() -> i64 {
    uuid::Uuid::new_v4().as_u128() as i64 % 86_400
}
