//! `POST /simulate`: what-if irrigation recommendation.
//!
//! Rainfall comes from the request when given, otherwise from the weather
//! service when `use_weather` is set, otherwise zero. With `include_risk` the
//! emergency classifier is trained on the current history for this request.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::analytics::train;
use crate::whatif::{evaluate, WhatIfInput, WhatIfOutcome};

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/simulate", post(simulate))
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    // ---
    #[serde(flatten)]
    input: WhatIfInput,
    rainfall_mm: Option<f64>,
    #[serde(default)]
    use_weather: bool,
    #[serde(default)]
    include_risk: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum RainSource {
    Request,
    Weather,
    None,
}

#[derive(Debug, Serialize)]
struct SimulateResponse {
    #[serde(flatten)]
    outcome: WhatIfOutcome,
    rain_source: RainSource,
    /// Why `risk` is absent although it was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    risk_unavailable: Option<String>,
}

async fn simulate(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> Result<Json<SimulateResponse>, ApiError> {
    // ---
    let (rainfall_mm, rain_source) = match (req.rainfall_mm, &state.weather) {
        (Some(mm), _) => (mm, RainSource::Request),
        (None, Some(client)) if req.use_weather => (
            client.rainfall_or_zero(&state.settings.weather).await,
            RainSource::Weather,
        ),
        _ => (0.0, RainSource::None),
    };

    let mut risk_unavailable = None;
    let model = if req.include_risk {
        let readings = state.store.list_readings().await?;
        let settings = state.settings.clone();
        let trained = tokio::task::spawn_blocking(move || {
            train(&readings, &settings.thresholds, &settings.classifier)
        })
        .await?;
        match trained {
            Ok(model) => Some(model),
            Err(e) => {
                warn!("Emergency model unavailable: {}", e);
                risk_unavailable = Some(e.to_string());
                None
            }
        }
    } else {
        None
    };

    let outcome = evaluate(&req.input, rainfall_mm, &state.settings, model.as_ref())?;
    info!(
        "POST /simulate - pump {} ({:?} rain {:.1} mm)",
        if outcome.decision.pump_on { "ON" } else { "OFF" },
        rain_source,
        outcome.rainfall_mm
    );

    Ok(Json(SimulateResponse {
        outcome,
        rain_source,
        risk_unavailable,
    }))
}
