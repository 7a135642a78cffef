//! `GET /weather`: expected rainfall at the configured farm location.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::error::{ValidationError, WeatherError};
use crate::weather::expected_rainfall;

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/weather", get(weather))
}

#[derive(Debug, Default, Deserialize)]
pub struct WeatherQuery {
    /// Hours of precipitation to sum; defaults to the settings window.
    hours: Option<usize>,
}

#[derive(Debug, Serialize)]
struct WeatherResponse {
    latitude: f64,
    longitude: f64,
    hours: usize,
    rainfall_mm: f64,
}

async fn weather(
    Query(params): Query<WeatherQuery>,
    State(state): State<AppState>,
) -> Result<Json<WeatherResponse>, ApiError> {
    // ---
    let cfg = &state.settings.weather;
    let client = state.weather.as_ref().ok_or(WeatherError::MissingApiKey)?;
    let (Some(latitude), Some(longitude)) = (cfg.latitude, cfg.longitude) else {
        return Err(ValidationError::Setting {
            key: "weather.latitude",
            reason: "farm location is not configured".into(),
        }
        .into());
    };

    let hours = params.hours.unwrap_or(cfg.rain_window_hours);
    let payload = client.fetch_forecast(latitude, longitude, &cfg.package).await?;
    let rainfall_mm = expected_rainfall(&payload, hours)?;

    tracing::info!("GET /weather - {:.1} mm over {}h", rainfall_mm, hours);
    Ok(Json(WeatherResponse {
        latitude,
        longitude,
        hours,
        rainfall_mm,
    }))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::routes::test_support::state;
    use crate::settings::Settings;
    use crate::weather::WeatherClient;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_client_is_bad_gateway() {
        // ---
        let err = weather(Query(WeatherQuery::default()), State(state()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_missing_location_is_bad_request() {
        // ---
        let mut state = state();
        state.weather = Some(WeatherClient::new("http://127.0.0.1:9", Some("key".into())).unwrap());
        state.settings = Arc::new(Settings::default());

        let err = weather(Query(WeatherQuery::default()), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
