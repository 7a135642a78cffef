//! Weather collaborator (meteoblue packages API).
//!
//! The decision core only consumes one number from here: the rainfall
//! expected over the next few hours. Any failure degrades that number to
//! zero, so the weather service can never block an irrigation decision.

use std::time::Duration;

use serde_json::Value;

use crate::error::WeatherError;
use crate::settings::WeatherSettings;

// ---

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const FORECAST_DAYS: u32 = 3;

/// HTTP client for the weather packages endpoint.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, WeatherError> {
        // ---
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Fetch a forecast package (`basic-1h`, `basic-day`) for a location.
    ///
    /// The payload is returned as raw JSON after a shape check; callers pick
    /// the series they need.
    pub async fn fetch_forecast(&self, lat: f64, lon: f64, package: &str) -> Result<Value, WeatherError> {
        // ---
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;
        let url = format!("{}/{}", self.base_url, package);
        tracing::debug!("Fetching weather package {} for {:.3},{:.3}", package, lat, lon);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("apikey", api_key.to_string()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("format", "json".to_string()),
                ("temperature", "C".to_string()),
                ("windspeed", "kmh".to_string()),
                ("precipitationamount", "mm".to_string()),
                ("timeformat", "iso8601".to_string()),
                ("forecast_days", FORECAST_DAYS.to_string()),
            ])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response.text().await.unwrap_or_default().chars().take(200).collect();
            tracing::error!("Weather API returned HTTP {}: {}", status, body);
            return Err(WeatherError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await.map_err(classify)?;
        check_shape(&payload, package)?;
        Ok(payload)
    }

    /// Expected rainfall for the configured location, `0.0` on any failure.
    pub async fn rainfall_or_zero(&self, settings: &WeatherSettings) -> f64 {
        // ---
        let (Some(lat), Some(lon)) = (settings.latitude, settings.longitude) else {
            tracing::debug!("No weather location configured, assuming no rain");
            return 0.0;
        };

        let result = self
            .fetch_forecast(lat, lon, &settings.package)
            .await
            .and_then(|payload| expected_rainfall(&payload, settings.rain_window_hours));

        match result {
            Ok(mm) => {
                tracing::info!("Expected rainfall over {}h: {:.1} mm", settings.rain_window_hours, mm);
                mm
            }
            Err(e) => {
                tracing::warn!("Weather lookup failed, assuming no rain: {}", e);
                0.0
            }
        }
    }
}

fn classify(e: reqwest::Error) -> WeatherError {
    if e.is_timeout() {
        WeatherError::Timeout
    } else {
        WeatherError::Request(e)
    }
}

/// The payload must carry `metadata` plus the series block of its package.
fn check_shape(payload: &Value, package: &str) -> Result<(), WeatherError> {
    // ---
    if payload.get("metadata").is_none() {
        return Err(WeatherError::UnexpectedShape("missing 'metadata'".into()));
    }
    let block = match package {
        "basic-1h" => Some("data_1h"),
        "basic-day" => Some("data_day"),
        _ => None,
    };
    if let Some(block) = block {
        if payload.get(block).is_none() {
            return Err(WeatherError::UnexpectedShape(format!("missing '{block}'")));
        }
    }
    Ok(())
}

/// Sum of hourly precipitation (mm) over the first `hours` entries.
///
/// Null entries count as zero.
pub fn expected_rainfall(payload: &Value, hours: usize) -> Result<f64, WeatherError> {
    // ---
    let series = payload
        .get("data_1h")
        .and_then(|d| d.get("precipitation"))
        .and_then(Value::as_array)
        .ok_or_else(|| WeatherError::UnexpectedShape("missing 'data_1h.precipitation'".into()))?;

    Ok(series
        .iter()
        .take(hours)
        .map(|v| v.as_f64().unwrap_or(0.0))
        .filter(|v| v.is_finite() && *v > 0.0)
        .sum())
}
