//! HTTP gateway for the dashboard API.
//!
//! Follows the Explicit Module Boundary Pattern (EMBP): every endpoint group
//! is a sibling module exporting a subrouter, merged here. Shared state and
//! the error-to-status mapping also live here so handlers stay small.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;

use crate::error::{AnalyticsError, StoreError, ValidationError, WeatherError};
use crate::settings::Settings;
use crate::storage::ReadingStore;
use crate::weather::WeatherClient;

mod analytics;
mod health;
mod readings;
mod simulate;
mod weather;

// ---

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub settings: Arc<Settings>,
    /// `None` when no weather API key is configured.
    pub weather: Option<WeatherClient>,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(readings::router())
        .merge(analytics::router())
        .merge(simulate::router())
        .merge(weather::router())
        .merge(health::router())
        .with_state(state)
}

/// Handler error, rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Store(StoreError),
    Weather(WeatherError),
    Analytics(AnalyticsError),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        // ---
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::DuplicateTimestamp(_)) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Weather(_) => StatusCode::BAD_GATEWAY,
            ApiError::Analytics(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(e) => e.to_string(),
            ApiError::Store(e) => e.to_string(),
            ApiError::Weather(e) => e.to_string(),
            ApiError::Analytics(e) => e.to_string(),
            ApiError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!("{} {}", status, message);
        } else {
            tracing::debug!("{} {}", status, message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<WeatherError> for ApiError {
    fn from(e: WeatherError) -> Self {
        ApiError::Weather(e)
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(e: AnalyticsError) -> Self {
        ApiError::Analytics(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("background task failed: {e}"))
    }
}
