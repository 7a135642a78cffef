//! `GET /analytics`: the full analytics report as JSON.
//!
//! `from`/`to` restrict the run to a time window, the same way the readings
//! listing does. The suite trains a forest and fits a forecast, so it runs on the blocking
//! pool instead of an async worker.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::{ApiError, AppState};
use crate::analytics::run_suite;
use crate::models::TimeWindow;
use crate::report::AnalyticsReport;

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/analytics", get(analytics))
}

/// Query parameters for `GET /analytics`.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    from: Option<String>,
    to: Option<String>,
}

async fn analytics(
    Query(params): Query<AnalyticsQuery>,
    State(state): State<AppState>,
) -> Result<Json<AnalyticsReport>, ApiError> {
    // ---
    let window = TimeWindow::parse(params.from.as_deref(), params.to.as_deref())?;
    let readings = window.apply(state.store.list_readings().await?);
    info!("GET /analytics - analyzing {} readings", readings.len());

    let settings = state.settings.clone();
    let report = tokio::task::spawn_blocking(move || {
        let suite = run_suite(&readings, &settings);
        AnalyticsReport::new(suite, &readings, &settings.report)
    })
    .await?;

    Ok(Json(report))
}
