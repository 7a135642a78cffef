//! CRUD endpoints for sensor readings.
//!
//! New readings are validated and labeled by the decision engine before they
//! reach the store. Updates patch fields as given and do not re-run the
//! decision.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, AppState};
use crate::models::{Reading, ReadingInput, ReadingPatch, TimeWindow};

// ---

const DEFAULT_LIMIT: usize = 1000;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/readings", get(list_readings).post(create_reading))
        .route(
            "/readings/{id}",
            get(get_reading).patch(update_reading).delete(delete_reading),
        )
}

/// Query parameters for `GET /readings`.
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    /// Return only the newest `limit` readings (still oldest first).
    limit: Option<usize>,
    /// Earliest timestamp or date, inclusive.
    from: Option<String>,
    /// Latest timestamp or date, inclusive.
    to: Option<String>,
}

async fn list_readings(
    Query(params): Query<ReadingsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    // ---
    let window = TimeWindow::parse(params.from.as_deref(), params.to.as_deref())?;
    let mut readings = window.apply(state.store.list_readings().await?);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let skip = readings.len().saturating_sub(limit);
    let readings = readings.split_off(skip);

    info!("GET /readings - returning {} readings", readings.len());
    Ok(Json(readings))
}

async fn get_reading(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Reading>, ApiError> {
    // ---
    Ok(Json(state.store.get(id).await?))
}

async fn create_reading(
    State(state): State<AppState>,
    Json(input): Json<ReadingInput>,
) -> Result<(StatusCode, Json<Reading>), ApiError> {
    // ---
    let new = input.into_new_reading(&state.settings.thresholds, Utc::now())?;
    let stored = state.store.insert(new).await?;

    info!(
        "POST /readings - stored reading {} (pump {})",
        stored.id,
        if stored.pump_on { "ON" } else { "OFF" }
    );
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn update_reading(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(patch): Json<ReadingPatch>,
) -> Result<Json<Reading>, ApiError> {
    // ---
    patch.validate()?;
    let updated = state.store.update(id, patch).await?;
    info!("PATCH /readings/{} - updated", id);
    Ok(Json(updated))
}

async fn delete_reading(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    // ---
    state.store.delete(id).await?;
    info!("DELETE /readings/{} - removed", id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::routes::test_support::state;
    use axum::response::IntoResponse;
    use chrono::{TimeZone, Utc};

    fn input(minute: u32, humidity: f64) -> ReadingInput {
        // ---
        ReadingInput {
            timestamp: Some(Utc.with_ymd_and_hms(2025, 4, 2, 9, minute, 0).unwrap()),
            humidity,
            ph: 6.0,
            phosphorus_present: true,
            potassium_present: false,
            temperature: None,
            pump_on: None,
        }
    }

    #[tokio::test]
    async fn test_create_labels_and_stores() {
        // ---
        let state = state();
        let (status, Json(stored)) = create_reading(State(state.clone()), Json(input(0, 17.0)))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert!(stored.pump_on);
        assert!(stored
            .decision_reason
            .as_deref()
            .unwrap()
            .contains("reduced irrigation"));

        let Json(fetched) = get_reading(Path(stored.id), State(state)).await.unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_is_conflict() {
        // ---
        let state = state();
        let (status, _) = create_reading(State(state.clone()), Json(input(5, 30.0)))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let err = create_reading(State(state.clone()), Json(input(5, 40.0)))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(state.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_bad_request() {
        // ---
        let err = create_reading(State(state()), Json(input(0, 140.0)))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_limit_keeps_newest() {
        // ---
        let state = state();
        for m in 0..4 {
            let (_, Json(stored)) = create_reading(State(state.clone()), Json(input(m, 30.0 + m as f64)))
                .await
                .unwrap();
            assert_eq!(stored.humidity, 30.0 + m as f64);
        }

        let query = ReadingsQuery {
            limit: Some(2),
            ..Default::default()
        };
        let Json(rows) = list_readings(Query(query), State(state)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].humidity, 32.0);
        assert_eq!(rows[1].humidity, 33.0);
    }

    #[tokio::test]
    async fn test_list_time_window() {
        // ---
        let state = state();
        for m in 0..4 {
            let (status, _) = create_reading(State(state.clone()), Json(input(m * 10, 30.0 + m as f64)))
                .await
                .unwrap();
            assert_eq!(status, StatusCode::CREATED);
        }

        let query = ReadingsQuery {
            from: Some("2025-04-02T09:10:00Z".into()),
            to: Some("2025-04-02T09:20:00Z".into()),
            ..Default::default()
        };
        let Json(rows) = list_readings(Query(query), State(state.clone())).await.unwrap();
        let humidity: Vec<f64> = rows.iter().map(|r| r.humidity).collect();
        assert_eq!(humidity, vec![31.0, 32.0]);

        let other_day = ReadingsQuery {
            from: Some("2025-04-03".into()),
            ..Default::default()
        };
        let Json(rows) = list_readings(Query(other_day), State(state.clone())).await.unwrap();
        assert!(rows.is_empty());

        let bad = ReadingsQuery {
            to: Some("04/02/2025".into()),
            ..Default::default()
        };
        let err = list_readings(Query(bad), State(state)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        // ---
        let state = state();
        let (_, Json(stored)) = create_reading(State(state.clone()), Json(input(0, 30.0)))
            .await
            .unwrap();

        let empty = update_reading(Path(stored.id), State(state.clone()), Json(ReadingPatch::default()))
            .await
            .unwrap_err();
        assert_eq!(empty.into_response().status(), StatusCode::BAD_REQUEST);

        let patch = ReadingPatch {
            ph: Some(6.4),
            ..Default::default()
        };
        let Json(updated) = update_reading(Path(stored.id), State(state.clone()), Json(patch))
            .await
            .unwrap();
        assert_eq!(updated.ph, 6.4);

        let status = delete_reading(Path(stored.id), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let missing = delete_reading(Path(stored.id), State(state)).await.unwrap_err();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);
    }
}
