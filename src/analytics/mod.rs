//! Analytics pipeline over the reading history.
//!
//! Follows the Explicit Module Boundary Pattern (EMBP): each step lives in a
//! sibling module and is exported from here. Steps are independent pure
//! functions over a snapshot of readings. [`run_suite`] runs all of them and
//! turns precondition failures into [`StepOutcome::Skipped`] so one missing
//! prerequisite never hides the other results.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AnalyticsError;
use crate::models::{Column, Reading};
use crate::settings::Settings;

mod anomaly;
mod classifier;
mod cost;
mod diagnostics;
mod forecast;
mod stats;

pub use anomaly::{detect_anomalies, AnomalyRecord, DEFAULT_Z_THRESHOLD};
pub use classifier::{train, ClassifierReport, EmergencyModel, RiskLevel};
pub use cost::{estimate_cost, rain_savings, CostEstimate};
pub use diagnostics::{
    audit_decisions, diagnose, recent_alerts, DecisionMismatch, Diagnosis, RecentAlert,
    DEFAULT_ALERT_WINDOW,
};
pub use forecast::{forecast, ForecastResult};
pub use stats::{correlate, describe, ColumnSummary, CorrelationMatrix};

// ---

/// Result of one analytics step: either computed or skipped with a reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum StepOutcome<T> {
    Computed(T),
    Skipped(String),
}

impl<T> StepOutcome<T> {
    fn from_result(result: Result<T, AnalyticsError>) -> Self {
        // ---
        match result {
            Ok(value) => StepOutcome::Computed(value),
            Err(e) => {
                tracing::info!("Analytics step skipped: {}", e);
                StepOutcome::Skipped(e.to_string())
            }
        }
    }

    pub fn computed(&self) -> Option<&T> {
        match self {
            StepOutcome::Computed(v) => Some(v),
            StepOutcome::Skipped(_) => None,
        }
    }
}

/// Every analytics step over one snapshot of readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSuite {
    // ---
    pub reading_count: usize,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub statistics: StepOutcome<Vec<ColumnSummary>>,
    pub correlation: StepOutcome<CorrelationMatrix>,
    pub anomalies: Vec<AnomalyRecord>,
    pub classifier: StepOutcome<ClassifierReport>,
    pub forecast: StepOutcome<ForecastResult>,
    pub cost: CostEstimate,
    pub recent_alerts: Vec<RecentAlert>,
    pub diagnosis: StepOutcome<Diagnosis>,
    /// Readings whose stored pump state no longer matches the rules.
    pub decision_drift: Vec<DecisionMismatch>,
}

/// Run the whole pipeline. Never fails; unmet preconditions become skipped steps.
pub fn run_suite(readings: &[Reading], settings: &Settings) -> AnalyticsSuite {
    // ---
    let mut ordered = readings.to_vec();
    ordered.sort_by_key(|r| r.timestamp);

    let t = &settings.thresholds;
    tracing::info!("Running analytics over {} readings", ordered.len());

    let suite = AnalyticsSuite {
        reading_count: ordered.len(),
        first_timestamp: ordered.first().map(|r| r.timestamp),
        last_timestamp: ordered.last().map(|r| r.timestamp),
        statistics: StepOutcome::from_result(describe(&ordered, &Column::ALL)),
        correlation: StepOutcome::from_result(correlate(&ordered, &Column::ALL)),
        anomalies: detect_anomalies(&ordered, &Column::ALL, DEFAULT_Z_THRESHOLD),
        classifier: StepOutcome::from_result(
            train(&ordered, t, &settings.classifier).map(|m| m.report().clone()),
        ),
        forecast: StepOutcome::from_result(forecast(
            &ordered,
            &settings.forecast,
            t.critical_low_humidity,
        )),
        cost: estimate_cost(&ordered, &settings.cost, settings.forecast.interval_minutes),
        recent_alerts: recent_alerts(&ordered, t, DEFAULT_ALERT_WINDOW),
        diagnosis: StepOutcome::from_result(diagnose(&ordered, t)),
        decision_drift: audit_decisions(&ordered, t),
    };

    if !suite.decision_drift.is_empty() {
        tracing::warn!(
            "{} readings have a pump state that differs from the current rules",
            suite.decision_drift.len()
        );
    }
    suite
}

#[cfg(test)]
pub(crate) mod test_support {
    // ---
    use chrono::{Duration, TimeZone, Utc};

    use crate::models::Reading;

    /// Reading `id` taken `5 * id` minutes after 2025-04-01 00:00 UTC.
    pub fn reading(id: i64, humidity: f64, ph: f64, temperature: Option<f64>) -> Reading {
        // ---
        let base = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        Reading {
            id,
            timestamp: base + Duration::minutes(5 * id),
            humidity,
            ph,
            phosphorus_present: false,
            potassium_present: false,
            temperature,
            pump_on: false,
            decision_reason: None,
        }
    }
}
