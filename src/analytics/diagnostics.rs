//! Operational diagnostics over the reading history.
//!
//! Quick alert scan of the latest readings, a behavioral diagnosis with
//! tuning suggestions, and an audit of stored pump states against the
//! current decision rules.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::stats::mean;
use crate::decision::decide;
use crate::error::AnalyticsError;
use crate::models::Reading;
use crate::settings::Thresholds;

// ---

pub const DEFAULT_ALERT_WINDOW: usize = 5;

pub const MIN_DIAGNOSIS_READINGS: usize = 5;

/// Margin around `min_humidity_to_irrigate` tolerated at pump activation.
const ACTIVATION_MARGIN: f64 = 5.0;

/// Share of critical readings above which a suggestion is raised.
const CRITICAL_SHARE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CriticalHumidity,
    CriticalPh,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentAlert {
    pub kind: AlertKind,
    pub reading_id: i64,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub message: String,
}

/// Critical conditions among the last `window` readings (timestamp order).
pub fn recent_alerts(readings: &[Reading], thresholds: &Thresholds, window: usize) -> Vec<RecentAlert> {
    // ---
    let mut ordered: Vec<&Reading> = readings.iter().collect();
    ordered.sort_by_key(|r| r.timestamp);
    let skip = ordered.len().saturating_sub(window);

    let mut alerts = Vec::new();
    for r in ordered.into_iter().skip(skip) {
        let when = r.timestamp.format("%d/%m %H:%M");
        if r.humidity < thresholds.critical_low_humidity {
            alerts.push(RecentAlert {
                kind: AlertKind::CriticalHumidity,
                reading_id: r.id,
                timestamp: r.timestamp,
                value: r.humidity,
                message: format!("Critical humidity ({:.1}%) at {}", r.humidity, when),
            });
        }
        if !(thresholds.critical_ph_min..=thresholds.critical_ph_max).contains(&r.ph) {
            alerts.push(RecentAlert {
                kind: AlertKind::CriticalPh,
                reading_id: r.id,
                timestamp: r.timestamp,
                value: r.ph,
                message: format!("pH outside safe range ({:.1}) at {}", r.ph, when),
            });
        }
    }
    alerts
}

/// Behavioral summary of the irrigation history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    // ---
    /// Mean humidity over readings with the pump on; `None` when it never ran.
    pub mean_humidity_at_activation: Option<f64>,
    pub mean_ph: f64,
    pub critical_humidity_count: usize,
    pub critical_ph_count: usize,
    pub suggestions: Vec<String>,
}

/// Diagnose activation behavior and critical-condition frequency.
pub fn diagnose(readings: &[Reading], thresholds: &Thresholds) -> Result<Diagnosis, AnalyticsError> {
    // ---
    if readings.len() < MIN_DIAGNOSIS_READINGS {
        return Err(AnalyticsError::InsufficientData {
            step: "diagnosis",
            needed: MIN_DIAGNOSIS_READINGS,
            found: readings.len(),
        });
    }

    let mut suggestions = Vec::new();

    let at_activation: Vec<f64> = readings
        .iter()
        .filter(|r| r.pump_on)
        .map(|r| r.humidity)
        .filter(|h| h.is_finite())
        .collect();
    let mean_humidity_at_activation = (!at_activation.is_empty()).then(|| mean(&at_activation));

    if let Some(h) = mean_humidity_at_activation {
        if h < thresholds.min_humidity_to_irrigate - ACTIVATION_MARGIN {
            suggestions.push(format!(
                "Pump starts at {h:.1}% mean humidity, well below the irrigation threshold; check the threshold or response delays"
            ));
        } else if h > thresholds.min_humidity_to_irrigate + ACTIVATION_MARGIN {
            suggestions.push(format!(
                "Pump starts at {h:.1}% mean humidity, still relatively high; consider lowering the irrigation threshold to save water"
            ));
        }
    }

    let ph_values: Vec<f64> = readings.iter().map(|r| r.ph).filter(|v| v.is_finite()).collect();
    let mean_ph = if ph_values.is_empty() { f64::NAN } else { mean(&ph_values) };
    if !(thresholds.ideal_ph_min..=thresholds.ideal_ph_max).contains(&mean_ph) {
        suggestions.push(format!(
            "Mean pH {:.1} is outside the ideal range ({}-{}); nutrient uptake may suffer, consider soil correction",
            mean_ph, thresholds.ideal_ph_min, thresholds.ideal_ph_max
        ));
    }

    let critical_humidity_count = readings
        .iter()
        .filter(|r| r.humidity < thresholds.critical_low_humidity)
        .count();
    let critical_ph_count = readings
        .iter()
        .filter(|r| r.ph < thresholds.critical_ph_min || r.ph > thresholds.critical_ph_max)
        .count();

    let limit = readings.len() as f64 * CRITICAL_SHARE;
    if critical_humidity_count as f64 > limit {
        suggestions.push(
            "Frequent critical humidity; review irrigation frequency or emergency thresholds".to_string(),
        );
    }
    if critical_ph_count as f64 > limit {
        suggestions.push("Frequent critical pH; prioritize soil pH correction".to_string());
    }

    Ok(Diagnosis {
        mean_humidity_at_activation,
        mean_ph,
        critical_humidity_count,
        critical_ph_count,
        suggestions,
    })
}

/// A reading whose stored pump state disagrees with the current rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionMismatch {
    pub reading_id: i64,
    pub timestamp: DateTime<Utc>,
    pub stored_pump_on: bool,
    pub expected_pump_on: bool,
    pub expected_reason: String,
}

/// Recompute every decision and report disagreements.
///
/// Edits and operator overrides do not touch `pump_on`, so stored state can
/// drift from what the thresholds would decide; this surfaces that drift.
pub fn audit_decisions(readings: &[Reading], thresholds: &Thresholds) -> Vec<DecisionMismatch> {
    // ---
    readings
        .iter()
        .filter_map(|r| {
            let expected = decide(
                r.humidity,
                r.ph,
                r.phosphorus_present,
                r.potassium_present,
                thresholds,
            );
            (expected.pump_on != r.pump_on).then(|| DecisionMismatch {
                reading_id: r.id,
                timestamp: r.timestamp,
                stored_pump_on: r.pump_on,
                expected_pump_on: expected.pump_on,
                expected_reason: expected.reason,
            })
        })
        .collect()
}
