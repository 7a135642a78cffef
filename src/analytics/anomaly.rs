//! Z-score anomaly detection.
//!
//! Every column is scored against its own mean and sample standard deviation.
//! Columns with fewer than three values or zero spread are skipped, so a
//! constant series never produces false anomalies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::stats::{mean, sample_std};
use crate::models::{Column, Reading};

// ---

pub const DEFAULT_Z_THRESHOLD: f64 = 2.5;

/// Minimum valid values for a column to be scored.
const MIN_VALUES: usize = 3;

/// One flagged value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    // ---
    pub timestamp: DateTime<Utc>,
    pub reading_id: i64,
    pub parameter: Column,
    pub value: f64,
    pub z_score: f64,
    pub reference_mean: f64,
    pub reference_stddev: f64,
}

/// Flag values with `|z| > z_threshold`, ordered by timestamp.
///
/// Fewer than three readings yields an empty result.
pub fn detect_anomalies(
    readings: &[Reading],
    columns: &[Column],
    z_threshold: f64,
) -> Vec<AnomalyRecord> {
    // ---
    if readings.len() < MIN_VALUES {
        return Vec::new();
    }

    let mut anomalies = Vec::new();
    for &column in columns {
        let present: Vec<(&Reading, f64)> = readings
            .iter()
            .filter_map(|r| column.value(r).map(|v| (r, v)))
            .collect();
        if present.len() < MIN_VALUES {
            continue;
        }

        let values: Vec<f64> = present.iter().map(|(_, v)| *v).collect();
        let m = mean(&values);
        let s = sample_std(&values);
        if s == 0.0 || !s.is_finite() {
            tracing::debug!("Skipping anomaly scan for {}: zero spread", column);
            continue;
        }

        for (reading, value) in present {
            let z = (value - m) / s;
            if z.abs() > z_threshold {
                anomalies.push(AnomalyRecord {
                    timestamp: reading.timestamp,
                    reading_id: reading.id,
                    parameter: column,
                    value,
                    z_score: z,
                    reference_mean: m,
                    reference_stddev: s,
                });
            }
        }
    }

    // stable: equal timestamps keep column order
    anomalies.sort_by_key(|a| a.timestamp);
    anomalies
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::analytics::test_support::reading;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_column_produces_no_anomalies() {
        // ---
        let readings: Vec<Reading> = (0..10).map(|i| reading(i, 30.0, 6.0, Some(22.0))).collect();
        assert!(detect_anomalies(&readings, &Column::ALL, DEFAULT_Z_THRESHOLD).is_empty());
    }

    #[test]
    fn test_outlier_is_flagged_with_reference_stats() {
        // ---
        let mut readings: Vec<Reading> =
            (0..20).map(|i| reading(i, 30.0 + (i % 2) as f64, 6.0, Some(22.0))).collect();
        readings.push(reading(20, 95.0, 6.0, Some(22.0)));

        let found = detect_anomalies(&readings, &Column::ALL, DEFAULT_Z_THRESHOLD);
        assert_eq!(found.len(), 1);

        let a = &found[0];
        assert_eq!(a.parameter, Column::Humidity);
        assert_eq!(a.reading_id, 20);
        assert_eq!(a.value, 95.0);
        assert!(a.z_score > DEFAULT_Z_THRESHOLD);
        assert_relative_eq!(a.z_score, (95.0 - a.reference_mean) / a.reference_stddev);
    }

    #[test]
    fn test_missing_values_are_dropped_per_column() {
        // ---
        let mut readings: Vec<Reading> =
            (0..12).map(|i| reading(i, 30.0 + (i % 3) as f64, 6.0, None)).collect();
        readings[3].temperature = Some(22.0);
        readings[4].temperature = Some(80.0);

        // two temperatures only: column skipped, not an error
        let found = detect_anomalies(&readings, &[Column::Temperature], DEFAULT_Z_THRESHOLD);
        assert!(found.is_empty());
    }

    #[test]
    fn test_results_ordered_by_timestamp() {
        // ---
        let mut readings: Vec<Reading> = (0..30)
            .map(|i| reading(i, 30.0 + (i % 2) as f64, 6.0 + (i % 2) as f64 * 0.1, Some(22.0)))
            .collect();
        readings[25].humidity = 99.0;
        readings[5].ph = 13.5;

        let found = detect_anomalies(&readings, &Column::ALL, DEFAULT_Z_THRESHOLD);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].parameter, Column::Ph);
        assert_eq!(found[1].parameter, Column::Humidity);
        assert!(found[0].timestamp < found[1].timestamp);
    }

    #[test]
    fn test_too_few_readings() {
        // ---
        let readings = vec![reading(0, 1.0, 6.0, None), reading(1, 99.0, 6.0, None)];
        assert!(detect_anomalies(&readings, &Column::ALL, 0.1).is_empty());
    }
}
