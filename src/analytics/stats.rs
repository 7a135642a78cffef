//! Descriptive statistics and Pearson correlation.

use serde::Serialize;

use crate::error::AnalyticsError;
use crate::models::{Column, Reading};

// ---

/// Summary of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    // ---
    pub column: Column,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

/// Symmetric correlation matrix; `values[i][j]` pairs `columns[i]` with `columns[j]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<Column>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: Column, b: Column) -> Option<f64> {
        // ---
        let i = self.columns.iter().position(|c| *c == a)?;
        let j = self.columns.iter().position(|c| *c == b)?;
        Some(self.values[i][j])
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation. Needs at least two values.
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    // ---
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() as f64 - 1.0)).sqrt()
}

/// Quantile with linear interpolation between closest ranks. `sorted` must be
/// non-empty and ascending.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    // ---
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Valid values of `column`, in reading order.
pub(crate) fn column_values(readings: &[Reading], column: Column) -> Vec<f64> {
    readings.iter().filter_map(|r| column.value(r)).collect()
}

/// Summaries for every column with at least two valid values.
pub fn describe(
    readings: &[Reading],
    columns: &[Column],
) -> Result<Vec<ColumnSummary>, AnalyticsError> {
    // ---
    if readings.len() < 2 {
        return Err(AnalyticsError::InsufficientData {
            step: "descriptive statistics",
            needed: 2,
            found: readings.len(),
        });
    }

    let summaries: Vec<ColumnSummary> = columns
        .iter()
        .filter_map(|&column| {
            let mut values = column_values(readings, column);
            if values.len() < 2 {
                return None;
            }
            values.sort_by(f64::total_cmp);
            Some(ColumnSummary {
                column,
                count: values.len(),
                mean: mean(&values),
                std: sample_std(&values),
                min: values[0],
                q25: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q75: quantile(&values, 0.75),
                max: values[values.len() - 1],
            })
        })
        .collect();

    if summaries.is_empty() {
        return Err(AnalyticsError::InsufficientData {
            step: "descriptive statistics",
            needed: 2,
            found: 0,
        });
    }
    Ok(summaries)
}

/// Pearson correlation over columns with more than one distinct value.
///
/// Each pair uses the readings where both values are present. Constant
/// columns are left out of the matrix entirely.
pub fn correlate(
    readings: &[Reading],
    columns: &[Column],
) -> Result<CorrelationMatrix, AnalyticsError> {
    // ---
    if readings.len() < 2 {
        return Err(AnalyticsError::InsufficientData {
            step: "correlation",
            needed: 2,
            found: readings.len(),
        });
    }

    let usable: Vec<Column> = columns
        .iter()
        .copied()
        .filter(|&c| {
            let values = column_values(readings, c);
            values.iter().any(|v| *v != values[0])
        })
        .collect();

    if usable.len() < 2 {
        return Err(AnalyticsError::InsufficientData {
            step: "correlation",
            needed: 2,
            found: usable.len(),
        });
    }

    let n = usable.len();
    let mut values = vec![vec![1.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let r = pearson(readings, usable[i], usable[j]);
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    Ok(CorrelationMatrix {
        columns: usable,
        values,
    })
}

/// Pearson r over pairwise-complete observations; NaN when undefined.
fn pearson(readings: &[Reading], a: Column, b: Column) -> f64 {
    // ---
    let pairs: Vec<(f64, f64)> = readings
        .iter()
        .filter_map(|r| Some((a.value(r)?, b.value(r)?)))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }

    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::analytics::test_support::reading;
    use approx::assert_relative_eq;

    #[test]
    fn test_describe_matches_linear_quantiles() {
        // ---
        let readings: Vec<Reading> = [10.0, 20.0, 30.0, 40.0]
            .iter()
            .enumerate()
            .map(|(i, &h)| reading(i as i64, h, 6.0, Some(20.0 + i as f64)))
            .collect();

        let summaries = describe(&readings, &Column::ALL).unwrap();
        let humidity = summaries
            .iter()
            .find(|s| s.column == Column::Humidity)
            .unwrap();

        assert_eq!(humidity.count, 4);
        assert_relative_eq!(humidity.mean, 25.0);
        assert_relative_eq!(humidity.std, 12.909944487358056, epsilon = 1e-12);
        assert_relative_eq!(humidity.q25, 17.5);
        assert_relative_eq!(humidity.median, 25.0);
        assert_relative_eq!(humidity.q75, 32.5);
        assert_eq!(humidity.min, 10.0);
        assert_eq!(humidity.max, 40.0);
    }

    #[test]
    fn test_describe_omits_sparse_columns() {
        // ---
        let readings = vec![
            reading(0, 10.0, 6.0, None),
            reading(1, 12.0, 6.1, Some(22.0)),
            reading(2, 14.0, 6.2, None),
        ];

        let summaries = describe(&readings, &Column::ALL).unwrap();
        assert!(summaries.iter().all(|s| s.column != Column::Temperature));
        assert_eq!(summaries.len(), 2);

        assert!(describe(&readings[..1], &Column::ALL).is_err());
    }

    #[test]
    fn test_correlation_excludes_constant_columns() {
        // ---
        let readings: Vec<Reading> = (0..6)
            .map(|i| reading(i, 10.0 + i as f64, 6.0, Some(30.0 - 2.0 * i as f64)))
            .collect();

        let m = correlate(&readings, &Column::ALL).unwrap();
        assert_eq!(m.columns, vec![Column::Humidity, Column::Temperature]);
        assert_relative_eq!(
            m.get(Column::Humidity, Column::Temperature).unwrap(),
            -1.0,
            epsilon = 1e-12
        );
        assert_eq!(m.get(Column::Humidity, Column::Humidity), Some(1.0));
        assert_eq!(m.get(Column::Ph, Column::Humidity), None);
    }

    #[test]
    fn test_correlation_needs_two_varying_columns() {
        // ---
        let readings: Vec<Reading> = (0..5).map(|i| reading(i, 10.0 + i as f64, 6.0, None)).collect();
        assert!(matches!(
            correlate(&readings, &Column::ALL),
            Err(AnalyticsError::InsufficientData { found: 1, .. })
        ));
    }

    #[test]
    fn test_correlation_is_symmetric() {
        // ---
        let readings = vec![
            reading(0, 10.0, 5.0, Some(20.0)),
            reading(1, 25.0, 6.5, Some(18.0)),
            reading(2, 18.0, 7.1, Some(25.0)),
            reading(3, 40.0, 6.0, Some(21.0)),
        ];
        let m = correlate(&readings, &Column::ALL).unwrap();
        for i in 0..m.columns.len() {
            for j in 0..m.columns.len() {
                assert_eq!(m.values[i][j], m.values[j][i]);
                assert!(m.values[i][j].abs() <= 1.0);
            }
        }
    }
}
