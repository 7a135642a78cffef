//! Short-horizon humidity forecast.
//!
//! Fits an ARIMA(p, d, q) model to the humidity history with the
//! Hannan-Rissanen two-stage regression and projects it forward. When the fit
//! fails the engine degrades in a fixed order:
//!
//! 1. ARIMA with stationarity and invertibility enforced
//! 2. ARIMA with stationarity relaxed
//! 3. flat forecast at the mean of the last three observations
//!
//! The [`ForecastMethod`] on every result says which of these produced it.

use chrono::{DateTime, Duration, Utc};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::error::AnalyticsError;
use crate::models::{Column, Reading};
use crate::settings::ForecastSettings;

// ---

/// Valid humidity values required before forecasting.
pub const MIN_FORECAST_POINTS: usize = 10;

/// Observations averaged by the flat fallback.
const NAIVE_WINDOW: usize = 3;

/// Singular values below this fraction of the largest count as zero.
const RANK_TOLERANCE: f64 = 1e-10;

/// ARIMA `(p, d, q)` order.
pub type Order = (usize, usize, usize);

/// Provenance of a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForecastMethod {
    Arima {
        order: Order,
        stationarity_enforced: bool,
    },
    /// Degraded fallback: the mean of the last `window` observations.
    NaiveMean { window: usize },
}

impl ForecastMethod {
    /// True for a fitted model, false for the flat fallback.
    pub fn is_model(&self) -> bool {
        matches!(self, ForecastMethod::Arima { .. })
    }
}

impl std::fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForecastMethod::Arima {
                order: (p, d, q),
                stationarity_enforced: true,
            } => write!(f, "ARIMA({p},{d},{q})"),
            ForecastMethod::Arima {
                order: (p, d, q),
                stationarity_enforced: false,
            } => write!(f, "ARIMA({p},{d},{q}), stationarity relaxed"),
            ForecastMethod::NaiveMean { window } => {
                write!(f, "fallback: mean of last {window} readings")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    // ---
    /// Zero-based step index.
    pub step: usize,
    pub minutes_ahead: u64,
    /// Last observed timestamp plus `(step + 1)` intervals.
    pub timestamp: DateTime<Utc>,
    pub humidity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    // ---
    pub method: ForecastMethod,
    pub points: Vec<ForecastPoint>,
    pub alerts: Vec<String>,
    /// Length of the cleaned series the forecast was fitted on.
    pub series_len: usize,
    /// Timestamps were not strictly increasing and a fixed cadence was assumed.
    pub synthetic_index: bool,
}

impl ForecastResult {
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.humidity).collect()
    }
}

/// Forecast humidity `settings.horizon` readings ahead.
///
/// Fails when fewer than [`MIN_FORECAST_POINTS`] valid humidity values exist
/// or a predicted step falls outside the representable time range. Model
/// failures degrade to the fallback chain instead.
pub fn forecast(
    readings: &[Reading],
    settings: &ForecastSettings,
    critical_humidity: f64,
) -> Result<ForecastResult, AnalyticsError> {
    // ---
    let mut ordered: Vec<&Reading> = readings.iter().collect();
    ordered.sort_by_key(|r| r.timestamp);

    let raw: Vec<Option<f64>> = ordered.iter().map(|r| Column::Humidity.value(r)).collect();
    let valid = raw.iter().flatten().count();
    if valid < MIN_FORECAST_POINTS {
        return Err(AnalyticsError::InsufficientData {
            step: "humidity forecast",
            needed: MIN_FORECAST_POINTS,
            found: valid,
        });
    }

    let series = fill_gaps(&raw);
    let synthetic_index = ordered.windows(2).any(|w| w[1].timestamp <= w[0].timestamp);
    if synthetic_index {
        tracing::warn!(
            "Reading timestamps are not strictly increasing, assuming a {} minute cadence",
            settings.interval_minutes
        );
    }
    let anchor = ordered
        .iter()
        .map(|r| r.timestamp)
        .max()
        .unwrap_or_else(Utc::now);

    let (values, method) = forecast_series(&series, settings.order(), settings.horizon);
    tracing::info!("Humidity forecast via {}: {:?}", method, values);

    let interval = u64::from(settings.interval_minutes);
    let points = values
        .iter()
        .enumerate()
        .map(|(step, &humidity)| -> Result<ForecastPoint, AnalyticsError> {
            let minutes_ahead = (step as u64 + 1).saturating_mul(interval);
            let timestamp = i64::try_from(minutes_ahead)
                .ok()
                .and_then(Duration::try_minutes)
                .and_then(|ahead| anchor.checked_add_signed(ahead))
                .ok_or_else(|| fit_error(format!("{minutes_ahead} minutes ahead is out of range")))?;
            Ok(ForecastPoint {
                step,
                minutes_ahead,
                timestamp,
                humidity,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let alerts = if settings.alert_enabled {
        forecast_alerts(&points, critical_humidity)
    } else {
        Vec::new()
    };
    for alert in &alerts {
        tracing::warn!("Forecast alert: {}", alert);
    }

    Ok(ForecastResult {
        method,
        points,
        alerts,
        series_len: series.len(),
        synthetic_index,
    })
}

/// One alert per predicted step below `critical_humidity`.
fn forecast_alerts(points: &[ForecastPoint], critical_humidity: f64) -> Vec<String> {
    // ---
    points
        .iter()
        .filter(|p| p.humidity < critical_humidity)
        .map(|p| {
            format!(
                "Critical humidity ({:.1}%) forecast in ~{} min (reading {})",
                p.humidity,
                p.minutes_ahead,
                p.step + 1
            )
        })
        .collect()
}

/// Run the fallback chain on a gap-free series.
pub fn forecast_series(series: &[f64], order: Order, horizon: usize) -> (Vec<f64>, ForecastMethod) {
    // ---
    for enforce in [true, false] {
        match fit_arima(series, order, enforce).and_then(|model| model.forecast(horizon)) {
            Ok(values) => {
                return (
                    values,
                    ForecastMethod::Arima {
                        order,
                        stationarity_enforced: enforce,
                    },
                )
            }
            Err(e) => tracing::warn!(
                "ARIMA{:?} fit failed (stationarity enforced: {}): {}",
                order,
                enforce,
                e
            ),
        }
    }

    let window = series.len().min(NAIVE_WINDOW);
    let tail = &series[series.len() - window..];
    let level = tail.iter().sum::<f64>() / window as f64;
    tracing::warn!("Falling back to flat forecast at {:.2}", level);
    (vec![level; horizon], ForecastMethod::NaiveMean { window })
}

/// Linear interpolation for interior gaps, nearest value at the edges.
pub(crate) fn fill_gaps(raw: &[Option<f64>]) -> Vec<f64> {
    // ---
    let mut out = Vec::with_capacity(raw.len());
    let mut prev: Option<(usize, f64)> = None;

    for (i, value) in raw.iter().enumerate() {
        if let Some(v) = value {
            out.push(*v);
            prev = Some((i, *v));
            continue;
        }
        let next = raw[i..]
            .iter()
            .enumerate()
            .find_map(|(k, v)| v.map(|v| (i + k, v)));
        let filled = match (prev, next) {
            (Some((a, va)), Some((b, vb))) => va + (vb - va) * (i - a) as f64 / (b - a) as f64,
            (Some((_, va)), None) => va,
            (None, Some((_, vb))) => vb,
            (None, None) => f64::NAN,
        };
        out.push(filled);
    }
    out
}

fn fit_error(msg: impl Into<String>) -> AnalyticsError {
    AnalyticsError::ModelFit(msg.into())
}

/// Fitted ARMA on the differenced series, plus what is needed to integrate back.
#[derive(Debug, Clone)]
struct ArimaModel {
    intercept: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    /// Differenced series.
    w: Vec<f64>,
    /// In-sample innovations of `w`.
    e: Vec<f64>,
    /// Last value of each differencing level, outermost first.
    tails: Vec<f64>,
}

/// Hannan-Rissanen fit.
///
/// Stage one regresses the differenced series on a long AR to estimate the
/// innovations; stage two regresses it on its own lags and the lagged
/// innovation estimates. With `q == 0` this reduces to OLS AR. An intercept
/// is fitted only when `d == 0`.
fn fit_arima(series: &[f64], order: Order, enforce_stationarity: bool) -> Result<ArimaModel, AnalyticsError> {
    // ---
    let (p, d, q) = order;

    let mut w = series.to_vec();
    let mut tails = Vec::with_capacity(d);
    for _ in 0..d {
        let Some(&last) = w.last() else {
            return Err(fit_error("series exhausted by differencing"));
        };
        tails.push(last);
        w = w.windows(2).map(|pair| pair[1] - pair[0]).collect();
    }
    let with_intercept = d == 0;
    let n = w.len();

    let (e_hat, long_order) = if q == 0 {
        (vec![0.0; n], 0)
    } else {
        long_ar_residuals(&w, p + q + 1, with_intercept)?
    };

    let k = p + q + usize::from(with_intercept);
    let start = long_order + p.max(q);
    if n <= start + k {
        return Err(fit_error(format!(
            "{} differenced observations cannot identify {} parameters",
            n, k
        )));
    }

    let rows: Vec<Vec<f64>> = (start..n)
        .map(|t| {
            let mut row = Vec::with_capacity(k);
            if with_intercept {
                row.push(1.0);
            }
            row.extend((1..=p).map(|i| w[t - i]));
            row.extend((1..=q).map(|j| e_hat[t - j]));
            row
        })
        .collect();
    let coefs = ols(&rows, &w[start..], k)?;

    let offset = usize::from(with_intercept);
    let intercept = if with_intercept { coefs[0] } else { 0.0 };
    let ar = coefs[offset..offset + p].to_vec();
    let ma = coefs[offset + p..].to_vec();

    if enforce_stationarity && !is_stable(&ar) {
        return Err(fit_error(format!("AR coefficients {ar:?} are not stationary")));
    }
    let neg_ma: Vec<f64> = ma.iter().map(|t| -t).collect();
    if !is_stable(&neg_ma) {
        return Err(fit_error(format!("MA coefficients {ma:?} are not invertible")));
    }

    // conditional innovations of the fitted model
    let mut e = vec![0.0; n];
    for t in p.max(q)..n {
        e[t] = w[t] - one_step(intercept, &ar, &ma, &w, &e, t);
    }
    if e.iter().any(|v| !v.is_finite()) {
        return Err(fit_error("innovations diverged"));
    }

    Ok(ArimaModel {
        intercept,
        ar,
        ma,
        w,
        e,
        tails,
    })
}

/// Residuals of a long AR fit; entries before the AR order are zero.
fn long_ar_residuals(
    w: &[f64],
    min_order: usize,
    with_intercept: bool,
) -> Result<(Vec<f64>, usize), AnalyticsError> {
    // ---
    let n = w.len();
    let m = min_order.max((n as f64).ln().ceil() as usize);
    let k = m + usize::from(with_intercept);
    if n <= m + k {
        return Err(fit_error(format!(
            "{} differenced observations are too few for the AR({}) innovation estimate",
            n, m
        )));
    }

    let rows: Vec<Vec<f64>> = (m..n)
        .map(|t| {
            let mut row = Vec::with_capacity(k);
            if with_intercept {
                row.push(1.0);
            }
            row.extend((1..=m).map(|i| w[t - i]));
            row
        })
        .collect();
    let coefs = ols(&rows, &w[m..], k)?;

    let mut e = vec![0.0; n];
    for (t, row) in (m..n).zip(&rows) {
        let fitted: f64 = row.iter().zip(&coefs).map(|(x, c)| x * c).sum();
        e[t] = w[t] - fitted;
    }
    Ok((e, m))
}

/// Prediction of `w[t]` from lags; lags before the series start count as zero.
fn one_step(intercept: f64, ar: &[f64], ma: &[f64], w: &[f64], e: &[f64], t: usize) -> f64 {
    // ---
    let lag = |xs: &[f64], i: usize| if i <= t { xs[t - i] } else { 0.0 };
    let ar_part: f64 = ar.iter().enumerate().map(|(i, phi)| phi * lag(w, i + 1)).sum();
    let ma_part: f64 = ma.iter().enumerate().map(|(j, theta)| theta * lag(e, j + 1)).sum();
    intercept + ar_part + ma_part
}

impl ArimaModel {
    /// Recursive forecast with future innovations at zero, integrated back
    /// to the original scale.
    fn forecast(&self, horizon: usize) -> Result<Vec<f64>, AnalyticsError> {
        // ---
        let mut w = self.w.clone();
        let mut e = self.e.clone();
        let mut diffs = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let t = w.len();
            let next = one_step(self.intercept, &self.ar, &self.ma, &w, &e, t);
            w.push(next);
            e.push(0.0);
            diffs.push(next);
        }

        let mut values = diffs;
        for &last in self.tails.iter().rev() {
            let mut level = last;
            for v in values.iter_mut() {
                level += *v;
                *v = level;
            }
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(fit_error("forecast is not finite"));
        }
        Ok(values)
    }
}

/// Least squares through an SVD of the design matrix.
///
/// A rank-deficient design is a fit failure rather than a minimum-norm
/// solution, so redundant regressors send the caller down the fallback chain.
fn ols(rows: &[Vec<f64>], y: &[f64], k: usize) -> Result<Vec<f64>, AnalyticsError> {
    // ---
    if k == 0 {
        return Ok(Vec::new());
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    if flat.len() != rows.len() * k || rows.len() != y.len() {
        return Err(fit_error("design matrix shape mismatch"));
    }

    let x = DMatrix::from_row_slice(rows.len(), k, &flat);
    let y = DVector::from_column_slice(y);
    let svd = x.svd(true, true);

    let largest = svd.singular_values.max();
    if !largest.is_finite() || largest <= 0.0 {
        return Err(fit_error("degenerate regression matrix"));
    }
    let eps = largest * RANK_TOLERANCE;
    if svd.rank(eps) < k {
        return Err(fit_error("rank-deficient regression matrix"));
    }

    let coefs = svd.solve(&y, eps).map_err(fit_error)?;
    Ok(coefs.iter().copied().collect())
}

/// True when `x_t = sum(coefs[i] * x_{t-1-i})` is stationary, i.e. every
/// partial autocorrelation recovered by the step-down recursion is inside
/// the unit interval.
fn is_stable(coefs: &[f64]) -> bool {
    // ---
    let mut a = coefs.to_vec();
    while let Some(&r) = a.last() {
        if !r.is_finite() || r.abs() >= 1.0 {
            return false;
        }
        let k = a.len();
        let denom = 1.0 - r * r;
        a = (0..k - 1)
            .map(|j| (a[j] + r * a[k - 2 - j]) / denom)
            .collect();
    }
    true
}
