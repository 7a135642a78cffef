//! Data models for the irrigation pipeline.
//!
//! A [`Reading`] is one timestamped soil sample together with the pump
//! outcome recorded for it. [`NewReading`] and [`ReadingPatch`] are the write
//! shapes accepted by the storage gateway, [`ReadingInput`] is what manual
//! entry (CLI or dashboard) submits before the decision engine fills in the
//! pump state. [`TimeWindow`] selects the part of the history a listing or
//! an analytics run looks at.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decision;
use crate::settings::Thresholds;
use crate::error::ValidationError;

// ---

/// Stored sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reading {
    // ---
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub humidity: f64,
    pub ph: f64,
    pub phosphorus_present: bool,
    pub potassium_present: bool,
    pub temperature: Option<f64>,
    pub pump_on: bool,
    pub decision_reason: Option<String>,
}

/// Reading ready to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    // ---
    pub timestamp: DateTime<Utc>,
    pub humidity: f64,
    pub ph: f64,
    pub phosphorus_present: bool,
    pub potassium_present: bool,
    pub temperature: Option<f64>,
    pub pump_on: bool,
    pub decision_reason: Option<String>,
}

/// Partial update. `None` leaves the stored field untouched.
///
/// Updating sensor fields does not recompute `pump_on`; see
/// [`crate::analytics::audit_decisions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingPatch {
    // ---
    pub timestamp: Option<DateTime<Utc>>,
    pub humidity: Option<f64>,
    pub ph: Option<f64>,
    pub phosphorus_present: Option<bool>,
    pub potassium_present: Option<bool>,
    pub temperature: Option<f64>,
    pub pump_on: Option<bool>,
    pub decision_reason: Option<String>,
}

/// Manual entry submitted by an operator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadingInput {
    // ---
    /// Defaults to "now" when absent.
    pub timestamp: Option<DateTime<Utc>>,
    pub humidity: f64,
    pub ph: f64,
    #[serde(default)]
    pub phosphorus_present: bool,
    #[serde(default)]
    pub potassium_present: bool,
    pub temperature: Option<f64>,
    /// Operator override of the suggested pump state.
    pub pump_on: Option<bool>,
}

/// Numeric reading fields the analytics operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Humidity,
    Ph,
    Temperature,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::Humidity, Column::Ph, Column::Temperature];

    pub fn name(self) -> &'static str {
        match self {
            Column::Humidity => "humidity",
            Column::Ph => "ph",
            Column::Temperature => "temperature",
        }
    }

    /// Value of this column for `reading`, `None` when missing or not finite.
    pub fn value(self, reading: &Reading) -> Option<f64> {
        // ---
        let raw = match self {
            Column::Humidity => Some(reading.humidity),
            Column::Ph => Some(reading.ph),
            Column::Temperature => reading.temperature,
        };
        raw.filter(|v| v.is_finite())
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive time range over reading timestamps; a missing end is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Parse the `from`/`to` bounds of a request.
    ///
    /// Each bound is an RFC 3339 timestamp or a `YYYY-MM-DD` date. A date
    /// covers the whole UTC day, so `from=2025-04-01&to=2025-04-01` selects
    /// every reading taken on that day.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, ValidationError> {
        // ---
        let window = TimeWindow {
            from: from.map(|s| parse_bound(s, false)).transpose()?,
            to: to.map(|s| parse_bound(s, true)).transpose()?,
        };
        if let (Some(from), Some(to)) = (window.from, window.to) {
            if from > to {
                return Err(ValidationError::EmptyWindow { from, to });
            }
        }
        Ok(window)
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| timestamp >= from) && self.to.map_or(true, |to| timestamp <= to)
    }

    /// Keep the readings inside the window.
    pub fn apply(&self, mut readings: Vec<Reading>) -> Vec<Reading> {
        // ---
        if !self.is_unbounded() {
            readings.retain(|r| self.contains(r.timestamp));
        }
        readings
    }
}

fn parse_bound(text: &str, end_of_day: bool) -> Result<DateTime<Utc>, ValidationError> {
    // ---
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    let invalid = || ValidationError::InvalidTimeBound(text.to_string());
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid())?;
    let time = if end_of_day {
        date.and_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc()).ok_or_else(invalid)
}

/// Reject humidity or pH outside their physical domain.
pub fn validate_sensor_input(humidity: f64, ph: f64) -> Result<(), ValidationError> {
    // ---
    validate_humidity(humidity)?;
    validate_ph(ph)
}

fn validate_humidity(humidity: f64) -> Result<(), ValidationError> {
    if (0.0..=100.0).contains(&humidity) {
        Ok(())
    } else {
        Err(ValidationError::HumidityOutOfRange(humidity))
    }
}

fn validate_ph(ph: f64) -> Result<(), ValidationError> {
    if (0.0..=14.0).contains(&ph) {
        Ok(())
    } else {
        Err(ValidationError::PhOutOfRange(ph))
    }
}

impl ReadingInput {
    /// Validate the input and label it with the decision engine.
    ///
    /// The suggested decision reason is always stored, even when the operator
    /// overrides the pump state.
    pub fn into_new_reading(
        self,
        thresholds: &Thresholds,
        now: DateTime<Utc>,
    ) -> Result<NewReading, ValidationError> {
        // ---
        validate_sensor_input(self.humidity, self.ph)?;

        let suggested = decision::decide(
            self.humidity,
            self.ph,
            self.phosphorus_present,
            self.potassium_present,
            thresholds,
        );

        Ok(NewReading {
            timestamp: self.timestamp.unwrap_or(now),
            humidity: self.humidity,
            ph: self.ph,
            phosphorus_present: self.phosphorus_present,
            potassium_present: self.potassium_present,
            temperature: self.temperature,
            pump_on: self.pump_on.unwrap_or(suggested.pump_on),
            decision_reason: Some(suggested.reason),
        })
    }
}

impl ReadingPatch {
    pub fn is_empty(&self) -> bool {
        // ---
        self.timestamp.is_none()
            && self.humidity.is_none()
            && self.ph.is_none()
            && self.phosphorus_present.is_none()
            && self.potassium_present.is_none()
            && self.temperature.is_none()
            && self.pump_on.is_none()
            && self.decision_reason.is_none()
    }

    /// Domain checks for the fields the patch touches.
    pub fn validate(&self) -> Result<(), ValidationError> {
        // ---
        if self.is_empty() {
            return Err(ValidationError::EmptyPatch);
        }
        if let Some(h) = self.humidity {
            validate_humidity(h)?;
        }
        if let Some(ph) = self.ph {
            validate_ph(ph)?;
        }
        Ok(())
    }

    /// Apply the patch in place. Used by the in-memory store.
    pub fn apply_to(&self, reading: &mut Reading) {
        // ---
        if let Some(ts) = self.timestamp {
            reading.timestamp = ts;
        }
        if let Some(h) = self.humidity {
            reading.humidity = h;
        }
        if let Some(ph) = self.ph {
            reading.ph = ph;
        }
        if let Some(p) = self.phosphorus_present {
            reading.phosphorus_present = p;
        }
        if let Some(k) = self.potassium_present {
            reading.potassium_present = k;
        }
        if let Some(t) = self.temperature {
            reading.temperature = Some(t);
        }
        if let Some(on) = self.pump_on {
            reading.pump_on = on;
        }
        if let Some(reason) = &self.decision_reason {
            reading.decision_reason = Some(reason.clone());
        }
    }
}

impl NewReading {
    pub fn into_reading(self, id: i64) -> Reading {
        // ---
        Reading {
            id,
            timestamp: self.timestamp,
            humidity: self.humidity,
            ph: self.ph,
            phosphorus_present: self.phosphorus_present,
            potassium_present: self.potassium_present,
            temperature: self.temperature,
            pump_on: self.pump_on,
            decision_reason: self.decision_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn create_test_input(humidity: f64, ph: f64) -> ReadingInput {
        // ---
        ReadingInput {
            timestamp: Some(Utc.with_ymd_and_hms(2025, 4, 1, 8, 30, 0).unwrap()),
            humidity,
            ph,
            phosphorus_present: true,
            potassium_present: true,
            temperature: Some(22.5),
            pump_on: None,
        }
    }

    #[test]
    fn test_sensor_validation_bounds() {
        // ---
        assert!(validate_sensor_input(0.0, 0.0).is_ok());
        assert!(validate_sensor_input(100.0, 14.0).is_ok());

        assert_eq!(
            validate_sensor_input(100.1, 7.0),
            Err(ValidationError::HumidityOutOfRange(100.1))
        );
        assert_eq!(
            validate_sensor_input(50.0, -0.5),
            Err(ValidationError::PhOutOfRange(-0.5))
        );
        assert!(validate_sensor_input(f64::NAN, 7.0).is_err());
    }

    #[test]
    fn test_input_is_labeled_by_decision_engine() {
        // ---
        let input = create_test_input(18.0, 6.0);
        let new = input
            .into_new_reading(&Thresholds::default(), Utc::now())
            .unwrap();

        assert!(new.pump_on);
        assert!(new.decision_reason.unwrap().contains("phosphorus and potassium present"));
    }

    #[test]
    fn test_operator_override_keeps_suggested_reason() {
        // ---
        let mut input = create_test_input(18.0, 6.0);
        input.pump_on = Some(false);

        let new = input
            .into_new_reading(&Thresholds::default(), Utc::now())
            .unwrap();

        assert!(!new.pump_on);
        assert!(new.decision_reason.is_some());
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        // ---
        let mut input = create_test_input(40.0, 6.0);
        input.timestamp = None;
        let now = Utc.with_ymd_and_hms(2025, 5, 2, 10, 0, 0).unwrap();

        let new = input.into_new_reading(&Thresholds::default(), now).unwrap();
        assert_eq!(new.timestamp, now);
    }

    #[test]
    fn test_out_of_range_input_rejected() {
        // ---
        let input = create_test_input(120.0, 6.0);
        assert!(input
            .into_new_reading(&Thresholds::default(), Utc::now())
            .is_err());
    }

    #[test]
    fn test_patch_validation_and_apply() {
        // ---
        assert_eq!(
            ReadingPatch::default().validate(),
            Err(ValidationError::EmptyPatch)
        );

        let bad = ReadingPatch {
            ph: Some(15.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let patch = ReadingPatch {
            humidity: Some(42.0),
            pump_on: Some(true),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());

        let mut reading = create_test_input(10.0, 6.0)
            .into_new_reading(&Thresholds::default(), Utc::now())
            .unwrap()
            .into_reading(7);
        patch.apply_to(&mut reading);

        assert_eq!(reading.id, 7);
        assert_eq!(reading.humidity, 42.0);
        assert!(reading.pump_on);
        assert_eq!(reading.ph, 6.0);
    }

    #[test]
    fn test_column_values_skip_missing() {
        // ---
        let mut reading = create_test_input(30.0, 6.2)
            .into_new_reading(&Thresholds::default(), Utc::now())
            .unwrap()
            .into_reading(1);
        reading.temperature = None;

        assert_eq!(Column::Humidity.value(&reading), Some(30.0));
        assert_eq!(Column::Ph.value(&reading), Some(6.2));
        assert_eq!(Column::Temperature.value(&reading), None);

        reading.humidity = f64::NAN;
        assert_eq!(Column::Humidity.value(&reading), None);
        assert_eq!(Column::Ph.to_string(), "ph");
    }

    #[test]
    fn test_time_window_dates_cover_whole_days() {
        // ---
        let w = TimeWindow::parse(Some("2025-04-01"), Some("2025-04-01")).unwrap();
        assert!(w.contains(Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()));
        assert!(w.contains(Utc.with_ymd_and_hms(2025, 4, 1, 23, 59, 59).unwrap()));
        assert!(!w.contains(Utc.with_ymd_and_hms(2025, 4, 2, 0, 0, 0).unwrap()));
        assert!(!w.contains(Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap()));

        let open = TimeWindow::parse(Some("2025-04-01T12:00:00+02:00"), None).unwrap();
        assert_eq!(open.from, Some(Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap()));
        assert!(open.contains(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
        assert!(TimeWindow::parse(None, None).unwrap().is_unbounded());
    }

    #[test]
    fn test_time_window_rejects_bad_bounds() {
        // ---
        assert!(matches!(
            TimeWindow::parse(Some("yesterday"), None),
            Err(ValidationError::InvalidTimeBound(_))
        ));
        assert!(matches!(
            TimeWindow::parse(Some("2025-04-03"), Some("2025-04-02")),
            Err(ValidationError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn test_time_window_filters_readings() {
        // ---
        let day = |d: u32, id: i64| {
            let mut input = create_test_input(30.0, 6.2);
            input.timestamp = Some(Utc.with_ymd_and_hms(2025, 4, d, 9, 0, 0).unwrap());
            input
                .into_new_reading(&Thresholds::default(), Utc::now())
                .unwrap()
                .into_reading(id)
        };
        let readings = vec![day(1, 1), day(2, 2), day(3, 3)];

        let w = TimeWindow::parse(Some("2025-04-02"), None).unwrap();
        let ids: Vec<i64> = w.apply(readings.clone()).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(TimeWindow::default().apply(readings).len(), 3);
    }
}
