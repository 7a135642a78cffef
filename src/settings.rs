//! Farm settings document.
//!
//! Thresholds and analytics parameters live in a JSON document next to the
//! binary (path from `FARMTECH_SETTINGS`). Missing keys fall back to the
//! defaults below, unknown keys are kept and written back untouched. When the
//! file does not exist it is created with the defaults.
//!
//! Everything here is read-only once loaded; [`Settings::validate`] runs at
//! load time so an inconsistent threshold set stops startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Unknown keys of a section, preserved on round-trip.
pub type Extra = BTreeMap<String, Value>;

/// Longest forecast, one day of readings at the default cadence.
pub const MAX_FORECAST_HORIZON: usize = 288;

/// Longest nominal gap between two readings, one day.
pub const MAX_INTERVAL_MINUTES: u32 = 1440;

// ---

/// Root settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ---
    pub thresholds: Thresholds,
    pub forecast: ForecastSettings,
    pub cost: CostSettings,
    pub classifier: ClassifierSettings,
    pub report: ReportSettings,
    pub weather: WeatherSettings,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Decision engine thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    // ---
    pub critical_low_humidity: f64,
    pub min_humidity_to_irrigate: f64,
    pub high_humidity_stop: f64,
    pub ideal_ph_min: f64,
    pub ideal_ph_max: f64,
    pub critical_ph_min: f64,
    pub critical_ph_max: f64,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            critical_low_humidity: 15.0,
            min_humidity_to_irrigate: 20.0,
            high_humidity_stop: 60.0,
            ideal_ph_min: 5.5,
            ideal_ph_max: 6.5,
            critical_ph_min: 4.5,
            critical_ph_max: 7.5,
            extra: Extra::new(),
        }
    }
}

/// Humidity forecast parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    // ---
    /// Number of future readings to predict.
    pub horizon: usize,
    /// Nominal minutes between two readings.
    pub interval_minutes: u32,
    pub alert_enabled: bool,
    pub arima_p: usize,
    pub arima_d: usize,
    pub arima_q: usize,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            horizon: 6,
            interval_minutes: 5,
            alert_enabled: true,
            arima_p: 1,
            arima_d: 1,
            arima_q: 1,
            extra: Extra::new(),
        }
    }
}

/// Water and energy pricing of the irrigation pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSettings {
    // ---
    pub water_cost_per_m3: f64,
    pub pump_flow_l_per_hour: f64,
    /// Length of one irrigation cycle, used for rain savings.
    pub default_cycle_minutes: f64,
    pub energy_cost_per_kwh: f64,
    pub pump_power_kw: f64,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            water_cost_per_m3: 5.0,
            pump_flow_l_per_hour: 1000.0,
            default_cycle_minutes: 15.0,
            energy_cost_per_kwh: 0.75,
            pump_power_kw: 0.75,
            extra: Extra::new(),
        }
    }
}

/// Emergency classifier training parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    // ---
    pub test_fraction: f64,
    pub seed: u64,
    pub n_trees: usize,
    pub min_leaf: usize,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            test_fraction: 0.3,
            seed: 42,
            n_trees: 100,
            min_leaf: 3,
            extra: Extra::new(),
        }
    }
}

/// Report rendering limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    // ---
    pub max_anomalies_shown: usize,
    pub max_recent_rows: usize,
    pub author: String,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            max_anomalies_shown: 5,
            max_recent_rows: 15,
            author: "FarmTech AI Team".to_string(),
            extra: Extra::new(),
        }
    }
}

/// Location and package used for the weather lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherSettings {
    // ---
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub package: String,
    /// Hours of hourly precipitation summed into the expected rainfall.
    pub rain_window_hours: usize,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            package: "basic-1h".to_string(),
            rain_window_hours: 3,
            extra: Extra::new(),
        }
    }
}

impl Thresholds {
    /// Check the orderings the decision rules rely on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        // ---
        let humidity_ok = self.critical_low_humidity < self.min_humidity_to_irrigate
            && self.min_humidity_to_irrigate < self.high_humidity_stop;
        if !humidity_ok {
            return Err(ValidationError::ThresholdOrder(format!(
                "expected critical_low_humidity < min_humidity_to_irrigate < high_humidity_stop, got {} / {} / {}",
                self.critical_low_humidity, self.min_humidity_to_irrigate, self.high_humidity_stop
            )));
        }

        let ph_ok = self.critical_ph_min < self.ideal_ph_min
            && self.ideal_ph_min <= self.ideal_ph_max
            && self.ideal_ph_max < self.critical_ph_max;
        if !ph_ok {
            return Err(ValidationError::ThresholdOrder(format!(
                "expected critical_ph_min < ideal_ph_min <= ideal_ph_max < critical_ph_max, got {} / {} / {} / {}",
                self.critical_ph_min, self.ideal_ph_min, self.ideal_ph_max, self.critical_ph_max
            )));
        }

        Ok(())
    }
}

impl ForecastSettings {
    /// ARIMA `(p, d, q)` order.
    pub fn order(&self) -> (usize, usize, usize) {
        (self.arima_p, self.arima_d, self.arima_q)
    }
}

impl Settings {
    /// Validate every section; the first violation is returned.
    pub fn validate(&self) -> Result<(), ValidationError> {
        // ---
        self.thresholds.validate()?;

        if !(1..=MAX_FORECAST_HORIZON).contains(&self.forecast.horizon) {
            return Err(ValidationError::Setting {
                key: "forecast.horizon",
                reason: format!("{} is not in 1..={MAX_FORECAST_HORIZON}", self.forecast.horizon),
            });
        }
        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.forecast.interval_minutes) {
            return Err(ValidationError::Setting {
                key: "forecast.interval_minutes",
                reason: format!(
                    "{} is not in 1..={MAX_INTERVAL_MINUTES}",
                    self.forecast.interval_minutes
                ),
            });
        }
        if !(self.classifier.test_fraction > 0.0 && self.classifier.test_fraction < 1.0) {
            return Err(ValidationError::Setting {
                key: "classifier.test_fraction",
                reason: format!("{} is not in (0, 1)", self.classifier.test_fraction),
            });
        }
        if self.classifier.n_trees == 0 || self.classifier.min_leaf == 0 {
            return Err(ValidationError::Setting {
                key: "classifier.n_trees",
                reason: "n_trees and min_leaf must be at least 1".into(),
            });
        }
        for (key, value) in [
            ("cost.water_cost_per_m3", self.cost.water_cost_per_m3),
            ("cost.pump_flow_l_per_hour", self.cost.pump_flow_l_per_hour),
            ("cost.default_cycle_minutes", self.cost.default_cycle_minutes),
            ("cost.energy_cost_per_kwh", self.cost.energy_cost_per_kwh),
            ("cost.pump_power_kw", self.cost.pump_power_kw),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ValidationError::Setting {
                    key,
                    reason: format!("{value} must be a non-negative number"),
                });
            }
        }
        Ok(())
    }

    /// Parse a settings document, filling in defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        // ---
        let settings: Settings =
            serde_json::from_str(text).context("settings document is not valid JSON")?;
        Ok(settings)
    }

    /// Load the settings file, creating it with defaults when absent.
    ///
    /// When the file lacks keys that have defaults, the completed document is
    /// written back so operators can see every tunable. Write failures are
    /// logged and otherwise ignored.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        // ---
        if !path.exists() {
            tracing::warn!(
                "Settings file '{}' not found, using defaults and creating it",
                path.display()
            );
            let settings = Settings::default();
            if let Err(e) = settings.save(path) {
                tracing::error!("Could not create '{}': {}", path.display(), e);
            }
            return Ok(settings);
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file '{}'", path.display()))?;
        let settings = Settings::from_json(&text)
            .with_context(|| format!("Settings file '{}' has invalid values", path.display()))?;
        let raw: Value = serde_json::from_str(&text)?;

        settings
            .validate()
            .with_context(|| format!("Settings file '{}' failed validation", path.display()))?;

        tracing::info!("Settings loaded from '{}'", path.display());

        let completed = serde_json::to_value(&settings)?;
        if completed != raw {
            match settings.save(path) {
                Ok(()) => tracing::info!("'{}' updated with new default keys", path.display()),
                Err(e) => tracing::warn!("Could not update '{}': {}", path.display(), e),
            }
        }

        Ok(settings)
    }

    /// Write the document as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        // ---
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write settings file '{}'", path.display()))?;
        Ok(())
    }

    /// Log the effective settings.
    pub fn log_settings(&self) {
        // ---
        let t = &self.thresholds;
        tracing::info!("Farm settings:");
        tracing::info!(
            "  humidity thresholds : critical<{} irrigate<{} stop>{}",
            t.critical_low_humidity,
            t.min_humidity_to_irrigate,
            t.high_humidity_stop
        );
        tracing::info!(
            "  pH thresholds       : ideal {}-{} critical <{} or >{}",
            t.ideal_ph_min,
            t.ideal_ph_max,
            t.critical_ph_min,
            t.critical_ph_max
        );
        tracing::info!(
            "  forecast            : ARIMA{:?} horizon={} every {} min",
            self.forecast.order(),
            self.forecast.horizon,
            self.forecast.interval_minutes
        );
        tracing::info!(
            "  classifier          : {} trees, min_leaf={}, seed={}",
            self.classifier.n_trees,
            self.classifier.min_leaf,
            self.classifier.seed
        );
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        // ---
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.forecast.order(), (1, 1, 1));
        assert_eq!(settings.thresholds.critical_low_humidity, 15.0);
        assert_eq!(settings.cost.pump_flow_l_per_hour, 1000.0);
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        // ---
        let settings =
            Settings::from_json(r#"{"thresholds": {"critical_low_humidity": 12.0}}"#).unwrap();

        assert_eq!(settings.thresholds.critical_low_humidity, 12.0);
        assert_eq!(settings.thresholds.min_humidity_to_irrigate, 20.0);
        assert_eq!(settings.classifier, ClassifierSettings::default());
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        // ---
        let text = r#"{
            "db_name": "farm.db",
            "cost": {"currency": "BRL", "pump_power_kw": 1.1}
        }"#;
        let settings = Settings::from_json(text).unwrap();

        assert_eq!(settings.extra.get("db_name"), Some(&Value::from("farm.db")));
        assert_eq!(settings.cost.extra.get("currency"), Some(&Value::from("BRL")));
        assert_eq!(settings.cost.pump_power_kw, 1.1);

        let back = serde_json::to_value(&settings).unwrap();
        assert_eq!(back["db_name"], "farm.db");
        assert_eq!(back["cost"]["currency"], "BRL");
    }

    #[test]
    fn test_threshold_ordering_rejected() {
        // ---
        let mut t = Thresholds::default();
        t.critical_low_humidity = 25.0;
        assert!(matches!(t.validate(), Err(ValidationError::ThresholdOrder(_))));

        let mut t = Thresholds::default();
        t.ideal_ph_min = 7.0;
        assert!(t.validate().is_err());

        let mut t = Thresholds::default();
        t.ideal_ph_min = 6.0;
        t.ideal_ph_max = 6.0;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_invalid_sections_rejected() {
        // ---
        let mut s = Settings::default();
        s.classifier.test_fraction = 1.0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.forecast.horizon = 0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.forecast.horizon = MAX_FORECAST_HORIZON + 1;
        assert!(matches!(
            s.validate(),
            Err(ValidationError::Setting { key: "forecast.horizon", .. })
        ));
        s.forecast.horizon = MAX_FORECAST_HORIZON;
        assert!(s.validate().is_ok());

        let mut s = Settings::default();
        s.forecast.interval_minutes = u32::MAX;
        assert!(matches!(
            s.validate(),
            Err(ValidationError::Setting { key: "forecast.interval_minutes", .. })
        ));

        let mut s = Settings::default();
        s.cost.pump_power_kw = -1.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_load_or_init_creates_file() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings::load_or_init(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());

        let reloaded = Settings::load_or_init(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_load_or_init_completes_partial_file() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"report": {"author": "Field Team"}, "legacy": 1}"#).unwrap();

        let settings = Settings::load_or_init(&path).unwrap();
        assert_eq!(settings.report.author, "Field Team");

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["legacy"], 1);
        assert_eq!(written["report"]["author"], "Field Team");
        assert_eq!(written["forecast"]["horizon"], 6);
    }

    #[test]
    fn test_load_or_init_fails_fast_on_bad_thresholds() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"thresholds": {"min_humidity_to_irrigate": 80.0}}"#,
        )
        .unwrap();

        assert!(Settings::load_or_init(&path).is_err());
    }

    #[test]
    fn test_load_or_init_rejects_oversized_horizon() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"forecast": {"horizon": 1000000000000, "interval_minutes": 5}}"#,
        )
        .unwrap();

        let err = Settings::load_or_init(&path).unwrap_err();
        assert!(format!("{err:#}").contains("forecast.horizon"));
    }
}
