//! Irrigation decision engine.
//!
//! A flat, ordered rule list: the first matching rule decides the pump state.
//! The same function labels generated history and answers what-if queries,
//! the rain override is a separate post-processing step applied only by the
//! interactive path.

use serde::Serialize;

use crate::settings::Thresholds;

// ---

/// Rainfall above which a base ON decision is withdrawn.
pub const SIGNIFICANT_RAIN_MM: f64 = 1.0;

/// Nutrient availability, selecting the irrigation intensity message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientLevel {
    Both,
    Either,
    Neither,
}

impl NutrientLevel {
    pub fn from_presence(phosphorus: bool, potassium: bool) -> Self {
        match (phosphorus, potassium) {
            (true, true) => NutrientLevel::Both,
            (false, false) => NutrientLevel::Neither,
            _ => NutrientLevel::Either,
        }
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "nutrients")]
pub enum DecisionRule {
    CriticalLowHumidity,
    CriticalPh,
    LowHumidityIdealPh(NutrientLevel),
    LowHumidityNonIdealPh,
    HighHumidity,
    Normal,
}

/// Pump decision with its justification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    // ---
    pub pump_on: bool,
    pub reason: String,
    pub rule: DecisionRule,
    /// Set when the rain override withdrew an ON decision.
    pub rain_adjusted: bool,
}

/// Decide the pump state for one set of sensor values.
///
/// Total over all inputs, NaN included (NaN fails every comparison and ends
/// in the normal band). Domain validation is the caller's responsibility.
pub fn decide(
    humidity: f64,
    ph: f64,
    phosphorus_present: bool,
    potassium_present: bool,
    cfg: &Thresholds,
) -> Decision {
    // ---
    let (pump_on, rule, reason) = if humidity < cfg.critical_low_humidity {
        (
            true,
            DecisionRule::CriticalLowHumidity,
            format!(
                "Critical low humidity emergency: {humidity:.1}% < {:.1}%",
                cfg.critical_low_humidity
            ),
        )
    } else if ph < cfg.critical_ph_min || ph > cfg.critical_ph_max {
        (
            false,
            DecisionRule::CriticalPh,
            format!(
                "Critical pH out of range: {ph:.1} outside {:.1}-{:.1}",
                cfg.critical_ph_min, cfg.critical_ph_max
            ),
        )
    } else if humidity < cfg.min_humidity_to_irrigate {
        if cfg.ideal_ph_min <= ph && ph <= cfg.ideal_ph_max {
            let level = NutrientLevel::from_presence(phosphorus_present, potassium_present);
            let detail = match level {
                NutrientLevel::Both => "phosphorus and potassium present, normal irrigation",
                NutrientLevel::Either => "phosphorus or potassium present, reduced irrigation",
                NutrientLevel::Neither => "phosphorus and potassium absent, minimal irrigation",
            };
            (
                true,
                DecisionRule::LowHumidityIdealPh(level),
                format!("Low humidity ({humidity:.1}%), ideal pH ({ph:.1}), {detail}"),
            )
        } else {
            (
                false,
                DecisionRule::LowHumidityNonIdealPh,
                format!(
                    "Low humidity ({humidity:.1}%) but pH outside ideal range: {ph:.1} not in {:.1}-{:.1}",
                    cfg.ideal_ph_min, cfg.ideal_ph_max
                ),
            )
        }
    } else if humidity > cfg.high_humidity_stop {
        (
            false,
            DecisionRule::HighHumidity,
            format!(
                "Humidity too high: {humidity:.1}% > {:.1}%",
                cfg.high_humidity_stop
            ),
        )
    } else {
        (
            false,
            DecisionRule::Normal,
            format!(
                "Conditions normal: humidity {humidity:.1}% within {:.1}-{:.1}%",
                cfg.min_humidity_to_irrigate, cfg.high_humidity_stop
            ),
        )
    };

    Decision {
        pump_on,
        reason,
        rule,
        rain_adjusted: false,
    }
}

/// Adjust a base decision for forecast rainfall.
///
/// An ON decision with more than [`SIGNIFICANT_RAIN_MM`] of expected rain is
/// turned OFF, keeping the base rationale in the reason. Every other decision
/// keeps its state and gets the rainfall noted.
pub fn apply_rain_override(base: Decision, rainfall_mm: f64) -> Decision {
    // ---
    if base.pump_on && rainfall_mm > SIGNIFICANT_RAIN_MM {
        return Decision {
            pump_on: false,
            reason: format!(
                "Base decision ON ({}); adjusted for forecast rain ({rainfall_mm:.1} mm): pump OFF",
                base.reason
            ),
            rule: base.rule,
            rain_adjusted: true,
        };
    }

    let note = if rainfall_mm > 0.0 {
        format!(" (rain expected: {rainfall_mm:.1} mm)")
    } else {
        " (no rain expected)".to_string()
    };

    Decision {
        reason: base.reason + &note,
        ..base
    }
}

/// Emergency ground truth used to label classifier training data.
pub fn is_emergency(humidity: f64, ph: f64, cfg: &Thresholds) -> bool {
    humidity < cfg.critical_low_humidity || ph < cfg.critical_ph_min || ph > cfg.critical_ph_max
}
