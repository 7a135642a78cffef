//! What-if simulator.
//!
//! Answers "what would the pump do for these conditions" for the dashboard
//! and the CLI: the base rule decision, the rain-adjusted decision, the money
//! saved when rain cancels a cycle, and optionally the classifier's emergency
//! risk for the same inputs.

use serde::{Deserialize, Serialize};

use crate::analytics::{rain_savings, EmergencyModel, RiskLevel};
use crate::decision::{apply_rain_override, decide, Decision};
use crate::error::ValidationError;
use crate::models::validate_sensor_input;
use crate::settings::Settings;

// ---

/// Hypothetical farm conditions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WhatIfInput {
    // ---
    pub humidity: f64,
    pub ph: f64,
    #[serde(default)]
    pub phosphorus_present: bool,
    #[serde(default)]
    pub potassium_present: bool,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    /// Binary class prediction of the model.
    pub emergency: bool,
    pub probability: f64,
    pub level: RiskLevel,
    /// Held-out accuracy of the model that produced the estimate.
    pub model_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhatIfOutcome {
    // ---
    /// Rules only, no rain.
    pub base: Decision,
    /// After the rain override.
    pub decision: Decision,
    pub rainfall_mm: f64,
    /// Warnings about inputs that are already critical.
    pub input_alerts: Vec<String>,
    /// Cost of the cycle avoided by the rain override.
    pub savings: Option<f64>,
    pub risk: Option<RiskAssessment>,
}

/// Evaluate one what-if scenario.
///
/// Negative or non-finite rainfall is treated as none.
pub fn evaluate(
    input: &WhatIfInput,
    rainfall_mm: f64,
    settings: &Settings,
    model: Option<&EmergencyModel>,
) -> Result<WhatIfOutcome, ValidationError> {
    // ---
    validate_sensor_input(input.humidity, input.ph)?;
    let t = &settings.thresholds;
    let rainfall_mm = if rainfall_mm.is_finite() { rainfall_mm.max(0.0) } else { 0.0 };

    let mut input_alerts = Vec::new();
    if input.humidity < t.critical_low_humidity {
        input_alerts.push(format!(
            "Input humidity ({:.1}%) is already critical",
            input.humidity
        ));
    }
    if !(t.critical_ph_min..=t.critical_ph_max).contains(&input.ph) {
        input_alerts.push(format!("Input pH ({:.1}) is already critical", input.ph));
    }

    let base = decide(
        input.humidity,
        input.ph,
        input.phosphorus_present,
        input.potassium_present,
        t,
    );
    let decision = apply_rain_override(base.clone(), rainfall_mm);
    let savings = rain_savings(&base, &decision, &settings.cost);

    let risk = model.map(|m| {
        let (h, ph, temp) = (input.humidity, input.ph, input.temperature);
        RiskAssessment {
            emergency: m.predict(h, ph, temp),
            probability: m.probability(h, ph, temp),
            level: m.risk(h, ph, temp),
            model_accuracy: m.accuracy(),
        }
    });

    tracing::debug!(
        "What-if {:.1}% pH {:.1} rain {:.1} mm -> pump {}",
        input.humidity,
        input.ph,
        rainfall_mm,
        if decision.pump_on { "ON" } else { "OFF" }
    );

    Ok(WhatIfOutcome {
        base,
        decision,
        rainfall_mm,
        input_alerts,
        savings,
        risk,
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::analytics::train;
    use crate::generator::{GeneratorConfig, ReadingGenerator};
    use crate::models::Reading;
    use approx::assert_relative_eq;

    fn input(humidity: f64, ph: f64) -> WhatIfInput {
        WhatIfInput {
            humidity,
            ph,
            phosphorus_present: true,
            potassium_present: true,
            temperature: Some(24.0),
        }
    }

    #[test]
    fn test_rain_cancels_cycle_and_reports_savings() {
        // ---
        let settings = Settings::default();
        let out = evaluate(&input(18.0, 6.0), 5.0, &settings, None).unwrap();

        assert!(out.base.pump_on);
        assert!(!out.decision.pump_on);
        assert!(out.decision.rain_adjusted);
        assert!(out.decision.reason.contains(&out.base.reason));
        assert_relative_eq!(out.savings.unwrap(), 1.390625);
        assert!(out.input_alerts.is_empty());
        assert!(out.risk.is_none());
    }

    #[test]
    fn test_light_rain_keeps_decision() {
        // ---
        let out = evaluate(&input(18.0, 6.0), 0.5, &Settings::default(), None).unwrap();
        assert!(out.decision.pump_on);
        assert_eq!(out.savings, None);
        assert!(out.decision.reason.ends_with("(rain expected: 0.5 mm)"));

        let out = evaluate(&input(18.0, 6.0), f64::NAN, &Settings::default(), None).unwrap();
        assert_eq!(out.rainfall_mm, 0.0);
    }

    #[test]
    fn test_critical_inputs_are_flagged() {
        // ---
        let out = evaluate(&input(10.0, 3.0), 0.0, &Settings::default(), None).unwrap();
        assert_eq!(out.input_alerts.len(), 2);
        assert!(out.base.pump_on);
    }

    #[test]
    fn test_invalid_input_rejected() {
        // ---
        assert!(evaluate(&input(101.0, 6.0), 0.0, &Settings::default(), None).is_err());
    }

    #[test]
    fn test_risk_from_trained_model() {
        // ---
        let settings = Settings::default();
        let readings: Vec<Reading> = ReadingGenerator::new(GeneratorConfig::default())
            .generate(&settings.thresholds)
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.into_reading(i as i64))
            .collect();
        let model = train(&readings, &settings.thresholds, &settings.classifier).unwrap();

        let out = evaluate(&input(25.0, 6.0), 0.0, &settings, Some(&model)).unwrap();
        let risk = out.risk.unwrap();
        assert!((0.0..=1.0).contains(&risk.probability));
        assert_eq!(risk.level, RiskLevel::from_probability(risk.probability));
        assert_eq!(risk.emergency, risk.probability > 0.5);
        assert_eq!(risk.model_accuracy, model.accuracy());

        // bone-dry soil is an emergency for the model as well
        let dry = evaluate(&input(8.0, 6.0), 0.0, &settings, Some(&model)).unwrap();
        let risk = dry.risk.unwrap();
        assert!(risk.emergency);
        assert_eq!(risk.level, model.risk(8.0, 6.0, Some(24.0)));
        assert_ne!(risk.level, RiskLevel::Low);
    }
}
