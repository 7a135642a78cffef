//! Irrigation cost estimation.
//!
//! Each reading stands for one sampling interval of pump state, so pump-on
//! time is `count(pump_on) * interval`. This is an approximation: real gaps
//! between readings are ignored.

use serde::Serialize;

use crate::decision::Decision;
use crate::models::Reading;
use crate::settings::CostSettings;

// ---

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostEstimate {
    // ---
    /// False -> true transitions of the pump state.
    pub cycle_count: usize,
    pub pump_on_minutes: f64,
    pub water_volume_m3: f64,
    pub water_cost: f64,
    pub energy_kwh: f64,
    pub energy_cost: f64,
    pub total_cost: f64,
}

/// Water and energy cost of running the pump for `minutes`.
fn cost_of_minutes(minutes: f64, cost: &CostSettings) -> CostEstimate {
    // ---
    let hours = minutes / 60.0;
    let water_volume_m3 = (cost.pump_flow_l_per_hour / 1000.0) * hours;
    let water_cost = water_volume_m3 * cost.water_cost_per_m3;
    let energy_kwh = cost.pump_power_kw * hours;
    let energy_cost = energy_kwh * cost.energy_cost_per_kwh;

    CostEstimate {
        cycle_count: 0,
        pump_on_minutes: minutes,
        water_volume_m3,
        water_cost,
        energy_kwh,
        energy_cost,
        total_cost: water_cost + energy_cost,
    }
}

/// Count false -> true transitions. The first element never counts.
pub fn count_cycles(states: impl IntoIterator<Item = bool>) -> usize {
    // ---
    let mut prev: Option<bool> = None;
    let mut cycles = 0;
    for on in states {
        if prev == Some(false) && on {
            cycles += 1;
        }
        prev = Some(on);
    }
    cycles
}

/// Estimate cost from the recorded pump states of `readings` (timestamp order).
pub fn estimate_cost(readings: &[Reading], cost: &CostSettings, interval_minutes: u32) -> CostEstimate {
    // ---
    let on_count = readings.iter().filter(|r| r.pump_on).count();
    if on_count == 0 {
        return CostEstimate::default();
    }

    let minutes = on_count as f64 * f64::from(interval_minutes);
    CostEstimate {
        cycle_count: count_cycles(readings.iter().map(|r| r.pump_on)),
        ..cost_of_minutes(minutes, cost)
    }
}

/// Cost of one default-length irrigation cycle.
pub fn cycle_cost(cost: &CostSettings) -> CostEstimate {
    CostEstimate {
        cycle_count: 1,
        ..cost_of_minutes(cost.default_cycle_minutes, cost)
    }
}

/// Money saved when the rain override cancelled a cycle.
///
/// `Some` only when the dry-weather decision would have irrigated and the
/// rain-adjusted one does not.
pub fn rain_savings(without_rain: &Decision, with_rain: &Decision, cost: &CostSettings) -> Option<f64> {
    // ---
    if without_rain.pump_on && !with_rain.pump_on {
        Some(cycle_cost(cost).total_cost)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::analytics::test_support::reading;
    use crate::decision::{apply_rain_override, decide};
    use crate::settings::Thresholds;
    use approx::assert_relative_eq;

    fn with_pump(states: &[bool]) -> Vec<Reading> {
        // ---
        states
            .iter()
            .enumerate()
            .map(|(i, &on)| {
                let mut r = reading(i as i64, 30.0, 6.0, None);
                r.pump_on = on;
                r
            })
            .collect()
    }

    #[test]
    fn test_all_off_costs_nothing() {
        // ---
        let readings = with_pump(&[false, false, false]);
        let est = estimate_cost(&readings, &CostSettings::default(), 5);
        assert_eq!(est, CostEstimate::default());
        assert_eq!(est.cycle_count, 0);
        assert_eq!(est.total_cost, 0.0);
        assert_eq!(est.water_cost, 0.0);
        assert_eq!(est.energy_cost, 0.0);

        assert_eq!(estimate_cost(&[], &CostSettings::default(), 5), CostEstimate::default());
    }

    #[test]
    fn test_cycles_are_rising_edges() {
        // ---
        assert_eq!(count_cycles([false, true, true, false, true]), 2);
        assert_eq!(count_cycles([true, true, false]), 0);
        assert_eq!(count_cycles([true, false, true]), 1);
        assert_eq!(count_cycles(std::iter::empty()), 0);
    }

    #[test]
    fn test_cost_formula() {
        // ---
        // 3 readings on at 5 minutes = 15 minutes = 0.25 h
        let readings = with_pump(&[false, true, true, false, true]);
        let est = estimate_cost(&readings, &CostSettings::default(), 5);

        assert_eq!(est.cycle_count, 2);
        assert_relative_eq!(est.pump_on_minutes, 15.0);
        assert_relative_eq!(est.water_volume_m3, 0.25);
        assert_relative_eq!(est.water_cost, 1.25);
        assert_relative_eq!(est.energy_kwh, 0.1875);
        assert_relative_eq!(est.energy_cost, 0.140625);
        assert_relative_eq!(est.total_cost, 1.390625);
    }

    #[test]
    fn test_rain_savings_only_when_override_cancels() {
        // ---
        let t = Thresholds::default();
        let cost = CostSettings::default();

        let dry = decide(18.0, 6.0, true, true, &t);
        let wet = apply_rain_override(dry.clone(), 5.0);
        let saved = rain_savings(&dry, &wet, &cost).unwrap();
        assert_relative_eq!(saved, cycle_cost(&cost).total_cost);
        assert_relative_eq!(saved, 1.390625);

        let normal = decide(25.0, 6.0, true, true, &t);
        let normal_wet = apply_rain_override(normal.clone(), 5.0);
        assert_eq!(rain_savings(&normal, &normal_wet, &cost), None);
    }
}
