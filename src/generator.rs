//! Synthetic reading generator.
//!
//! Produces a few readings per day with deliberately varied scenarios, from
//! bone-dry soil to waterlogged, acidic to alkaline, so every decision rule
//! and every analytic has something to chew on. Readings are labeled with the
//! decision engine exactly like live data would be. Values are not validated,
//! which is what makes the generator useful for stress tests.

use std::collections::HashSet;

use chrono::{Days, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::decision;
use crate::models::NewReading;
use crate::settings::Thresholds;

// ---

/// Humidity scenario bands (percent), picked uniformly.
const HUMIDITY_BANDS: [(f64, f64); 6] = [
    (0.0, 5.0),    // extreme dry
    (5.0, 14.9),   // critical
    (15.0, 19.9),  // low
    (20.0, 30.0),  // ok
    (30.1, 60.0),  // high
    (60.1, 100.0), // extreme wet
];

/// pH scenario bands, picked uniformly.
const PH_BANDS: [(f64, f64); 5] = [
    (0.0, 4.4),  // critical acid
    (4.5, 5.4),  // slightly acid
    (5.5, 6.5),  // ideal
    (6.6, 7.5),  // slightly alkaline
    (7.6, 14.0), // critical alkaline
];

/// Upper bound on the up-front reservation for one batch.
const MAX_PREALLOCATED: usize = 1 << 16;

/// Generator parameters.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    // ---
    pub start_date: NaiveDate,
    pub days: u32,
    pub readings_per_day: u32,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap_or_default(),
            days: 25,
            readings_per_day: 2,
            seed: 42,
        }
    }
}

/// Seeded generator of labeled readings.
pub struct ReadingGenerator {
    rng: StdRng,
    config: GeneratorConfig,
}

impl ReadingGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
        }
    }

    /// Generate `days * readings_per_day` readings in timestamp order.
    ///
    /// Time of day is random but unique within a day, so the batch never
    /// collides with itself on the timestamp key. At most 1440 readings per
    /// day are produced, and generation stops at the last representable date.
    pub fn generate(&mut self, thresholds: &Thresholds) -> Vec<NewReading> {
        // ---
        let per_day = self.config.readings_per_day.min(24 * 60);
        if per_day == 0 {
            return Vec::new();
        }
        let total = (self.config.days as usize).saturating_mul(per_day as usize);
        let mut out = Vec::with_capacity(total.min(MAX_PREALLOCATED));

        for day in 0..self.config.days {
            let Some(date) = self.config.start_date.checked_add_days(Days::new(u64::from(day))) else {
                tracing::warn!("Stopping generation after {} days: date out of range", day);
                break;
            };

            let mut minutes: HashSet<u32> = HashSet::new();
            while (minutes.len() as u32) < per_day {
                minutes.insert(self.rng.gen_range(0..24 * 60));
            }
            let mut minutes: Vec<u32> = minutes.into_iter().collect();
            minutes.sort_unstable();

            for minute in minutes {
                let time = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap_or_default();
                let timestamp = Utc.from_utc_datetime(&date.and_time(time));
                out.push(self.sample(timestamp, thresholds));
            }
        }

        tracing::debug!("Generated {} synthetic readings", out.len());
        out
    }

    fn sample(&mut self, timestamp: chrono::DateTime<Utc>, thresholds: &Thresholds) -> NewReading {
        // ---
        let humidity = self.pick_band(&HUMIDITY_BANDS);
        let ph = self.pick_band(&PH_BANDS);
        let phosphorus_present = self.rng.gen_bool(0.5);
        let potassium_present = self.rng.gen_bool(0.5);
        let temperature = round1(self.rng.gen_range(15.0..=35.0));

        let d = decision::decide(humidity, ph, phosphorus_present, potassium_present, thresholds);

        NewReading {
            timestamp,
            humidity,
            ph,
            phosphorus_present,
            potassium_present,
            temperature: Some(temperature),
            pump_on: d.pump_on,
            decision_reason: Some(d.reason),
        }
    }

    fn pick_band(&mut self, bands: &[(f64, f64)]) -> f64 {
        let (lo, hi) = bands[self.rng.gen_range(0..bands.len())];
        round1(self.rng.gen_range(lo..=hi))
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_generates_expected_count_in_order() {
        // ---
        let mut g = ReadingGenerator::new(GeneratorConfig::default());
        let readings = g.generate(&Thresholds::default());

        assert_eq!(readings.len(), 50);
        assert!(readings.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_same_seed_same_data() {
        // ---
        let a = ReadingGenerator::new(GeneratorConfig::default()).generate(&Thresholds::default());
        let b = ReadingGenerator::new(GeneratorConfig::default()).generate(&Thresholds::default());
        assert_eq!(a, b);

        let c = ReadingGenerator::new(GeneratorConfig {
            seed: 7,
            ..Default::default()
        })
        .generate(&Thresholds::default());
        assert_ne!(a, c);
    }

    #[test]
    fn test_readings_are_labeled_by_decision_engine() {
        // ---
        let t = Thresholds::default();
        let readings = ReadingGenerator::new(GeneratorConfig::default()).generate(&t);

        for r in &readings {
            let d = decision::decide(r.humidity, r.ph, r.phosphorus_present, r.potassium_present, &t);
            assert_eq!(r.pump_on, d.pump_on);
            assert_eq!(r.decision_reason.as_deref(), Some(d.reason.as_str()));
            assert!((0.0..=100.0).contains(&r.humidity));
            assert!((0.0..=14.0).contains(&r.ph));
        }
    }

    #[test]
    fn test_many_readings_per_day_stay_unique() {
        // ---
        let mut g = ReadingGenerator::new(GeneratorConfig {
            days: 2,
            readings_per_day: 200,
            ..Default::default()
        });
        let readings = g.generate(&Thresholds::default());

        let unique: HashSet<_> = readings.iter().map(|r| r.timestamp).collect();
        assert_eq!(unique.len(), 400);
    }

    #[test]
    fn test_oversized_requests_do_not_overflow() {
        // ---
        let empty = ReadingGenerator::new(GeneratorConfig {
            days: u32::MAX,
            readings_per_day: 0,
            ..Default::default()
        })
        .generate(&Thresholds::default());
        assert!(empty.is_empty());

        let near_end = ReadingGenerator::new(GeneratorConfig {
            start_date: NaiveDate::MAX.pred_opt().unwrap(),
            days: u32::MAX,
            readings_per_day: u32::MAX,
            ..Default::default()
        })
        .generate(&Thresholds::default());
        assert_eq!(near_end.len(), 2 * 24 * 60);
    }
}
