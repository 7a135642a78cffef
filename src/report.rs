//! Report assembler.
//!
//! Wraps an [`AnalyticsSuite`] with report metadata and renders it as plain
//! text for the console, or serializes it as JSON for the dashboard. No
//! analytic behavior depends on anything in here.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analytics::{AnalyticsSuite, StepOutcome};
use crate::models::Reading;
use crate::settings::ReportSettings;

// ---

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    // ---
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub author: String,
    pub suite: AnalyticsSuite,
    /// Latest readings, newest last, capped at `max_recent_rows`.
    pub recent_readings: Vec<Reading>,
}

impl AnalyticsReport {
    pub fn new(suite: AnalyticsSuite, readings: &[Reading], settings: &ReportSettings) -> Self {
        // ---
        let mut ordered = readings.to_vec();
        ordered.sort_by_key(|r| r.timestamp);
        let skip = ordered.len().saturating_sub(settings.max_recent_rows);

        Self {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            author: settings.author.clone(),
            suite,
            recent_readings: ordered.split_off(skip),
        }
    }

    /// One-paragraph executive summary.
    pub fn summary(&self) -> String {
        // ---
        let s = &self.suite;
        let mut out = format!("{} readings analyzed. ", s.reading_count);
        if !s.anomalies.is_empty() {
            let _ = write!(out, "{} anomalies detected. ", s.anomalies.len());
        }
        if let Some(fc) = s.forecast.computed() {
            let lowest = fc.values().into_iter().fold(f64::INFINITY, f64::min);
            if lowest.is_finite() {
                let _ = write!(out, "Lowest forecast humidity {:.1}%. ", lowest);
            }
            if !fc.alerts.is_empty() {
                let _ = write!(out, "{} forecast alerts. ", fc.alerts.len());
            }
        }
        let _ = write!(
            out,
            "{} irrigation cycles, estimated cost {:.2}.",
            s.cost.cycle_count, s.cost.total_cost
        );
        out
    }

    /// Render as a console-friendly text document.
    pub fn render_text(&self, settings: &ReportSettings) -> String {
        // ---
        let s = &self.suite;
        let mut out = String::new();

        let _ = writeln!(out, "FarmTech Irrigation Report");
        let _ = writeln!(out, "Report id : {}", self.report_id);
        let _ = writeln!(
            out,
            "Generated : {} by {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.author
        );
        match (s.first_timestamp, s.last_timestamp) {
            (Some(a), Some(b)) => {
                let _ = writeln!(out, "Period    : {} to {}", a.format("%Y-%m-%d %H:%M"), b.format("%Y-%m-%d %H:%M"));
            }
            _ => {
                let _ = writeln!(out, "Period    : no readings");
            }
        }
        let _ = writeln!(out, "\n{}", self.summary());

        section(&mut out, "Descriptive statistics");
        match &s.statistics {
            StepOutcome::Computed(rows) => {
                let _ = writeln!(
                    out,
                    "{:<12} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
                    "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
                );
                for r in rows {
                    let _ = writeln!(
                        out,
                        "{:<12} {:>5} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2}",
                        r.column.name(),
                        r.count,
                        r.mean,
                        r.std,
                        r.min,
                        r.q25,
                        r.median,
                        r.q75,
                        r.max
                    );
                }
            }
            StepOutcome::Skipped(reason) => skipped(&mut out, reason),
        }

        section(&mut out, "Correlation");
        match &s.correlation {
            StepOutcome::Computed(m) => {
                let _ = write!(out, "{:<12}", "");
                for c in &m.columns {
                    let _ = write!(out, " {:>12}", c.name());
                }
                out.push('\n');
                for &a in &m.columns {
                    let _ = write!(out, "{:<12}", a.name());
                    for &b in &m.columns {
                        match m.get(a, b) {
                            Some(v) => {
                                let _ = write!(out, " {:>12.3}", v);
                            }
                            None => {
                                let _ = write!(out, " {:>12}", "-");
                            }
                        }
                    }
                    out.push('\n');
                }
            }
            StepOutcome::Skipped(reason) => skipped(&mut out, reason),
        }

        section(&mut out, "Anomalies (|z| > 2.5)");
        if s.anomalies.is_empty() {
            let _ = writeln!(out, "none");
        }
        for a in s.anomalies.iter().take(settings.max_anomalies_shown) {
            let _ = writeln!(
                out,
                "{}  {:<11} {:>8.2}  z={:+.2}",
                a.timestamp.format("%Y-%m-%d %H:%M"),
                a.parameter.name(),
                a.value,
                a.z_score
            );
        }
        if s.anomalies.len() > settings.max_anomalies_shown {
            let _ = writeln!(
                out,
                "... {} more",
                s.anomalies.len() - settings.max_anomalies_shown
            );
        }

        section(&mut out, "Emergency classifier");
        match &s.classifier {
            StepOutcome::Computed(c) => {
                let _ = writeln!(
                    out,
                    "accuracy {:.1}% on {} test readings ({} trees, {} split)",
                    c.accuracy * 100.0,
                    c.test_size,
                    c.n_trees,
                    if c.stratified { "stratified" } else { "random" }
                );
                for f in &c.feature_importances {
                    let _ = writeln!(out, "  {:<12} {:.3}", f.feature.name(), f.importance);
                }
            }
            StepOutcome::Skipped(reason) => skipped(&mut out, reason),
        }

        section(&mut out, "Humidity forecast");
        match &s.forecast {
            StepOutcome::Computed(fc) => {
                let _ = writeln!(out, "method: {}", fc.method);
                if !fc.method.is_model() {
                    let _ = writeln!(out, "  no ARIMA model could be fitted, values are a recent average");
                }
                for p in &fc.points {
                    let _ = writeln!(out, "  +{:>4} min  {:>6.1}%", p.minutes_ahead, p.humidity);
                }
                for alert in &fc.alerts {
                    let _ = writeln!(out, "  ALERT: {alert}");
                }
            }
            StepOutcome::Skipped(reason) => skipped(&mut out, reason),
        }

        section(&mut out, "Cost");
        let c = &s.cost;
        let _ = writeln!(out, "cycles        : {}", c.cycle_count);
        let _ = writeln!(out, "pump on       : {:.0} min", c.pump_on_minutes);
        let _ = writeln!(out, "water         : {:.3} m3, {:.2}", c.water_volume_m3, c.water_cost);
        let _ = writeln!(out, "energy        : {:.3} kWh, {:.2}", c.energy_kwh, c.energy_cost);
        let _ = writeln!(out, "total         : {:.2}", c.total_cost);

        section(&mut out, "Recent alerts");
        if s.recent_alerts.is_empty() {
            let _ = writeln!(out, "no critical conditions in the latest readings");
        }
        for a in &s.recent_alerts {
            let _ = writeln!(out, "- {}", a.message);
        }

        section(&mut out, "Diagnosis");
        match &s.diagnosis {
            StepOutcome::Computed(d) => {
                match d.mean_humidity_at_activation {
                    Some(h) => {
                        let _ = writeln!(out, "mean humidity at activation: {h:.1}%");
                    }
                    None => {
                        let _ = writeln!(out, "pump never activated");
                    }
                }
                let _ = writeln!(out, "mean pH: {:.1}", d.mean_ph);
                let _ = writeln!(
                    out,
                    "critical humidity: {}, critical pH: {}",
                    d.critical_humidity_count, d.critical_ph_count
                );
                for tip in &d.suggestions {
                    let _ = writeln!(out, "  * {tip}");
                }
            }
            StepOutcome::Skipped(reason) => skipped(&mut out, reason),
        }

        if !s.decision_drift.is_empty() {
            section(&mut out, "Decision drift");
            for m in &s.decision_drift {
                let _ = writeln!(
                    out,
                    "reading {}: stored pump {}, rules say {}",
                    m.reading_id,
                    on_off(m.stored_pump_on),
                    on_off(m.expected_pump_on)
                );
            }
        }

        section(&mut out, &format!("Latest {} readings", self.recent_readings.len()));
        for r in &self.recent_readings {
            let _ = writeln!(
                out,
                "{:>5}  {}  hum {:>5.1}%  pH {:>4.1}  P {}  K {}  pump {}",
                r.id,
                r.timestamp.format("%Y-%m-%d %H:%M"),
                r.humidity,
                r.ph,
                yes_no(r.phosphorus_present),
                yes_no(r.potassium_present),
                on_off(r.pump_on)
            );
        }

        out
    }
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n== {title} ==");
}

fn skipped(out: &mut String, reason: &str) {
    let _ = writeln!(out, "skipped: {reason}");
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "y"
    } else {
        "n"
    }
}
