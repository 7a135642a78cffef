//! Command line interface.
//!
//! Every command runs against a [`ReadingStore`]: postgres by default, or an
//! in-memory store pre-seeded with synthetic readings when `--memory` is
//! given. `serve` starts the dashboard API; the other commands are one-shot
//! console operations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use crate::analytics::{run_suite, train};
use crate::generator::{GeneratorConfig, ReadingGenerator};
use crate::models::{Reading, ReadingInput, ReadingPatch, TimeWindow};
use crate::report::AnalyticsReport;
use crate::routes::{self, AppState};
use crate::settings::Settings;
use crate::storage::{seed_if_empty, MemoryReadingStore, PgReadingStore, ReadingStore};
use crate::weather::WeatherClient;
use crate::whatif::{evaluate, WhatIfInput};
use crate::Config;

// ---

/// FarmTech irrigation decision engine and analytics.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Farm settings document
    #[arg(long, env = "FARMTECH_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// Use an in-memory store pre-seeded with synthetic readings
    #[arg(long, global = true)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the dashboard API
    Serve,

    /// Populate an empty store with synthetic readings
    Seed {
        #[arg(long, default_value_t = 25)]
        days: u32,

        #[arg(long, default_value_t = 2)]
        per_day: u32,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Print stored readings, oldest first
    List {
        /// Only the newest N readings
        #[arg(long)]
        limit: Option<usize>,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Record a reading; the pump decision is computed unless --pump-on is given
    Add {
        #[arg(long)]
        humidity: f64,

        #[arg(long)]
        ph: f64,

        #[arg(long)]
        phosphorus: bool,

        #[arg(long)]
        potassium: bool,

        #[arg(long)]
        temperature: Option<f64>,

        /// RFC 3339 timestamp, defaults to now
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,

        /// Operator override of the suggested pump state
        #[arg(long)]
        pump_on: Option<bool>,
    },

    /// Change fields of a stored reading (the pump state is not recomputed)
    Update {
        id: i64,

        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,

        #[arg(long)]
        humidity: Option<f64>,

        #[arg(long)]
        ph: Option<f64>,

        #[arg(long)]
        phosphorus: Option<bool>,

        #[arg(long)]
        potassium: Option<bool>,

        #[arg(long)]
        temperature: Option<f64>,

        #[arg(long)]
        pump_on: Option<bool>,
    },

    /// Delete a stored reading
    Delete { id: i64 },

    /// Run the analytics suite and print the report
    Analyze {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// What-if recommendation for hypothetical conditions
    Simulate {
        #[arg(long)]
        humidity: f64,

        #[arg(long)]
        ph: f64,

        #[arg(long)]
        phosphorus: bool,

        #[arg(long)]
        potassium: bool,

        #[arg(long)]
        temperature: Option<f64>,

        /// Expected rainfall in mm; looked up from the weather API when absent and --weather is set
        #[arg(long)]
        rain: Option<f64>,

        #[arg(long)]
        weather: bool,

        /// Also train the emergency classifier and report the risk
        #[arg(long)]
        risk: bool,
    },
}

/// Time window shared by the commands that read the history.
#[derive(Args, Debug, Default)]
pub struct WindowArgs {
    /// Earliest reading to include: RFC 3339 timestamp or YYYY-MM-DD
    #[arg(long)]
    pub from: Option<String>,

    /// Latest reading to include: RFC 3339 timestamp or YYYY-MM-DD (whole day)
    #[arg(long)]
    pub to: Option<String>,
}

impl WindowArgs {
    fn parse(&self) -> Result<TimeWindow> {
        Ok(TimeWindow::parse(self.from.as_deref(), self.to.as_deref())?)
    }
}

/// Execute the parsed command.
pub async fn run(cli: Cli, cfg: Config) -> Result<()> {
    // ---
    let settings_path = cli.settings.clone().unwrap_or_else(|| cfg.settings_path.clone());
    let settings = Settings::load_or_init(&settings_path)?;
    settings.log_settings();

    let store = open_store(&cfg, &settings, cli.memory).await?;
    let weather = match &cfg.weather_api_key {
        Some(key) => Some(WeatherClient::new(&cfg.weather_api_url, Some(key.clone()))?),
        None => None,
    };

    match cli.command {
        Command::Serve => serve(store, settings, weather, &cfg).await,
        Command::Seed { days, per_day, seed } => {
            let batch = ReadingGenerator::new(GeneratorConfig {
                days,
                readings_per_day: per_day,
                seed,
                ..Default::default()
            })
            .generate(&settings.thresholds);
            let inserted = seed_if_empty(store.as_ref(), batch).await?;
            println!("{inserted} readings inserted");
            Ok(())
        }
        Command::List { limit, window } => {
            let mut readings = window.parse()?.apply(store.list_readings().await?);
            if let Some(limit) = limit {
                readings = readings.split_off(readings.len().saturating_sub(limit));
            }
            print_readings(&readings);
            Ok(())
        }
        Command::Add {
            humidity,
            ph,
            phosphorus,
            potassium,
            temperature,
            timestamp,
            pump_on,
        } => {
            let input = ReadingInput {
                timestamp,
                humidity,
                ph,
                phosphorus_present: phosphorus,
                potassium_present: potassium,
                temperature,
                pump_on,
            };
            let new = input.into_new_reading(&settings.thresholds, Utc::now())?;
            let stored = store.insert(new).await?;
            print_readings(std::slice::from_ref(&stored));
            if let Some(reason) = &stored.decision_reason {
                println!("Decision: {reason}");
            }
            Ok(())
        }
        Command::Update {
            id,
            timestamp,
            humidity,
            ph,
            phosphorus,
            potassium,
            temperature,
            pump_on,
        } => {
            let patch = ReadingPatch {
                timestamp,
                humidity,
                ph,
                phosphorus_present: phosphorus,
                potassium_present: potassium,
                temperature,
                pump_on,
                decision_reason: None,
            };
            patch.validate()?;
            let updated = store.update(id, patch).await?;
            print_readings(std::slice::from_ref(&updated));
            Ok(())
        }
        Command::Delete { id } => {
            store.delete(id).await?;
            println!("Reading {id} deleted");
            Ok(())
        }
        Command::Analyze { json, window } => {
            let readings = window.parse()?.apply(store.list_readings().await?);
            let report = AnalyticsReport::new(run_suite(&readings, &settings), &readings, &settings.report);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render_text(&settings.report));
            }
            Ok(())
        }
        Command::Simulate {
            humidity,
            ph,
            phosphorus,
            potassium,
            temperature,
            rain,
            weather: use_weather,
            risk,
        } => {
            let rainfall = match (rain, &weather) {
                (Some(mm), _) => mm,
                (None, Some(client)) if use_weather => client.rainfall_or_zero(&settings.weather).await,
                _ => 0.0,
            };

            let model = if risk {
                let readings = store.list_readings().await?;
                match train(&readings, &settings.thresholds, &settings.classifier) {
                    Ok(model) => Some(model),
                    Err(e) => {
                        println!("Risk model unavailable: {e}");
                        None
                    }
                }
            } else {
                None
            };

            let input = WhatIfInput {
                humidity,
                ph,
                phosphorus_present: phosphorus,
                potassium_present: potassium,
                temperature,
            };
            let out = evaluate(&input, rainfall, &settings, model.as_ref())?;

            for alert in &out.input_alerts {
                println!("WARNING: {alert}");
            }
            println!(
                "Recommendation: {}",
                if out.decision.pump_on { "turn pump ON" } else { "keep pump OFF" }
            );
            println!("Reason: {}", out.decision.reason);
            if let Some(saved) = out.savings {
                println!("Rain avoided one irrigation cycle, saving about {saved:.2}");
            }
            if let Some(r) = out.risk {
                println!(
                    "ML classification: {}",
                    if r.emergency { "EMERGENCY" } else { "NORMAL" }
                );
                println!(
                    "Emergency risk: {:.0}% ({:?}, model accuracy {:.1}%)",
                    r.probability * 100.0,
                    r.level,
                    r.model_accuracy * 100.0
                );
            }
            Ok(())
        }
    }
}

async fn open_store(cfg: &Config, settings: &Settings, memory: bool) -> Result<Arc<dyn ReadingStore>> {
    // ---
    if memory {
        let store = MemoryReadingStore::new();
        let batch = ReadingGenerator::new(GeneratorConfig::default()).generate(&settings.thresholds);
        seed_if_empty(&store, batch).await?;
        tracing::info!("Using in-memory store");
        return Ok(Arc::new(store));
    }

    let db_url = cfg.require_db_url()?;
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
        .with_context(|| format!("Failed to connect to database '{}'", crate::config::mask_db_url(db_url)))?;

    tracing::info!("Successfully connected to database");

    let store = PgReadingStore::new(pool);
    store.create_schema().await?;
    Ok(Arc::new(store))
}

async fn serve(
    store: Arc<dyn ReadingStore>,
    settings: Settings,
    weather: Option<WeatherClient>,
    cfg: &Config,
) -> Result<()> {
    // ---
    // Build app from routes gateway (EMBP)
    let app = routes::router(AppState {
        store,
        settings: Arc::new(settings),
        weather,
    });

    tracing::info!("Listening on {}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn print_readings(readings: &[Reading]) {
    // ---
    println!(
        "{:>5}  {:<20} {:>7} {:>5} {:>3} {:>3} {:>6} {:>5}",
        "id", "timestamp", "hum%", "pH", "P", "K", "temp", "pump"
    );
    for r in readings {
        println!(
            "{:>5}  {:<20} {:>7.1} {:>5.1} {:>3} {:>3} {:>6} {:>5}",
            r.id,
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.humidity,
            r.ph,
            if r.phosphorus_present { "y" } else { "n" },
            if r.potassium_present { "y" } else { "n" },
            r.temperature
                .map(|t| format!("{t:.1}"))
                .unwrap_or_else(|| "-".to_string()),
            if r.pump_on { "ON" } else { "OFF" }
        );
    }
    println!("{} readings", readings.len());
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_and_globals() {
        // ---
        let cli = Cli::try_parse_from([
            "farmtech-irrigation",
            "add",
            "--humidity",
            "18.5",
            "--ph",
            "6.1",
            "--phosphorus",
            "--pump-on",
            "false",
            "--memory",
        ])
        .unwrap();

        assert!(cli.memory);
        match cli.command {
            Command::Add {
                humidity,
                phosphorus,
                potassium,
                pump_on,
                timestamp,
                ..
            } => {
                assert_eq!(humidity, 18.5);
                assert!(phosphorus);
                assert!(!potassium);
                assert_eq!(pump_on, Some(false));
                assert!(timestamp.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_update_timestamp() {
        // ---
        let cli = Cli::try_parse_from([
            "farmtech-irrigation",
            "update",
            "7",
            "--timestamp",
            "2025-04-02T10:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Command::Update { id, timestamp, .. } => {
                assert_eq!(id, 7);
                assert_eq!(timestamp.unwrap().to_rfc3339(), "2025-04-02T10:00:00+00:00");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_analyze_window() {
        // ---
        let cli = Cli::try_parse_from([
            "farmtech-irrigation",
            "analyze",
            "--from",
            "2025-04-01",
            "--to",
            "2025-04-10T12:00:00Z",
            "--settings",
            "/tmp/farm.json",
        ])
        .unwrap();

        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/farm.json")));
        match cli.command {
            Command::Analyze { json, window } => {
                assert!(!json);
                let parsed = window.parse().unwrap();
                assert!(parsed.from.is_some());
                assert!(parsed.to.is_some());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_settings_flag_reads_environment() {
        // ---
        let arg = Cli::command()
            .get_arguments()
            .find(|a| a.get_id() == "settings")
            .cloned()
            .unwrap();
        assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new("FARMTECH_SETTINGS")));
    }
}
