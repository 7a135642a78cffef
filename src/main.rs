//! Application entry point for the `farmtech-irrigation` binary.
//!
//! Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Loading (or creating) the farm settings document
//! - Opening the reading store (PostgreSQL, or in-memory with `--memory`)
//! - Dispatching the CLI command; `serve` mounts all API routes via the
//!   `routes` gateway (EMBP pattern) and binds the Axum HTTP server
//!
//! # Environment Variables
//! - `DATABASE_URL` – PostgreSQL connection string (required unless `--memory`)
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `BIND_ADDR` (optional) – listen address (default: `0.0.0.0:8080`)
//! - `FARMTECH_SETTINGS` (optional) – settings document path, same as `--settings`
//! - `METEOBLUE_API_KEY` (optional) – enables rain forecasts
//! - `FARMTECH_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `FARMTECH_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP): storage
//! setup lives behind `storage`, analytics behind `analytics`, configuration
//! parsing in `config` and route registration in `routes`.
use std::env;

use clap::Parser;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

mod analytics;
mod cli;
mod config;
mod decision;
mod error;
mod generator;
mod models;
mod report;
mod routes;
mod settings;
mod storage;
mod weather;
mod whatif;

pub use config::Config;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    let cli = cli::Cli::parse();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    cli::run(cli, cfg).await
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY on stderr
/// - Span event emission mode controlled by the `FARMTECH_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, then the `FARMTECH_LOG_LEVEL` env var
///
/// Logs go to stderr so CLI output on stdout stays clean for piping.
fn init_tracing() {
    // ---
    let span_events = match env::var("FARMTECH_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("FARMTECH_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=warn,reqwest=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
