//! Typed error taxonomy for the irrigation service.
//!
//! `anyhow` is reserved for the binary edge (startup, CLI commands). Inside
//! the crate every fallible boundary reports one of the enums below so that
//! callers (HTTP handlers, the analytics suite) can decide how to degrade.

use thiserror::Error;

// ---

/// Out-of-domain input supplied to an interactive entry point.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("humidity {0} is outside the valid range 0-100 %")]
    HumidityOutOfRange(f64),

    #[error("pH {0} is outside the valid range 0-14")]
    PhOutOfRange(f64),

    #[error("threshold ordering violated: {0}")]
    ThresholdOrder(String),

    #[error("invalid setting {key}: {reason}")]
    Setting { key: &'static str, reason: String },

    #[error("update request does not change any field")]
    EmptyPatch,

    #[error("'{0}' is neither an RFC 3339 timestamp nor a YYYY-MM-DD date")]
    InvalidTimeBound(String),

    #[error("time window starts at {from} but ends at {to}")]
    EmptyWindow {
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    },
}

/// Failures reported by a [`crate::storage::ReadingStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a reading with timestamp {0} already exists")]
    DuplicateTimestamp(chrono::DateTime<chrono::Utc>),

    #[error("reading {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Reasons an analytics step could not produce a result.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("insufficient data for {step}: need at least {needed}, found {found}")]
    InsufficientData {
        step: &'static str,
        needed: usize,
        found: usize,
    },

    #[error("only one emergency class present in {0} readings")]
    SingleClass(usize),

    #[error("model fit failed: {0}")]
    ModelFit(String),
}

/// Weather collaborator failures. Never blocks a decision: callers fall back
/// to zero expected rainfall.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather API key is not configured")]
    MissingApiKey,

    #[error("weather API request timed out")]
    Timeout,

    #[error("weather API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("weather API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected weather payload: {0}")]
    UnexpectedShape(String),
}
