//! Gate error types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by strategy construction and evaluation
///
/// Configuration variants are programmer errors and surface when a strategy
/// is built. `InvalidPrice` fails a single cycle and leaves state untouched.
#[derive(Debug, Error, PartialEq)]
pub enum GateError {
    #[error("ticker universe is empty")]
    EmptyUniverse,

    #[error("duplicate ticker in universe: {0}")]
    DuplicateTicker(String),

    #[error("weight vector has {weights} entries but universe has {tickers} tickers")]
    WeightLengthMismatch { tickers: usize, weights: usize },

    #[error("weight for {ticker} must be finite and non-negative, got {weight}")]
    InvalidWeight { ticker: String, weight: f64 },

    #[error("target weights sum to zero")]
    ZeroWeightSum,

    #[error("volatility window must be at least 2, got {0}")]
    WindowTooShort(usize),

    #[error("percentile {0} is outside [0, 100]")]
    PercentileOutOfRange(f64),

    #[error("trigger percentile ({trigger}) must not exceed high-severity percentile ({high})")]
    PercentileOrder { trigger: f64, high: f64 },

    #[error("cooldowns must be positive with low <= high, got low={low}, high={high}")]
    InvalidCooldown { low: i64, high: i64 },

    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("invalid close {close} for {ticker} at {timestamp}")]
    InvalidPrice {
        ticker: String,
        timestamp: DateTime<Utc>,
        close: f64,
    },
}

pub type GateResult<T> = Result<T, GateError>;
