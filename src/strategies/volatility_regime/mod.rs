//! Volatility Regime Gate
//!
//! Goes defensive when realized volatility spikes, waits out a cooldown, and
//! re-enters once the benchmark trend confirms.

mod config;
pub mod exits;
pub mod grid_params;
mod strategy;
pub mod thresholds;

pub use config::VolatilityRegimeConfig;
pub use exits::{ExitReason, ExitRulesConfig};
pub use grid_params::GridParams;
pub use strategy::VolatilityRegimeGate;
pub use thresholds::{Thresholds, VolatilityReading, VolatilitySeries};

pub(crate) use strategy::benchmark_closes;

use crate::strategies::parse_strategy_config;
use crate::{Config, Strategy};
use anyhow::Result;

/// Create strategy from config (called by registry)
pub fn create(config: &Config) -> Result<Box<dyn Strategy>> {
    let strategy_config: VolatilityRegimeConfig = parse_strategy_config(config)?;
    Ok(Box::new(VolatilityRegimeGate::new(strategy_config)?))
}
