//! Decile Cash Switch Strategy

mod config;
mod strategy;

pub use config::DecileSwitchConfig;
pub use strategy::DecileSwitch;

use crate::strategies::parse_strategy_config;
use crate::{Config, Strategy};
use anyhow::Result;

/// Create strategy from config (called by registry)
pub fn create(config: &Config) -> Result<Box<dyn Strategy>> {
    let strategy_config: DecileSwitchConfig = parse_strategy_config(config)?;
    Ok(Box::new(DecileSwitch::new(strategy_config)?))
}
