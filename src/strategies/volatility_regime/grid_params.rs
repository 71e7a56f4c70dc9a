//! Grid search parameters for the Volatility Regime Gate
//!
//! Defines parameter ranges for sweeps and grid generation using itertools.

use anyhow::{Context, Result};
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::Config;

use super::config::VolatilityRegimeConfig;

/// Grid search parameters for sweeps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridParams {
    pub windows: Vec<usize>,
    pub n_futures: Vec<usize>,
    pub trigger_percentiles: Vec<f64>,
    pub high_percentiles: Vec<f64>,
    pub cooldown_lows: Vec<i64>,
    pub cooldown_highs: Vec<i64>,
}

impl GridParams {
    /// Quick grid: the published variants only
    pub fn quick() -> Self {
        GridParams {
            windows: vec![30, 60],
            n_futures: vec![7, 20],
            trigger_percentiles: vec![50.0, 55.0],
            high_percentiles: vec![80.0],
            cooldown_lows: vec![3, 5],
            cooldown_highs: vec![5, 10, 20],
        }
    }

    /// Full grid for a wider sweep
    pub fn full() -> Self {
        GridParams {
            windows: vec![20, 30, 45, 60, 90],
            n_futures: vec![5, 7, 10, 20],
            trigger_percentiles: vec![45.0, 50.0, 55.0, 60.0],
            high_percentiles: vec![75.0, 80.0, 90.0],
            cooldown_lows: vec![3, 5, 10],
            cooldown_highs: vec![5, 10, 20],
        }
    }

    /// Grid from the config's `grid` section; missing keys fall back to the
    /// base strategy's own value
    pub fn from_map(
        grid: &HashMap<String, Vec<serde_json::Value>>,
        base: &VolatilityRegimeConfig,
    ) -> Result<Self> {
        fn values<T: serde::de::DeserializeOwned>(
            grid: &HashMap<String, Vec<serde_json::Value>>,
            key: &str,
            fallback: T,
        ) -> Result<Vec<T>> {
            match grid.get(key) {
                Some(raw) if !raw.is_empty() => raw
                    .iter()
                    .map(|v| {
                        serde_json::from_value(v.clone())
                            .with_context(|| format!("Invalid grid value for '{}': {}", key, v))
                    })
                    .collect(),
                _ => Ok(vec![fallback]),
            }
        }

        Ok(GridParams {
            windows: values(grid, "window", base.window)?,
            n_futures: values(grid, "n_future", base.n_future)?,
            trigger_percentiles: values(grid, "trigger_percentile", base.trigger_percentile)?,
            high_percentiles: values(grid, "high_percentile", base.high_percentile)?,
            cooldown_lows: values(grid, "cooldown_low", base.cooldown_low)?,
            cooldown_highs: values(grid, "cooldown_high", base.cooldown_high)?,
        })
    }

    /// Generate all parameter combinations using itertools
    pub fn generate_configs(&self, base_config: &Config) -> Vec<Config> {
        iproduct!(
            &self.windows,
            &self.n_futures,
            &self.trigger_percentiles,
            &self.high_percentiles,
            &self.cooldown_lows,
            &self.cooldown_highs
        )
        .filter(|(_, _, trigger, high, low, high_cd)| trigger <= high && low <= high_cd)
        .map(|(window, n_future, trigger, high, low, high_cd)| {
            let mut config = base_config.clone();
            config.set_strategy_param("window", serde_json::json!(window));
            config.set_strategy_param("n_future", serde_json::json!(n_future));
            config.set_strategy_param("trigger_percentile", serde_json::json!(trigger));
            config.set_strategy_param("high_percentile", serde_json::json!(high));
            config.set_strategy_param("cooldown_low", serde_json::json!(low));
            config.set_strategy_param("cooldown_high", serde_json::json!(high_cd));
            config
        })
        .collect()
    }

    /// Get total number of parameter combinations
    pub fn total_combinations(&self) -> usize {
        iproduct!(
            &self.windows,
            &self.n_futures,
            &self.trigger_percentiles,
            &self.high_percentiles,
            &self.cooldown_lows,
            &self.cooldown_highs
        )
        .filter(|(_, _, trigger, high, low, high_cd)| trigger <= high && low <= high_cd)
        .count()
    }
}

/// Swept parameters of one config, for reporting
pub fn extract_params(config: &Config) -> BTreeMap<String, f64> {
    const KEYS: [&str; 6] = [
        "window",
        "n_future",
        "trigger_percentile",
        "high_percentile",
        "cooldown_low",
        "cooldown_high",
    ];

    KEYS.iter()
        .filter_map(|&key| {
            config
                .strategy
                .get(key)
                .and_then(|v| v.as_f64())
                .map(|v| (key.to_string(), v))
        })
        .collect()
}
