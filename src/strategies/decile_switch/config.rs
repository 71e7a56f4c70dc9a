//! Decile Cash Switch Configuration

use serde::{Deserialize, Serialize};

use crate::allocation::TargetWeights;
use crate::error::{GateError, GateResult};
use crate::Symbol;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecileSwitchConfig {
    pub tickers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    pub benchmark: String,
    /// SMA period of the true range
    pub atr_period: usize,
    /// Trailing window of the annualized return volatility
    pub vol_window: usize,
    pub periods_per_year: f64,
    /// Percentile of each indicator's own history that switches to cash
    pub percentile: f64,
}

impl Default for DecileSwitchConfig {
    fn default() -> Self {
        DecileSwitchConfig {
            tickers: vec!["SPY".to_string()],
            weights: None,
            benchmark: "SPY".to_string(),
            atr_period: 14,
            vol_window: 252,
            periods_per_year: 252.0,
            percentile: 80.0,
        }
    }
}

impl DecileSwitchConfig {
    pub fn benchmark_symbol(&self) -> Symbol {
        Symbol::new(&self.benchmark)
    }

    pub fn universe(&self) -> Vec<Symbol> {
        self.tickers.iter().map(Symbol::new).collect()
    }

    pub fn target_weights(&self) -> GateResult<TargetWeights> {
        self.validate()?;
        TargetWeights::new(&self.universe(), self.weights.as_deref())
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.atr_period == 0 {
            return Err(GateError::InvalidParameter {
                field: "atr_period",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.vol_window < 2 {
            return Err(GateError::WindowTooShort(self.vol_window));
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(GateError::InvalidParameter {
                field: "periods_per_year",
                reason: format!("must be positive, got {}", self.periods_per_year),
            });
        }
        if !(0.0..=100.0).contains(&self.percentile) {
            return Err(GateError::PercentileOutOfRange(self.percentile));
        }
        if self.benchmark.trim().is_empty() {
            return Err(GateError::InvalidParameter {
                field: "benchmark",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
