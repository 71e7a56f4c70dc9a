//! Volatility Regime Gate Configuration
//!
//! Every variation point of the gate, with serde defaults so a config file
//! only names what it changes.

use serde::{Deserialize, Serialize};

use crate::allocation::TargetWeights;
use crate::error::{GateError, GateResult};
use crate::Symbol;

use super::exits::ExitRulesConfig;

/// Volatility Regime Gate Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityRegimeConfig {
    /// Tickers that receive weights when invested
    pub tickers: Vec<String>,
    /// Optional weight per ticker (normalized); equal weights when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    /// Ticker whose closes drive volatility and trend
    pub benchmark: String,
    /// Rolling realized-volatility window (bars)
    pub window: usize,
    /// Shift applied to returns for the comparison series
    pub n_future: usize,
    /// Percentile of vol_current history that arms a trigger
    pub trigger_percentile: f64,
    /// Percentile that selects the long cooldown
    pub high_percentile: f64,
    /// Cooldown armed by an ordinary trigger
    pub cooldown_low: i64,
    /// Cooldown armed by a high-severity trigger
    pub cooldown_high: i64,
    /// Counter value before the first cycle
    pub initial_count: i64,
    /// Span of the trend EMA
    pub trend_ema_period: usize,
    /// How many bars back the EMA is read (0 or 1)
    pub trend_lookback: usize,
    /// Weight held on every ticker right after a trigger
    pub defensive_weight: f64,
    /// Day of month for an unconditional rebalance
    ///
    /// The rebalance is checked before the trigger, so on that bar the gate
    /// invests even mid-cooldown or on a fresh spike. Setting it waives the
    /// minimum cooldown guarantee for one bar per month.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebalance_day: Option<u32>,
    /// ATR stop / profit target exits while invested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exits: Option<ExitRulesConfig>,
}

impl Default for VolatilityRegimeConfig {
    fn default() -> Self {
        VolatilityRegimeConfig {
            tickers: vec!["QQQ".to_string()],
            weights: None,
            benchmark: "QQQ".to_string(),
            window: 60,
            n_future: 20,
            trigger_percentile: 55.0,
            high_percentile: 80.0,
            cooldown_low: 10,
            cooldown_high: 20,
            initial_count: 5,
            trend_ema_period: 200,
            trend_lookback: 0,
            defensive_weight: 0.0,
            rebalance_day: None,
            exits: None,
        }
    }
}

impl VolatilityRegimeConfig {
    /// Large-cap tech basket on the Nasdaq-100 benchmark with short
    /// cooldowns and a small short bias after triggers
    pub fn short_bias() -> Self {
        VolatilityRegimeConfig {
            tickers: ["NFLX", "GOOGL", "AAPL", "AMZN", "META"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cooldown_low: 3,
            cooldown_high: 5,
            trend_lookback: 1,
            defensive_weight: -0.1,
            ..Self::default()
        }
    }

    /// Fast-reacting variant: 30-bar window, 7-bar shift, 50th percentile
    /// trigger and moderate cooldowns
    pub fn fast() -> Self {
        VolatilityRegimeConfig {
            window: 30,
            n_future: 7,
            trigger_percentile: 50.0,
            cooldown_low: 5,
            cooldown_high: 10,
            initial_count: 3,
            ..Self::default()
        }
    }

    /// Returns the gate needs before the volatility series are defined
    pub fn required_returns(&self) -> usize {
        self.window + self.n_future
    }

    pub fn benchmark_symbol(&self) -> Symbol {
        Symbol::new(&self.benchmark)
    }

    pub fn universe(&self) -> Vec<Symbol> {
        self.tickers.iter().map(Symbol::new).collect()
    }

    /// Validate every parameter and build the target weight table
    pub fn target_weights(&self) -> GateResult<TargetWeights> {
        self.validate()?;
        TargetWeights::new(&self.universe(), self.weights.as_deref())
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.window < 2 {
            return Err(GateError::WindowTooShort(self.window));
        }
        for pct in [self.trigger_percentile, self.high_percentile] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(GateError::PercentileOutOfRange(pct));
            }
        }
        if self.trigger_percentile > self.high_percentile {
            return Err(GateError::PercentileOrder {
                trigger: self.trigger_percentile,
                high: self.high_percentile,
            });
        }
        if self.cooldown_low < 1 || self.cooldown_low > self.cooldown_high {
            return Err(GateError::InvalidCooldown {
                low: self.cooldown_low,
                high: self.cooldown_high,
            });
        }
        if self.benchmark.trim().is_empty() {
            return Err(GateError::InvalidParameter {
                field: "benchmark",
                reason: "must not be empty".to_string(),
            });
        }
        if self.trend_ema_period == 0 {
            return Err(GateError::InvalidParameter {
                field: "trend_ema_period",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.defensive_weight.is_finite() || !(-1.0..=0.0).contains(&self.defensive_weight) {
            return Err(GateError::InvalidParameter {
                field: "defensive_weight",
                reason: format!("must be within [-1, 0], got {}", self.defensive_weight),
            });
        }
        if let Some(day) = self.rebalance_day {
            if !(1..=31).contains(&day) {
                return Err(GateError::InvalidParameter {
                    field: "rebalance_day",
                    reason: format!("must be a day of month, got {}", day),
                });
            }
        }
        if let Some(exits) = &self.exits {
            exits.validate()?;
        }
        Ok(())
    }
}
