//! Position exit rules applied while the gate is invested
//!
//! An ATR stop below the recorded entry close and a fixed profit target.
//! Both are evaluated only for tickers the host reports as held.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{GateError, GateResult};
use crate::indicators::atr;
use crate::{MarketData, Symbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitRulesConfig {
    pub atr_period: usize,
    /// Stop distance below entry, in ATRs
    pub atr_stop_multiple: f64,
    /// Gain over entry that takes profit (0.35 = +35%)
    pub profit_target: f64,
}

impl Default for ExitRulesConfig {
    fn default() -> Self {
        ExitRulesConfig {
            atr_period: 14,
            atr_stop_multiple: 0.10,
            profit_target: 0.35,
        }
    }
}

impl ExitRulesConfig {
    pub fn validate(&self) -> GateResult<()> {
        if self.atr_period == 0 {
            return Err(GateError::InvalidParameter {
                field: "exits.atr_period",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.atr_stop_multiple.is_finite() && self.atr_stop_multiple > 0.0) {
            return Err(GateError::InvalidParameter {
                field: "exits.atr_stop_multiple",
                reason: format!("must be positive, got {}", self.atr_stop_multiple),
            });
        }
        if !(self.profit_target.is_finite() && self.profit_target > 0.0) {
            return Err(GateError::InvalidParameter {
                field: "exits.profit_target",
                reason: format!("must be positive, got {}", self.profit_target),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    AtrStop,
    ProfitTarget,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::AtrStop => f.write_str("atr_stop"),
            ExitReason::ProfitTarget => f.write_str("profit_target"),
        }
    }
}

/// Held tickers whose latest close hits the stop or the target
pub fn triggered_exits(
    rules: &ExitRulesConfig,
    data: &MarketData<'_>,
    entry_prices: &BTreeMap<Symbol, f64>,
) -> Vec<(Symbol, ExitReason)> {
    let mut exits = Vec::new();

    for (ticker, &entry) in entry_prices {
        if !data.is_held(ticker) || entry <= 0.0 {
            continue;
        }

        let series = data.series(ticker);
        let Some(price) = series.last().map(|bar| bar.close) else {
            continue;
        };

        let current_atr = atr(
            &series.highs(),
            &series.lows(),
            &series.closes(),
            rules.atr_period,
        )
        .last()
        .copied()
        .flatten();

        let change = price - entry;
        let stopped = current_atr.is_some_and(|a| change < -rules.atr_stop_multiple * a);

        if stopped {
            exits.push((ticker.clone(), ExitReason::AtrStop));
        } else if change / entry >= rules.profit_target {
            exits.push((ticker.clone(), ExitReason::ProfitTarget));
        }
    }

    exits
}
