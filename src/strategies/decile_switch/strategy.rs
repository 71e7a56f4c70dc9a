//! Decile Cash Switch
//!
//! Moves the whole book to cash when the benchmark's ATR or its annualized
//! return volatility sits above the given percentile of its own history.

use std::collections::BTreeMap;
use tracing::debug;

use crate::allocation::TargetWeights;
use crate::error::GateResult;
use crate::indicators::{pct_change, percentile, rolling_annualized_volatility, sma, true_range};
use crate::strategies::volatility_regime::benchmark_closes;
use crate::strategies::Strategy;
use crate::{Decision, Evaluation, MarketData, Regime, StrategyState, Symbol};

use super::config::DecileSwitchConfig;

pub struct DecileSwitch {
    config: DecileSwitchConfig,
    weights: TargetWeights,
    universe: Vec<Symbol>,
    benchmark: Symbol,
}

impl DecileSwitch {
    pub fn new(config: DecileSwitchConfig) -> GateResult<Self> {
        let weights = config.target_weights()?;
        Ok(Self {
            universe: weights.tickers(),
            benchmark: config.benchmark_symbol(),
            weights,
            config,
        })
    }
}

impl Strategy for DecileSwitch {
    fn name(&self) -> &'static str {
        "decile_switch"
    }

    fn universe(&self) -> &[Symbol] {
        &self.universe
    }

    fn benchmark(&self) -> &Symbol {
        &self.benchmark
    }

    fn initial_state(&self) -> StrategyState {
        StrategyState::default()
    }

    fn clone_boxed(&self) -> Box<dyn Strategy> {
        Box::new(Self {
            config: self.config.clone(),
            weights: self.weights.clone(),
            universe: self.universe.clone(),
            benchmark: self.benchmark.clone(),
        })
    }

    fn run(&self, state: &StrategyState, data: &MarketData<'_>) -> GateResult<Evaluation> {
        let series = data.series(&self.benchmark);
        let closes = benchmark_closes(&series, &self.benchmark)?;

        let tr = true_range(&series.highs(), &series.lows(), &closes);
        let atr_series = sma(&tr, self.config.atr_period);
        let atr_history: Vec<f64> = atr_series.iter().flatten().copied().collect();

        let (Some(atr_now), Some(atr_threshold)) = (
            atr_series.last().copied().flatten(),
            percentile(&atr_history, self.config.percentile),
        ) else {
            debug!(benchmark = %self.benchmark, bars = closes.len(), "ATR undefined");
            return Ok(Evaluation {
                state: state.clone(),
                allocation: self.weights.defensive(),
                regime: state.regime,
                decision: Decision::InsufficientData,
                readings: BTreeMap::new(),
            });
        };

        let vol_series = rolling_annualized_volatility(
            &pct_change(&closes),
            self.config.vol_window,
            self.config.periods_per_year,
        );
        let vol_history: Vec<f64> = vol_series.iter().flatten().copied().collect();
        let vol_now = vol_series.last().copied().flatten();
        let vol_threshold = percentile(&vol_history, self.config.percentile);

        let atr_high = atr_now > atr_threshold;
        let vol_high = matches!((vol_now, vol_threshold), (Some(v), Some(t)) if v > t);

        let mut readings = BTreeMap::new();
        readings.insert("atr".to_string(), atr_now);
        readings.insert("atr_threshold".to_string(), atr_threshold);
        if let (Some(v), Some(t)) = (vol_now, vol_threshold) {
            readings.insert("annualized_vol".to_string(), v);
            readings.insert("annualized_vol_threshold".to_string(), t);
        }

        let mut next = state.clone();
        next.cycles += 1;

        let (allocation, decision) = if atr_high || vol_high {
            debug!(atr_high, vol_high, "Switching to cash allocation due to high volatility");
            next.regime = Regime::Elevated;
            (self.weights.defensive(), Decision::VolatilityCash)
        } else {
            next.regime = Regime::Reentry;
            (self.weights.invested(), Decision::RiskOn)
        };

        Ok(Evaluation {
            regime: next.regime,
            state: next,
            allocation,
            decision,
            readings,
        })
    }
}
