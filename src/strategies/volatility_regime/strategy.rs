//! Volatility Regime Gate
//!
//! Once per cycle: realized volatility of the benchmark against its shifted
//! counterpart and expanding percentile thresholds, a cooldown counter that a
//! spike re-arms, and a trend filter that must confirm before re-entry.

use chrono::Datelike;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::allocation::TargetWeights;
use crate::error::{GateError, GateResult};
use crate::indicators::ewm;
use crate::strategies::Strategy;
use crate::{
    AllocationMap, Decision, Evaluation, MarketData, PriceSeries, Regime, Severity,
    StrategyState, Symbol,
};

use super::config::VolatilityRegimeConfig;
use super::exits::triggered_exits;
use super::thresholds::VolatilityReading;

/// Relative slack when comparing a close to its EMA; a flat series drifts by
/// a few ulps in the EMA recurrence and must still count as "at" its average
const TREND_TOLERANCE: f64 = 1e-9;

/// Close versus its EMA at the configured lookback
#[derive(Debug, Clone, Copy)]
struct TrendCheck {
    close: f64,
    ema: Option<f64>,
}

impl TrendCheck {
    fn passes(&self) -> bool {
        self.ema
            .is_some_and(|ema| self.close >= ema - TREND_TOLERANCE * ema.abs())
    }
}

/// Benchmark closes, rejecting any that cannot be used for log returns
pub(crate) fn benchmark_closes(series: &PriceSeries, benchmark: &Symbol) -> GateResult<Vec<f64>> {
    series
        .bars
        .iter()
        .map(|bar| {
            if bar.close.is_finite() && bar.close > 0.0 {
                Ok(bar.close)
            } else {
                Err(GateError::InvalidPrice {
                    ticker: benchmark.to_string(),
                    timestamp: bar.timestamp,
                    close: bar.close,
                })
            }
        })
        .collect()
}

pub struct VolatilityRegimeGate {
    config: VolatilityRegimeConfig,
    weights: TargetWeights,
    universe: Vec<Symbol>,
    benchmark: Symbol,
}

impl VolatilityRegimeGate {
    /// Validates the config; configuration errors surface here, never per cycle
    pub fn new(config: VolatilityRegimeConfig) -> GateResult<Self> {
        let weights = config.target_weights()?;
        Ok(Self {
            universe: weights.tickers(),
            benchmark: config.benchmark_symbol(),
            weights,
            config,
        })
    }

    pub fn config(&self) -> &VolatilityRegimeConfig {
        &self.config
    }

    fn trend(&self, closes: &[f64]) -> TrendCheck {
        let ema = ewm(closes, self.config.trend_ema_period);
        let last = closes.len().saturating_sub(1);
        TrendCheck {
            close: closes.last().copied().unwrap_or(0.0),
            ema: last
                .checked_sub(self.config.trend_lookback)
                .and_then(|i| ema.get(i).copied()),
        }
    }

    /// First bar on or after `rebalance_day` in its month
    fn is_rebalance_day(&self, data: &MarketData<'_>) -> bool {
        let Some(day) = self.config.rebalance_day else {
            return false;
        };
        let n = data.ohlcv.len();
        let Some(today) = data.ohlcv.last().map(|s| s.timestamp) else {
            return false;
        };
        if today.day() < day {
            return false;
        }
        match n.checked_sub(2).map(|i| data.ohlcv[i].timestamp) {
            Some(prev) => {
                prev.day() < day || prev.month() != today.month() || prev.year() != today.year()
            }
            None => true,
        }
    }

    /// Record the latest close for newly allocated tickers
    fn record_entries(&self, state: &mut StrategyState, allocation: &AllocationMap, data: &MarketData<'_>) {
        let Some(latest) = data.latest() else {
            return;
        };
        for ticker in allocation.active() {
            if state.entry_prices.contains_key(ticker) {
                continue;
            }
            if let Some(bar) = latest.get(ticker) {
                state.entry_prices.insert(ticker.clone(), bar.close);
            }
        }
    }

    fn insufficient(&self, state: &StrategyState, available: usize) -> Evaluation {
        let mut readings = BTreeMap::new();
        readings.insert("returns_available".to_string(), available as f64);
        readings.insert(
            "required_returns".to_string(),
            self.config.required_returns() as f64,
        );
        Evaluation {
            state: state.clone(),
            allocation: self.weights.defensive(),
            regime: state.regime,
            decision: Decision::InsufficientData,
            readings,
        }
    }
}

impl Strategy for VolatilityRegimeGate {
    fn name(&self) -> &'static str {
        "volatility_regime"
    }

    fn universe(&self) -> &[Symbol] {
        &self.universe
    }

    fn benchmark(&self) -> &Symbol {
        &self.benchmark
    }

    fn initial_state(&self) -> StrategyState {
        StrategyState::seeded(self.config.initial_count)
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

        let available = closes.len().saturating_sub(1);
        if available < self.config.required_returns() {
            debug!(
                benchmark = %self.benchmark,
                available,
                required = self.config.required_returns(),
                "Not enough history for volatility series"
            );
            return Ok(self.insufficient(state, available));
        }

        let Some(reading) = VolatilityReading::compute(
            &closes,
            self.config.window,
            self.config.n_future,
            self.config.trigger_percentile,
            self.config.high_percentile,
        ) else {
            return Ok(self.insufficient(state, available));
        };
        let trend = self.trend(&closes);

        let mut next = state.clone();
        next.count -= 1;
        next.cycles += 1;

        let mut readings = BTreeMap::new();
        readings.insert("vol_current".to_string(), reading.vol_current);
        readings.insert("vol_future".to_string(), reading.vol_future);
        readings.insert("trigger_threshold".to_string(), reading.thresholds.trigger);
        readings.insert("high_threshold".to_string(), reading.thresholds.high);
        readings.insert("close".to_string(), trend.close);
        if let Some(ema) = trend.ema {
            readings.insert("trend_ema".to_string(), ema);
        }

        debug!(
            vol_current = reading.vol_current,
            vol_future = reading.vol_future,
            trigger = reading.thresholds.trigger,
            high = reading.thresholds.high,
            close = trend.close,
            ema = ?trend.ema,
            count = next.count,
            "Volatility reading"
        );

        let (allocation, decision) = if self.is_rebalance_day(data) {
            let allocation = self.weights.invested_excluding(&next.exited);
            next.regime = Regime::Reentry;
            self.record_entries(&mut next, &allocation, data);
            (allocation, Decision::ScheduledRebalance)
        } else if reading.is_trigger() {
            let severity = if reading.is_high() {
                Severity::High
            } else {
                Severity::Elevated
            };
            next.count = match severity {
                Severity::High => self.config.cooldown_high,
                Severity::Elevated => self.config.cooldown_low,
            };
            next.regime = Regime::Elevated;
            next.entry_prices.clear();
            next.exited.clear();
            (
                self.weights.uniform(self.config.defensive_weight),
                Decision::Triggered { severity },
            )
        } else if next.count < 1 && trend.passes() {
            if let Some(rules) = &self.config.exits {
                for (ticker, reason) in triggered_exits(rules, data, &next.entry_prices) {
                    info!(ticker = %ticker, reason = %reason, "Exit rule removed ticker");
                    next.entry_prices.remove(&ticker);
                    next.exited.insert(ticker);
                }
            }
            let allocation = self.weights.invested_excluding(&next.exited);
            next.regime = Regime::Reentry;
            self.record_entries(&mut next, &allocation, data);
            (allocation, Decision::Reentry)
        } else {
            next.entry_prices.clear();
            if next.count >= 1 {
                next.regime = Regime::Elevated;
                (self.weights.defensive(), Decision::Cooldown)
            } else {
                next.regime = Regime::Normal;
                (self.weights.defensive(), Decision::TrendRejected)
            }
        };

        if next.regime != state.regime {
            info!(
                from = %state.regime,
                to = %next.regime,
                decision = %decision,
                count = next.count,
                "Regime transition"
            );
        }

        readings.insert("count".to_string(), next.count as f64);

        Ok(Evaluation {
            regime: next.regime,
            state: next,
            allocation,
            decision,
            readings,
        })
    }
}
