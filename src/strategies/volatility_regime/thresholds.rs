//! Volatility series and percentile thresholds for one cycle

use crate::indicators::{backfill, log_returns, percentiles, rolling_realized_volatility, shift};

/// Back-filled current and shifted realized-volatility series
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilitySeries {
    pub current: Vec<f64>,
    pub future: Vec<f64>,
}

impl VolatilitySeries {
    /// `None` while no full window of returns exists
    pub fn from_closes(closes: &[f64], window: usize, n_future: usize) -> Option<Self> {
        let returns = log_returns(closes);
        let current = backfill(&rolling_realized_volatility(&returns, window))?;

        let shifted = shift(&returns, n_future, 0.0);
        let future = backfill(&rolling_realized_volatility(&shifted, window))?;

        Some(Self { current, future })
    }

    pub fn latest_current(&self) -> f64 {
        self.current.last().copied().unwrap_or(0.0)
    }

    pub fn latest_future(&self) -> f64 {
        self.future.last().copied().unwrap_or(0.0)
    }
}

/// Percentile thresholds over the whole `vol_current` history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub trigger: f64,
    pub high: f64,
}

impl Thresholds {
    pub fn compute(history: &[f64], trigger_pct: f64, high_pct: f64) -> Option<Self> {
        let values = percentiles(history, &[trigger_pct, high_pct])?;
        Some(Self {
            trigger: values[0],
            high: values[1],
        })
    }
}

/// Latest readings the state machine acts on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityReading {
    pub vol_current: f64,
    pub vol_future: f64,
    pub thresholds: Thresholds,
}

impl VolatilityReading {
    pub fn compute(
        closes: &[f64],
        window: usize,
        n_future: usize,
        trigger_pct: f64,
        high_pct: f64,
    ) -> Option<Self> {
        let series = VolatilitySeries::from_closes(closes, window, n_future)?;
        let thresholds = Thresholds::compute(&series.current, trigger_pct, high_pct)?;
        Some(Self {
            vol_current: series.latest_current(),
            vol_future: series.latest_future(),
            thresholds,
        })
    }

    /// Current volatility above its shifted counterpart and the trigger level
    pub fn is_trigger(&self) -> bool {
        self.vol_current > self.vol_future && self.vol_current > self.thresholds.trigger
    }

    pub fn is_high(&self) -> bool {
        self.vol_current > self.thresholds.high
    }
}
