//! Core data types used across the gate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// Validation errors for bar data
#[derive(Debug, Error)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// One OHLCV observation for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Create a new bar with validation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarValidationError> {
        let bar = Self::new_unchecked(timestamp, open, high, low, close, volume);
        bar.validate()?;
        Ok(bar)
    }

    /// Create a bar without validation (for trusted sources or synthetic data)
    pub fn new_unchecked(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Bar where every price equals `close` (used when only closes are known)
    pub fn from_close(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self::new_unchecked(timestamp, close, close, close, close, 0.0)
    }

    /// Validate the bar data
    pub fn validate(&self) -> Result<(), BarValidationError> {
        if !(self.open > 0.0 && self.high > 0.0 && self.low > 0.0 && self.close > 0.0) {
            return Err(BarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(BarValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(BarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(BarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Ticker symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every allocation map and state snapshot, so the
/// clone is a reference-count bump rather than a heap copy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// All bars observed at one timestamp, keyed by ticker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub bars: HashMap<Symbol, PriceBar>,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            bars: HashMap::new(),
        }
    }

    pub fn with_bar(mut self, symbol: Symbol, bar: PriceBar) -> Self {
        self.bars.insert(symbol, bar);
        self
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&PriceBar> {
        self.bars.get(symbol)
    }
}

/// Everything a strategy sees on one evaluation cycle
#[derive(Debug, Clone, Copy)]
pub struct MarketData<'a> {
    /// Snapshots ordered oldest to newest
    pub ohlcv: &'a [Snapshot],
    /// Currently held weight or quantity per ticker, as reported by the host
    pub holdings: &'a HashMap<Symbol, f64>,
}

impl<'a> MarketData<'a> {
    pub fn new(ohlcv: &'a [Snapshot], holdings: &'a HashMap<Symbol, f64>) -> Self {
        Self { ohlcv, holdings }
    }

    pub fn latest(&self) -> Option<&'a Snapshot> {
        self.ohlcv.last()
    }

    /// Ordered series of one ticker's bars, skipping snapshots that lack it
    pub fn series(&self, symbol: &Symbol) -> PriceSeries {
        PriceSeries::extract(self.ohlcv, symbol)
    }

    pub fn is_held(&self, symbol: &Symbol) -> bool {
        self.holdings.get(symbol).is_some_and(|&q| q > 0.0)
    }
}

/// Chronological bars of a single ticker
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    pub symbol: Option<Symbol>,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn extract(snapshots: &[Snapshot], symbol: &Symbol) -> Self {
        let bars = snapshots
            .iter()
            .filter_map(|s| s.get(symbol).cloned())
            .collect();
        Self {
            symbol: Some(symbol.clone()),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }
}

/// Ticker -> fractional weight, covering the whole declared universe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationMap(BTreeMap<Symbol, f64>);

impl AllocationMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Same weight on every ticker
    pub fn uniform<'a>(tickers: impl IntoIterator<Item = &'a Symbol>, weight: f64) -> Self {
        Self(tickers.into_iter().map(|t| (t.clone(), weight)).collect())
    }

    pub fn insert(&mut self, symbol: Symbol, weight: f64) {
        self.0.insert(symbol, weight);
    }

    pub fn weight(&self, symbol: &Symbol) -> Option<f64> {
        self.0.get(symbol).copied()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.0.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &f64)> {
        self.0.iter()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &Symbol> {
        self.0.keys()
    }

    /// Net sum of weights
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Sum of absolute weights
    pub fn gross(&self) -> f64 {
        self.0.values().map(|w| w.abs()).sum()
    }

    /// True when no ticker carries a positive weight
    pub fn is_defensive(&self) -> bool {
        self.0.values().all(|&w| w <= 0.0)
    }

    /// Tickers with a strictly positive weight
    pub fn active(&self) -> impl Iterator<Item = &Symbol> {
        self.0.iter().filter(|(_, w)| **w > 0.0).map(|(s, _)| s)
    }
}

impl FromIterator<(Symbol, f64)> for AllocationMap {
    fn from_iter<I: IntoIterator<Item = (Symbol, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Discrete market-condition classification held across cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    #[default]
    Normal,
    /// Cooldown active, defensive
    Elevated,
    /// Cooldown expired and trend confirmed, invested
    Reentry,
}

impl Regime {
    pub fn is_invested(self) -> bool {
        matches!(self, Regime::Reentry)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Regime::Normal => "normal",
            Regime::Elevated => "elevated",
            Regime::Reentry => "reentry",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cooldown a trigger armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Elevated,
    High,
}

/// Why a cycle produced its allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    InsufficientData,
    Triggered { severity: Severity },
    Cooldown,
    TrendRejected,
    Reentry,
    ScheduledRebalance,
    VolatilityCash,
    RiskOn,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::InsufficientData => "insufficient_data",
            Decision::Triggered {
                severity: Severity::High,
            } => "triggered_high",
            Decision::Triggered {
                severity: Severity::Elevated,
            } => "triggered",
            Decision::Cooldown => "cooldown",
            Decision::TrendRejected => "trend_rejected",
            Decision::Reentry => "reentry",
            Decision::ScheduledRebalance => "scheduled_rebalance",
            Decision::VolatilityCash => "volatility_cash",
            Decision::RiskOn => "risk_on",
        }
    }

    pub fn is_trigger(self) -> bool {
        matches!(self, Decision::Triggered { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable per-strategy state carried between cycles
///
/// Strategies never mutate this in place: each evaluation returns a new
/// state for the caller to persist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    /// Cooldown counter; re-entry is possible once it drops below 1
    pub count: i64,
    pub regime: Regime,
    /// Cycles that passed the data-sufficiency check
    #[serde(default)]
    pub cycles: u64,
    /// Entry close recorded for each ticker the strategy went long
    #[serde(default)]
    pub entry_prices: BTreeMap<Symbol, f64>,
    /// Tickers removed by exit rules until the next trigger
    #[serde(default)]
    pub exited: BTreeSet<Symbol>,
}

impl StrategyState {
    pub fn seeded(count: i64) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }
}

/// Result of one evaluation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub state: StrategyState,
    pub allocation: AllocationMap,
    pub regime: Regime,
    pub decision: Decision,
    /// Indicator values the decision was based on, for logging and replay
    pub readings: BTreeMap<String, f64>,
}

impl Evaluation {
    pub fn reading(&self, key: &str) -> Option<f64> {
        self.readings.get(key).copied()
    }
}
