//! Technical indicators
//!
//! Moving averages come from the `ta` crate; true range, Wilder ATR and the
//! return/volatility transforms the regime gate is built on live here.
//! Series that are undefined for their first bars are returned as
//! `Vec<Option<f64>>` aligned to the input index.

use ordered_float::OrderedFloat;
use statrs::statistics::Statistics;
use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};
use ta::Next;

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let sma_val = indicator.next(value);
            (i + 1 >= period).then_some(sma_val)
        })
        .collect()
}

/// Exponentially weighted moving average seeded at the first observation
///
/// Defined from the first bar, so a long span can be read on a short history.
/// A span of 0 is treated as 1.
pub fn ewm(values: &[f64], span: usize) -> Vec<f64> {
    let mut indicator = match ExponentialMovingAverage::new(span.max(1)) {
        Ok(i) => i,
        Err(_) => return values.to_vec(),
    };

    values.iter().map(|&value| indicator.next(value)).collect()
}

// =============================================================================
// Volatility Indicators
// =============================================================================

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            let hl = high[i] - low[i];
            match i.checked_sub(1).and_then(|p| close.get(p)) {
                Some(&prev) => hl.max((high[i] - prev).abs()).max((low[i] - prev).abs()),
                None => hl,
            }
        })
        .collect()
}

/// Average True Range with Wilder's smoothing
///
/// Seeded with the mean of the first `period` true ranges, then
/// `atr = (prev * (period - 1) + tr) / period`.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![None; high.len()];
    }

    let tr = true_range(high, low, close);
    let n = period as f64;
    let mut current: Option<f64> = None;

    tr.iter()
        .enumerate()
        .map(|(i, &value)| {
            current = match current {
                Some(prev) => Some((prev * (n - 1.0) + value) / n),
                None if i + 1 == period => Some(tr[..period].iter().sum::<f64>() / n),
                None => None,
            };
            current
        })
        .collect()
}

// =============================================================================
// Returns and Realized Volatility
// =============================================================================

/// Log returns aligned to the price index; the first slot is `0.0`
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    let mut returns = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return returns;
    }

    returns.push(0.0);
    for w in closes.windows(2) {
        returns.push((w[1] / w[0]).ln());
    }

    returns
}

/// Simple returns aligned to the price index; the first slot is undefined
pub fn pct_change(closes: &[f64]) -> Vec<Option<f64>> {
    let mut returns = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return returns;
    }

    returns.push(None);
    for w in closes.windows(2) {
        returns.push(Some(w[1] / w[0] - 1.0));
    }

    returns
}

/// Shift a series forward by `periods`, filling the vacated head with `fill`
pub fn shift(values: &[f64], periods: usize, fill: f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i < periods { fill } else { values[i - periods] })
        .collect()
}

/// Realized volatility: `sqrt(sum(r^2) / (n - 1))`
///
/// Computed around zero rather than the sample mean. `None` when fewer than
/// two returns are given.
pub fn realized_volatility(returns: &[f64]) -> Option<f64> {
    let n = returns.len();
    if n < 2 {
        return None;
    }

    let sum_sq: f64 = returns.iter().map(|r| r * r).sum();
    Some((sum_sq / (n - 1) as f64).sqrt())
}

/// Realized volatility over a trailing window ending at each index
pub fn rolling_realized_volatility(returns: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..returns.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                None
            } else {
                realized_volatility(&returns[i + 1 - window..=i])
            }
        })
        .collect()
}

/// Replace gaps with the next defined value (trailing gaps take the last one)
///
/// Returns `None` when the series is empty or no value is defined.
pub fn backfill(series: &[Option<f64>]) -> Option<Vec<f64>> {
    if series.is_empty() {
        return None;
    }

    let mut filled = series.to_vec();
    let mut next: Option<f64> = None;
    for slot in filled.iter_mut().rev() {
        if let Some(v) = *slot {
            next = Some(v);
        } else {
            *slot = next;
        }
    }

    let mut prev: Option<f64> = None;
    for slot in filled.iter_mut() {
        if let Some(v) = *slot {
            prev = Some(v);
        } else {
            *slot = prev;
        }
    }

    filled.into_iter().collect()
}

/// Annualized sample standard deviation of returns over a trailing window
///
/// A window containing an undefined return is itself undefined.
pub fn rolling_annualized_volatility(
    returns: &[Option<f64>],
    window: usize,
    periods_per_year: f64,
) -> Vec<Option<f64>> {
    (0..returns.len())
        .map(|i| {
            if window < 2 || i + 1 < window {
                return None;
            }
            let slice: Option<Vec<f64>> = returns[i + 1 - window..=i].iter().copied().collect();
            let std = slice?.std_dev();
            std.is_finite().then(|| std * periods_per_year.sqrt())
        })
        .collect()
}

// =============================================================================
// Percentiles
// =============================================================================

/// Percentile by linear interpolation between order statistics
///
/// `pct` is clamped to `[0, 100]`; NaN samples are ignored. `None` on an
/// empty sample. With fewer than ~20 samples the result is unstable.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    percentiles(values, &[pct]).map(|p| p[0])
}

/// Several percentiles of the same sample, sorting it once
pub fn percentiles(values: &[f64], pcts: &[f64]) -> Option<Vec<f64>> {
    let mut sorted: Vec<OrderedFloat<f64>> = values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .map(OrderedFloat)
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable();

    let last = (sorted.len() - 1) as f64;
    let result = pcts
        .iter()
        .map(|&pct| {
            let rank = pct.clamp(0.0, 100.0) / 100.0 * last;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo].0 + (sorted[hi].0 - sorted[lo].0) * frac
        })
        .collect();

    Some(result)
}
