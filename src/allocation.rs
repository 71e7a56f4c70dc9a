//! Target weight tables and the allocation resolver
//!
//! Maps a regime outcome onto a weight for every declared ticker. Invested
//! allocations sum to 1, defensive ones to 0; tickers that are not allocated
//! are still present with weight 0.

use std::collections::{BTreeSet, HashSet};

use crate::error::{GateError, GateResult};
use crate::{AllocationMap, Symbol};

/// How capital is split across the universe when invested
#[derive(Debug, Clone, PartialEq)]
pub enum TargetWeights {
    Equal(Vec<Symbol>),
    /// Hand-tuned weights, normalized to sum to 1 at construction
    Fixed(Vec<(Symbol, f64)>),
}

impl TargetWeights {
    /// Build from a ticker list and an optional weight vector
    ///
    /// Mismatched lengths, duplicates, negative or non-finite weights and a
    /// zero weight sum are configuration errors.
    pub fn new(tickers: &[Symbol], weights: Option<&[f64]>) -> GateResult<Self> {
        if tickers.is_empty() {
            return Err(GateError::EmptyUniverse);
        }

        let mut seen = HashSet::with_capacity(tickers.len());
        for ticker in tickers {
            if !seen.insert(ticker) {
                return Err(GateError::DuplicateTicker(ticker.to_string()));
            }
        }

        let Some(weights) = weights else {
            return Ok(TargetWeights::Equal(tickers.to_vec()));
        };

        if weights.len() != tickers.len() {
            return Err(GateError::WeightLengthMismatch {
                tickers: tickers.len(),
                weights: weights.len(),
            });
        }

        for (ticker, &weight) in tickers.iter().zip(weights) {
            if !weight.is_finite() || weight < 0.0 {
                return Err(GateError::InvalidWeight {
                    ticker: ticker.to_string(),
                    weight,
                });
            }
        }

        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(GateError::ZeroWeightSum);
        }

        Ok(TargetWeights::Fixed(
            tickers
                .iter()
                .cloned()
                .zip(weights.iter().map(|w| w / sum))
                .collect(),
        ))
    }

    pub fn equal(tickers: &[Symbol]) -> GateResult<Self> {
        Self::new(tickers, None)
    }

    pub fn tickers(&self) -> Vec<Symbol> {
        match self {
            TargetWeights::Equal(tickers) => tickers.clone(),
            TargetWeights::Fixed(pairs) => pairs.iter().map(|(s, _)| s.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TargetWeights::Equal(tickers) => tickers.len(),
            TargetWeights::Fixed(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw (pre-renormalization) weight of every ticker
    fn raw(&self) -> Vec<(Symbol, f64)> {
        match self {
            TargetWeights::Equal(tickers) => {
                let w = 1.0 / tickers.len() as f64;
                tickers.iter().map(|s| (s.clone(), w)).collect()
            }
            TargetWeights::Fixed(pairs) => pairs.clone(),
        }
    }

    /// Full target distribution
    pub fn invested(&self) -> AllocationMap {
        self.invested_excluding(&BTreeSet::new())
    }

    /// Target distribution with `excluded` tickers zeroed and the rest
    /// renormalized to sum to 1; all zero when nothing remains
    pub fn invested_excluding(&self, excluded: &BTreeSet<Symbol>) -> AllocationMap {
        let raw = self.raw();
        let active_sum: f64 = raw
            .iter()
            .filter(|(s, _)| !excluded.contains(s))
            .map(|(_, w)| w)
            .sum();

        raw.into_iter()
            .map(|(symbol, weight)| {
                let weight = if excluded.contains(&symbol) || active_sum <= 0.0 {
                    0.0
                } else {
                    weight / active_sum
                };
                (symbol, weight)
            })
            .collect()
    }

    /// Every ticker at zero
    pub fn defensive(&self) -> AllocationMap {
        self.uniform(0.0)
    }

    /// Every ticker at `weight` (short-bias variants hold a small negative weight)
    pub fn uniform(&self, weight: f64) -> AllocationMap {
        let tickers = self.tickers();
        AllocationMap::uniform(&tickers, weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn syms(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(Symbol::new).collect()
    }

    #[test]
    fn test_equal_weights_sum_to_one() {
        let weights = TargetWeights::equal(&syms(&["A", "B", "C"])).unwrap();
        let map = weights.invested();
        assert_eq!(map.len(), 3);
        assert_relative_eq!(map.total(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(map.weight(&Symbol::new("B")).unwrap(), 1.0 / 3.0);
    }

    #[test]
    fn test_fixed_weights_are_normalized() {
        let weights =
            TargetWeights::new(&syms(&["A", "B"]), Some(&[0.03, 0.01][..])).unwrap();
        let map = weights.invested();
        assert_relative_eq!(map.weight(&Symbol::new("A")).unwrap(), 0.75, epsilon = 1e-12);
        assert_relative_eq!(map.weight(&Symbol::new("B")).unwrap(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_configuration_errors() {
        assert_eq!(TargetWeights::new(&[], None), Err(GateError::EmptyUniverse));
        assert_eq!(
            TargetWeights::new(&syms(&["A", "B"]), Some(&[1.0][..])),
            Err(GateError::WeightLengthMismatch {
                tickers: 2,
                weights: 1
            })
        );
        assert_eq!(
            TargetWeights::new(&syms(&["A", "A"]), None),
            Err(GateError::DuplicateTicker("A".to_string()))
        );
        assert!(matches!(
            TargetWeights::new(&syms(&["A"]), Some(&[-0.5][..])),
            Err(GateError::InvalidWeight { .. })
        ));
        assert_eq!(
            TargetWeights::new(&syms(&["A", "B"]), Some(&[0.0, 0.0][..])),
            Err(GateError::ZeroWeightSum)
        );
    }

    #[test]
    fn test_exclusion_renormalizes() {
        let weights =
            TargetWeights::new(&syms(&["A", "B", "C"]), Some(&[0.5, 0.3, 0.2][..])).unwrap();
        let excluded: BTreeSet<Symbol> = [Symbol::new("A")].into_iter().collect();
        let map = weights.invested_excluding(&excluded);

        assert_eq!(map.len(), 3);
        assert_eq!(map.weight(&Symbol::new("A")), Some(0.0));
        assert_relative_eq!(map.weight(&Symbol::new("B")).unwrap(), 0.6, epsilon = 1e-12);
        assert_relative_eq!(map.total(), 1.0, epsilon = 1e-12);

        let everything: BTreeSet<Symbol> = syms(&["A", "B", "C"]).into_iter().collect();
        let map = weights.invested_excluding(&everything);
        assert_eq!(map.total(), 0.0);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_defensive_and_uniform() {
        let weights = TargetWeights::equal(&syms(&["A", "B"])).unwrap();
        assert_eq!(weights.defensive().total(), 0.0);
        assert!(weights.defensive().is_defensive());
        assert_relative_eq!(weights.uniform(-0.1).total(), -0.2, epsilon = 1e-12);
    }
}
