//! Property tests for the volatility and allocation primitives

use proptest::prelude::*;
use std::collections::BTreeSet;

use vol_regime_gate::indicators::{percentile, realized_volatility};
use vol_regime_gate::{Symbol, TargetWeights};

fn returns_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.2f64..0.2, 2..200)
}

fn symbols(n: usize) -> Vec<Symbol> {
    (0..n).map(|i| Symbol::new(format!("T{}", i))).collect()
}

proptest! {
    #[test]
    fn realized_vol_ignores_sign(returns in returns_strategy()) {
        let flipped: Vec<f64> = returns.iter().map(|r| -r).collect();
        let a = realized_volatility(&returns).unwrap();
        let b = realized_volatility(&flipped).unwrap();
        prop_assert!((a - b).abs() < 1e-15);
        prop_assert!(a >= 0.0);
    }

    #[test]
    fn realized_vol_of_zero_window_is_zero(n in 2usize..300) {
        prop_assert_eq!(realized_volatility(&vec![0.0; n]), Some(0.0));
    }

    #[test]
    fn odd_median_is_middle_element(mut values in prop::collection::vec(-1e6f64..1e6, 1..100)) {
        if values.len() % 2 == 0 {
            values.pop();
        }
        let median = percentile(&values, 50.0).unwrap();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        prop_assert_eq!(median, values[values.len() / 2]);
    }

    #[test]
    fn percentile_within_sample_range(
        values in prop::collection::vec(-1e6f64..1e6, 1..100),
        pct in 0.0f64..=100.0,
    ) {
        let p = percentile(&values, pct).unwrap();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(p >= min - 1e-6 && p <= max + 1e-6);
    }

    #[test]
    fn percentile_monotone_in_sample(
        values in prop::collection::vec(-1e3f64..1e3, 1..100),
        idx in any::<prop::sample::Index>(),
        bump in 0.0f64..1e3,
        pct in 0.0f64..=100.0,
    ) {
        let before = percentile(&values, pct).unwrap();
        let mut raised = values.clone();
        let i = idx.index(raised.len());
        raised[i] += bump;
        let after = percentile(&raised, pct).unwrap();
        prop_assert!(after >= before - 1e-9);
    }

    #[test]
    fn invested_allocation_sums_to_one(
        weights in prop::collection::vec(0.01f64..10.0, 1..12),
        excluded_mask in prop::collection::vec(any::<bool>(), 12),
    ) {
        let tickers = symbols(weights.len());
        let table = TargetWeights::new(&tickers, Some(&weights)).unwrap();

        let full = table.invested();
        prop_assert_eq!(full.len(), tickers.len());
        prop_assert!((full.total() - 1.0).abs() < 1e-9);

        let excluded: BTreeSet<Symbol> = tickers
            .iter()
            .zip(&excluded_mask)
            .filter(|(_, &ex)| ex)
            .map(|(s, _)| s.clone())
            .collect();
        let partial = table.invested_excluding(&excluded);
        prop_assert_eq!(partial.len(), tickers.len());
        if excluded.len() == tickers.len() {
            prop_assert_eq!(partial.total(), 0.0);
        } else {
            prop_assert!((partial.total() - 1.0).abs() < 1e-9);
        }
        for s in &excluded {
            prop_assert_eq!(partial.weight(s), Some(0.0));
        }
    }
}
