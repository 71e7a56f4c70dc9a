//! Parameter sweep
//!
//! Replays the same history under every configuration of a grid, in parallel,
//! and ranks the configurations by regime occupancy.

use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::warn;

use crate::replay::{ReplaySummary, Replayer};
use crate::strategies::volatility_regime::grid_params::extract_params;
use crate::{Config, Snapshot, Strategy};

/// Sweep result for a single parameter combination
#[derive(Debug, Clone)]
pub struct SweepResult {
    pub params: BTreeMap<String, f64>,
    pub summary: ReplaySummary,
}

/// Metric the results are ranked by (descending)
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortMetric {
    Invested,
    Triggers,
    Reentries,
}

/// Runs one replay per config
pub struct Sweeper<F> {
    strategy_factory: F,
}

impl<F> Sweeper<F>
where
    F: Fn(&Config) -> anyhow::Result<Box<dyn Strategy>> + Send + Sync,
{
    pub fn new(strategy_factory: F) -> Self {
        Sweeper { strategy_factory }
    }

    fn evaluate(&self, snapshots: &[Snapshot], config: &Config) -> Option<SweepResult> {
        let strategy = match (self.strategy_factory)(config) {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!(params = ?extract_params(config), error = %e, "Skipping invalid config");
                return None;
            }
        };

        let result = Replayer::new(strategy).run(snapshots);
        Some(SweepResult {
            params: extract_params(config),
            summary: result.summary,
        })
    }

    /// Run the grid in parallel, ticking `progress_bar` once per config
    pub fn run(
        &self,
        snapshots: &[Snapshot],
        configs: &[Config],
        progress_bar: Option<&ProgressBar>,
    ) -> Vec<SweepResult> {
        tracing::info!("Testing {} parameter combinations", configs.len());

        configs
            .par_iter()
            .filter_map(|config| {
                let result = self.evaluate(snapshots, config);
                if let Some(pb) = progress_bar {
                    pb.inc(1);
                }
                result
            })
            .collect()
    }

    /// Run the grid sequentially (for debugging)
    pub fn run_sequential(&self, snapshots: &[Snapshot], configs: &[Config]) -> Vec<SweepResult> {
        tracing::info!(
            "Testing {} parameter combinations sequentially",
            configs.len()
        );

        configs
            .iter()
            .filter_map(|config| self.evaluate(snapshots, config))
            .collect()
    }
}

/// Sort sweep results by the given metric, best first
pub fn sort_results(results: &mut [SweepResult], sort_by: SortMetric) {
    results.sort_by(|a, b| {
        let (va, vb) = match sort_by {
            SortMetric::Invested => (a.summary.invested_fraction, b.summary.invested_fraction),
            SortMetric::Triggers => (a.summary.triggers as f64, b.summary.triggers as f64),
            SortMetric::Reentries => (a.summary.reentries as f64, b.summary.reentries as f64),
        };
        vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
    });
}
