//! Replay engine
//!
//! Walks a stored bar history one cycle at a time, feeding each cycle the
//! state the previous one produced. Reports regime occupancy and transitions;
//! it never simulates fills or returns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{Decision, Evaluation, MarketData, Regime, Snapshot, Strategy, StrategyState, Symbol};

/// One row of the replay log
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub timestamp: DateTime<Utc>,
    pub regime: Regime,
    pub decision: String,
    pub count: i64,
    /// Sum of positive weights
    pub invested: f64,
    pub vol_current: Option<f64>,
    pub vol_future: Option<f64>,
    pub trigger_threshold: Option<f64>,
    pub high_threshold: Option<f64>,
}

impl CycleRecord {
    fn from_evaluation(timestamp: DateTime<Utc>, eval: &Evaluation) -> Self {
        Self {
            timestamp,
            regime: eval.regime,
            decision: eval.decision.to_string(),
            count: eval.state.count,
            invested: eval.allocation.iter().map(|(_, w)| w.max(0.0)).sum(),
            vol_current: eval.reading("vol_current"),
            vol_future: eval.reading("vol_future"),
            trigger_threshold: eval.reading("trigger_threshold"),
            high_threshold: eval.reading("high_threshold"),
        }
    }
}

/// Aggregate occupancy statistics of a replay
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    pub cycles: usize,
    pub insufficient: usize,
    pub failed: usize,
    /// Cycles with any positive weight
    pub invested_cycles: usize,
    pub invested_fraction: f64,
    pub triggers: usize,
    pub high_triggers: usize,
    /// Transitions into the re-entry regime
    pub reentries: usize,
    pub longest_defensive_streak: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayResult {
    pub records: Vec<CycleRecord>,
    pub summary: ReplaySummary,
    pub final_state: StrategyState,
}

/// Replay engine
pub struct Replayer {
    strategy: Box<dyn Strategy>,
}

impl Replayer {
    pub fn new(strategy: Box<dyn Strategy>) -> Self {
        Replayer { strategy }
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    /// Run from the strategy's initial state
    pub fn run(&self, snapshots: &[Snapshot]) -> ReplayResult {
        self.run_from(self.strategy.initial_state(), snapshots)
    }

    /// Run from a given state
    ///
    /// Holdings passed to each cycle are the tickers the previous cycle
    /// allocated to. A failed cycle is logged and leaves the state as it was.
    pub fn run_from(&self, initial: StrategyState, snapshots: &[Snapshot]) -> ReplayResult {
        let mut state = initial;
        let mut holdings: HashMap<Symbol, f64> = HashMap::new();
        let mut records = Vec::with_capacity(snapshots.len());
        let mut summary = ReplaySummary::default();
        let mut defensive_streak = 0usize;

        for (i, snapshot) in snapshots.iter().enumerate() {
            let data = MarketData::new(&snapshots[..=i], &holdings);

            let eval = match self.strategy.run(&state, &data) {
                Ok(eval) => eval,
                Err(e) => {
                    warn!(timestamp = %snapshot.timestamp, error = %e, "Cycle failed, state kept");
                    summary.failed += 1;
                    continue;
                }
            };

            summary.cycles += 1;
            match eval.decision {
                Decision::InsufficientData => summary.insufficient += 1,
                Decision::Triggered { severity } => {
                    summary.triggers += 1;
                    if severity == crate::Severity::High {
                        summary.high_triggers += 1;
                    }
                }
                _ => {}
            }

            if eval.regime == Regime::Reentry && state.regime != Regime::Reentry {
                summary.reentries += 1;
            }

            if eval.allocation.is_defensive() {
                defensive_streak += 1;
                summary.longest_defensive_streak =
                    summary.longest_defensive_streak.max(defensive_streak);
            } else {
                summary.invested_cycles += 1;
                defensive_streak = 0;
            }

            holdings = eval
                .allocation
                .active()
                .map(|s| (s.clone(), eval.allocation.weight(s).unwrap_or(0.0)))
                .collect();

            records.push(CycleRecord::from_evaluation(snapshot.timestamp, &eval));
            state = eval.state;
        }

        if summary.cycles > 0 {
            summary.invested_fraction = summary.invested_cycles as f64 / summary.cycles as f64;
        }

        info!(
            strategy = self.strategy.name(),
            cycles = summary.cycles,
            triggers = summary.triggers,
            reentries = summary.reentries,
            invested = format!("{:.1}%", summary.invested_fraction * 100.0),
            "Replay complete"
        );

        ReplayResult {
            records,
            summary,
            final_state: state,
        }
    }
}

/// Write the per-cycle log as CSV
pub fn write_records(path: impl AsRef<Path>, records: &[CycleRecord]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("Wrote {} cycles to {}", records.len(), path.display());
    Ok(())
}
