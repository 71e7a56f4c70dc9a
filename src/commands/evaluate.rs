//! Evaluate command implementation

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{info, warn};
use vol_regime_gate::state_manager::create_state_store;
use vol_regime_gate::{data, MarketData, Symbol};

use super::load_inputs;

pub fn run(config_path: String, as_of: Option<String>, dry_run: bool, force: bool) -> Result<()> {
    info!("Starting evaluation");

    let (config, strategy, mut snapshots) = load_inputs(&config_path)?;

    if let Some(date) = as_of {
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .with_context(|| format!("Invalid --as-of date: {}", date))?;
        info!("Evaluating as of {}", date);
        snapshots = data::truncate_as_of(snapshots, date);
    }

    let latest = snapshots
        .last()
        .map(|s| s.timestamp)
        .context("No bars on or before the requested date")?;

    let key = config.state_key()?;
    let store = create_state_store(&config.state)?;

    let state = match store.load_state(&key)? {
        Some(stored) if stored.as_of >= latest && !force => {
            warn!(
                key = %key,
                as_of = %stored.as_of,
                "Latest bar already evaluated, skipping (use --force to re-run)"
            );
            if let Some(last) = store.recent_allocations(&key, 1)?.first() {
                println!("{}", serde_json::to_string_pretty(last)?);
            }
            return Ok(());
        }
        Some(stored) => {
            info!(key = %key, count = stored.state.count, regime = %stored.state.regime, "Resuming from stored state");
            stored.state
        }
        None => {
            info!(key = %key, "No stored state, starting fresh");
            strategy.initial_state()
        }
    };

    // Holdings are taken to be whatever the last stored allocation went long
    let holdings: HashMap<Symbol, f64> = store
        .recent_allocations(&key, 1)?
        .first()
        .map(|record| {
            record
                .allocation
                .active()
                .map(|s| (s.clone(), record.allocation.weight(s).unwrap_or(0.0)))
                .collect()
        })
        .unwrap_or_default();

    let eval = strategy
        .run(&state, &MarketData::new(&snapshots, &holdings))
        .with_context(|| format!("Evaluation failed for bar {}", latest))?;

    info!(
        regime = %eval.regime,
        decision = %eval.decision,
        count = eval.state.count,
        invested = eval.allocation.total(),
        "Cycle evaluated"
    );

    if dry_run {
        info!("Dry run, state not saved");
    } else {
        store.save_cycle(&key, latest, &eval)?;
    }

    let output = serde_json::json!({
        "as_of": latest.to_rfc3339(),
        "strategy": strategy.name(),
        "regime": eval.regime,
        "decision": eval.decision.as_str(),
        "count": eval.state.count,
        "allocation": eval.allocation,
        "readings": eval.readings,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
