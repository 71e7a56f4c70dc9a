//! Command implementations for the CLI

pub mod evaluate;
pub mod replay;
pub mod sweep;

use anyhow::{Context, Result};
use tracing::info;
use vol_regime_gate::{create_strategy, data, Config, Snapshot, Strategy};

/// Load config, build the strategy, and load its bars as snapshots
pub fn load_inputs(config_path: &str) -> Result<(Config, Box<dyn Strategy>, Vec<Snapshot>)> {
    let config = Config::from_file(config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let strategy = create_strategy(&config)
        .with_context(|| format!("Failed to create strategy from {}", config_path))?;
    info!(
        strategy = strategy.name(),
        benchmark = %strategy.benchmark(),
        tickers = strategy.universe().len(),
        "Strategy created"
    );

    info!("Loading data from: {}", config.data.data_dir);
    let bars = data::load_multi_symbol(
        &config.data.data_dir,
        &strategy.assets(),
        config.timeframe(),
    )?;
    if !bars.contains_key(strategy.benchmark()) {
        anyhow::bail!("No data for benchmark {}", strategy.benchmark());
    }

    let snapshots = data::build_snapshots(&bars);
    info!("Built {} snapshots for {} symbols", snapshots.len(), bars.len());

    Ok((config, strategy, snapshots))
}
