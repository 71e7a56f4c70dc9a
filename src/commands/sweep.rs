//! Sweep command implementation

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use vol_regime_gate::strategies::volatility_regime::{GridParams, VolatilityRegimeConfig};
use vol_regime_gate::sweep::{sort_results, SortMetric, Sweeper};
use vol_regime_gate::create_strategy;

use super::load_inputs;

pub fn run(
    config_path: String,
    mode: String,
    sort_by: SortMetric,
    top: usize,
    sequential: bool,
) -> Result<()> {
    info!("Starting parameter sweep");

    let (config, strategy, snapshots) = load_inputs(&config_path)?;
    if strategy.name() != "volatility_regime" {
        anyhow::bail!("Sweep supports volatility_regime only, got {}", strategy.name());
    }

    let grid = match mode.as_str() {
        "quick" => GridParams::quick(),
        "full" => GridParams::full(),
        "custom" => {
            let base: VolatilityRegimeConfig = serde_json::from_value(config.strategy.clone())?;
            match &config.grid {
                Some(map) => GridParams::from_map(map, &base)?,
                None => anyhow::bail!("--mode custom needs a 'grid' section in the config"),
            }
        }
        other => anyhow::bail!("Unknown sweep mode: {} (expected quick, full or custom)", other),
    };

    let configs = grid.generate_configs(&config);
    info!("Mode: {}, combinations: {}", mode, configs.len());
    println!("Sweeping {} combinations over {} bars", configs.len(), snapshots.len());

    let sweeper = Sweeper::new(create_strategy);
    let mut results = if sequential {
        sweeper.run_sequential(&snapshots, &configs)
    } else {
        let pb = ProgressBar::new(configs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );
        let results = sweeper.run(&snapshots, &configs, Some(&pb));
        pb.finish_with_message("done");
        results
    };

    sort_results(&mut results, sort_by);

    println!("\n{}", "=".repeat(100));
    println!("TOP {} BY {:?}", top.min(results.len()), sort_by);
    println!("{}", "=".repeat(100));
    println!(
        "{:>6} {:>8} {:>8} {:>8} {:>7} {:>7} {:>9} {:>9} {:>9}",
        "window", "n_future", "trigger", "high", "cd_low", "cd_high", "invested", "triggers", "reentries"
    );
    for result in results.iter().take(top) {
        let p = |k: &str| result.params.get(k).copied().unwrap_or(f64::NAN);
        println!(
            "{:>6} {:>8} {:>8.1} {:>8.1} {:>7} {:>7} {:>8.1}% {:>9} {:>9}",
            p("window"),
            p("n_future"),
            p("trigger_percentile"),
            p("high_percentile"),
            p("cooldown_low"),
            p("cooldown_high"),
            result.summary.invested_fraction * 100.0,
            result.summary.triggers,
            result.summary.reentries
        );
    }

    info!("Sweep complete: {} results", results.len());
    Ok(())
}
