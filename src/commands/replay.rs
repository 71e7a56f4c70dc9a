//! Replay command implementation

use anyhow::Result;
use tracing::info;
use vol_regime_gate::replay::{write_records, Replayer};

use super::load_inputs;

pub fn run(config_path: String, output: Option<String>) -> Result<()> {
    info!("Starting replay");

    let (_config, strategy, snapshots) = load_inputs(&config_path)?;
    let name = strategy.name();
    let replayer = Replayer::new(strategy);

    info!("Replaying {} cycles...", snapshots.len());
    let result = replayer.run(&snapshots);
    let summary = &result.summary;

    println!("\n{}", "=".repeat(60));
    println!("REPLAY RESULTS: {}", name);
    println!("{}", "=".repeat(60));
    println!("Cycles:              {}", summary.cycles);
    println!("Insufficient data:   {}", summary.insufficient);
    println!("Failed:              {}", summary.failed);
    println!("Invested cycles:     {}", summary.invested_cycles);
    println!("Invested fraction:   {:.2}%", summary.invested_fraction * 100.0);
    println!("Triggers:            {} ({} high)", summary.triggers, summary.high_triggers);
    println!("Re-entries:          {}", summary.reentries);
    println!("Longest defensive:   {} cycles", summary.longest_defensive_streak);
    println!(
        "Final state:         count={} regime={}",
        result.final_state.count, result.final_state.regime
    );
    println!("{}", "=".repeat(60));

    if let Some(path) = output {
        write_records(&path, &result.records)?;
        println!("Per-cycle log written to {}", path);
    }

    Ok(())
}
