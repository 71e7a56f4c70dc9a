//! Volatility regime gate - main entry point
//!
//! This binary provides three subcommands:
//! - evaluate: Run one cycle against stored state and persist the result
//! - replay: Walk a bar history cycle by cycle from a fresh state
//! - sweep: Replay a parameter grid in parallel

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vol_regime_gate::sweep::SortMetric;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "vol-regime-gate")]
#[command(about = "Volatility regime gate with replay and parameter sweeps", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate one cycle and persist the new state
    Evaluate {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/qqq_gate.json")]
        config: String,

        /// Evaluate as of this date (YYYY-MM-DD); later bars are ignored
        #[arg(long)]
        as_of: Option<String>,

        /// Print the allocation without saving state
        #[arg(long)]
        dry_run: bool,

        /// Re-evaluate even if the latest bar was already processed
        #[arg(long)]
        force: bool,
    },

    /// Replay the full history from a fresh state
    Replay {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/qqq_gate.json")]
        config: String,

        /// Write the per-cycle log to this CSV file
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Sweep gate parameters over a grid
    Sweep {
        /// Path to base configuration file
        #[arg(short, long, default_value = "configs/qqq_gate.json")]
        config: String,

        /// Sweep mode (quick, full, or custom from the config's grid section)
        #[arg(short, long, default_value = "quick")]
        mode: String,

        /// Sort results by metric
        #[arg(long, value_enum, default_value = "invested")]
        sort_by: SortMetric,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // File appender
    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Sweep: only log to file, keep console clean for progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        // Console layer on stderr, stdout carries command output
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        // File layer - same format but without ANSI colors
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Evaluate { .. } => ("evaluate", false),
        Commands::Replay { .. } => ("replay", false),
        Commands::Sweep { .. } => ("sweep", true), // File-only for clean progress bar
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Evaluate {
            config,
            as_of,
            dry_run,
            force,
        } => commands::evaluate::run(config, as_of, dry_run, force),

        Commands::Replay { config, output } => commands::replay::run(config, output),

        Commands::Sweep {
            config,
            mode,
            sort_by,
            top,
            sequential,
        } => commands::sweep::run(config, mode, sort_by, top, sequential),
    }
}
