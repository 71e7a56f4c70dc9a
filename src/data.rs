//! Data loading and management
//!
//! Loads daily OHLCV history from CSV files and aligns the per-ticker series
//! into date-ordered snapshots.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::{PriceBar, Snapshot, Symbol};

// =============================================================================
// CSV Data Loading
// =============================================================================

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = raw.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64> {
    record
        .get(idx)
        .with_context(|| format!("Missing {} column", name))?
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {}", name))
}

/// Load OHLCV data from CSV file
///
/// Rows that fail bar validation are skipped with a warning. The result is
/// sorted by timestamp.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<PriceBar>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut bars = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?.trim();
        let timestamp = parse_datetime(dt_str)
            .with_context(|| format!("Failed to parse datetime: {}", dt_str))?;

        let open = parse_field(&record, 1, "open")?;
        let high = parse_field(&record, 2, "high")?;
        let low = parse_field(&record, 3, "low")?;
        let close = parse_field(&record, 4, "close")?;
        let volume = parse_field(&record, 5, "volume")?;

        match PriceBar::new(timestamp, open, high, low, close, volume) {
            Ok(bar) => bars.push(bar),
            Err(e) => warn!(
                file = %path.display(),
                row = row_idx + 1,
                error = %e,
                "Skipping invalid bar"
            ),
        }
    }

    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

/// Load data for multiple symbols from `{data_dir}/{SYMBOL}_{timeframe}.csv`
///
/// Missing files are skipped with a warning; it is an error if nothing loads.
pub fn load_multi_symbol(
    data_dir: impl AsRef<Path>,
    symbols: &[Symbol],
    timeframe: &str,
) -> Result<HashMap<Symbol, Vec<PriceBar>>> {
    let mut data = HashMap::new();

    for symbol in symbols {
        let filename = format!("{}_{}.csv", symbol.as_str(), timeframe);
        let path = data_dir.as_ref().join(&filename);

        if !path.exists() {
            warn!("Data file not found: {}", path.display());
            continue;
        }

        let bars = load_csv(&path).with_context(|| format!("Failed to load data for {}", symbol))?;

        let validation = validate_bars(&bars);
        for warning in &validation.warnings {
            warn!(symbol = %symbol, "{}", warning);
        }
        if !validation.is_valid() {
            anyhow::bail!("Invalid data for {}: {}", symbol, validation.errors.join("; "));
        }

        info!("Loaded {} bars for {}", bars.len(), symbol);
        data.insert(symbol.clone(), bars);
    }

    if data.is_empty() {
        anyhow::bail!("No data loaded for any symbol");
    }

    Ok(data)
}

/// Save bars to CSV in the format `load_csv` reads
pub fn save_csv(path: impl AsRef<Path>, bars: &[PriceBar]) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;

    writeln!(file, "datetime,open,high,low,close,volume")?;
    for bar in bars {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            bar.timestamp.format("%Y-%m-%d %H:%M:%S"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        )?;
    }

    info!("Saved {} rows to {}", bars.len(), path.display());
    Ok(())
}

// =============================================================================
// Snapshot Alignment
// =============================================================================

/// Group per-ticker bars into one snapshot per timestamp, oldest first
///
/// A ticker without a bar on some date is simply absent from that snapshot.
pub fn build_snapshots(data: &HashMap<Symbol, Vec<PriceBar>>) -> Vec<Snapshot> {
    let mut by_time: BTreeMap<DateTime<Utc>, Snapshot> = BTreeMap::new();

    for (symbol, bars) in data {
        for bar in bars {
            by_time
                .entry(bar.timestamp)
                .or_insert_with(|| Snapshot::new(bar.timestamp))
                .bars
                .insert(symbol.clone(), bar.clone());
        }
    }

    by_time.into_values().collect()
}

/// Drop snapshots dated after `as_of`
pub fn truncate_as_of(mut snapshots: Vec<Snapshot>, as_of: NaiveDate) -> Vec<Snapshot> {
    snapshots.retain(|s| s.timestamp.date_naive() <= as_of);
    snapshots
}

// =============================================================================
// Data Validation
// =============================================================================

/// Validate a loaded bar series for consistency
pub fn validate_bars(bars: &[PriceBar]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if bars.is_empty() {
        warnings.push("No bars provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp == pair[0].timestamp {
            errors.push(format!("Bar {}: duplicate timestamp {}", i + 1, pair[1].timestamp));
        }
    }

    ValidationResult { errors, warnings }
}

/// Result of data validation
#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
