//! Configuration management
//!
//! Loads the JSON configuration file. The `strategy` section stays an untyped
//! JSON object here; each registered strategy deserializes it into its own
//! typed config. Directories can be overridden from the environment
//! (`REGIME_GATE_DATA_DIR`, `REGIME_GATE_STATE_DIR`), including values loaded
//! from a `.env` file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub strategy: serde_json::Value,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub state: StateConfig,
    /// Sweep grid (optional)
    /// Each key is a strategy param name, value is array of values to test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<HashMap<String, Vec<serde_json::Value>>>,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file {}", path.as_ref().display())
        })?;
        let mut config = Self::from_json(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(contents).context("Failed to parse config JSON")?;
        if !config.strategy.is_object() {
            anyhow::bail!("'strategy' section must be a JSON object");
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("REGIME_GATE_DATA_DIR") {
            self.data.data_dir = dir;
        }
        if let Ok(dir) = std::env::var("REGIME_GATE_STATE_DIR") {
            self.state.state_dir = dir;
        }
    }

    /// Strategy name from the strategy section
    pub fn strategy_name(&self) -> Result<String> {
        self.strategy
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .context("'name' is required in the 'strategy' section of config. Example: \"strategy\": { \"name\": \"volatility_regime\", ... }")
    }

    /// Key under which this strategy instance persists its state
    pub fn state_key(&self) -> Result<String> {
        match &self.state.key {
            Some(key) => Ok(key.clone()),
            None => self.strategy_name(),
        }
    }

    /// Set one strategy parameter
    pub fn set_strategy_param(&mut self, key: &str, value: serde_json::Value) {
        if let Some(obj) = self.strategy.as_object_mut() {
            obj.insert(key.to_string(), value);
        }
    }

    pub fn timeframe(&self) -> &str {
        &self.data.timeframe
    }
}

/// Where bar history is read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub data_dir: String,
    pub timeframe: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_dir: "data".to_string(),
            timeframe: "1d".to_string(),
        }
    }
}

/// Where strategy state and the allocation audit trail are kept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub state_dir: String,
    /// Defaults to the strategy name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default = "default_auto_backup")]
    pub auto_backup: bool,
}

fn default_auto_backup() -> bool {
    true
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            state_dir: "state".to_string(),
            key: None,
            auto_backup: true,
        }
    }
}

impl StateConfig {
    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("gate_state.db")
    }

    pub fn json_backup_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("gate_state.json")
    }
}
