//! Allocation Strategies Module
//!
//! Strategy framework with:
//! - A trait every allocation strategy implements
//! - Dynamic strategy registry (no hardcoded names at call sites)
//! - Construction from the `strategy` section of the JSON config

pub mod decile_switch;
pub mod volatility_regime;

use crate::error::GateResult;
use crate::{Config, Evaluation, MarketData, StrategyState, Symbol};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

// =============================================================================
// Strategy Trait - The contract all strategies must implement
// =============================================================================

/// Daily target-allocation strategy.
///
/// `run` is a pure function of the carried state and the market data: it
/// returns the next state together with the allocation it decided on, and
/// the caller decides whether to persist it.
pub trait Strategy: Send + Sync {
    /// Strategy identifier (must match config's strategy name)
    fn name(&self) -> &'static str;

    /// Bar interval the strategy expects
    fn interval(&self) -> &'static str {
        "1d"
    }

    /// Tickers that receive weights
    fn universe(&self) -> &[Symbol];

    /// Ticker whose history drives the regime decision
    fn benchmark(&self) -> &Symbol;

    /// Every ticker the strategy needs bars for
    fn assets(&self) -> Vec<Symbol> {
        let mut assets = self.universe().to_vec();
        if !assets.contains(self.benchmark()) {
            assets.push(self.benchmark().clone());
        }
        assets
    }

    /// State to start from when nothing has been persisted yet
    fn initial_state(&self) -> StrategyState;

    /// Evaluate one cycle
    fn run(&self, state: &StrategyState, data: &MarketData<'_>) -> GateResult<Evaluation>;

    /// Clone into a box (the sweep hands one instance to each worker)
    fn clone_boxed(&self) -> Box<dyn Strategy>;
}

// =============================================================================
// Strategy Factory - Type alias for strategy constructor functions
// =============================================================================

/// Factory function type for creating strategies from config
pub type StrategyFactory = fn(&Config) -> Result<Box<dyn Strategy>>;

// =============================================================================
// Strategy Registry - Dynamic registration without hardcoding
// =============================================================================

/// Global strategy registry
static REGISTRY: OnceLock<RwLock<HashMap<&'static str, StrategyFactory>>> = OnceLock::new();

fn get_registry() -> &'static RwLock<HashMap<&'static str, StrategyFactory>> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert(
            "volatility_regime",
            volatility_regime::create as StrategyFactory,
        );
        map.insert("decile_switch", decile_switch::create as StrategyFactory);
        RwLock::new(map)
    })
}

/// Create a strategy from configuration
pub fn create_strategy(config: &Config) -> Result<Box<dyn Strategy>> {
    let strategy_name = config.strategy_name()?;

    let factory = {
        let registry = get_registry()
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match registry.get(strategy_name.as_str()) {
            Some(factory) => *factory,
            None => {
                let mut available: Vec<_> = registry.keys().copied().collect();
                available.sort_unstable();
                anyhow::bail!(
                    "Unknown strategy: '{}'. Available: {}",
                    strategy_name,
                    available.join(", ")
                );
            }
        }
    };

    factory(config)
}

/// Get list of available strategy names
pub fn available_strategies() -> Vec<&'static str> {
    let mut names: Vec<_> = get_registry()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .keys()
        .copied()
        .collect();
    names.sort_unstable();
    names
}

/// Register a new strategy (for plugins or testing)
pub fn register_strategy(name: &'static str, factory: StrategyFactory) {
    get_registry()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(name, factory);
}

/// Parse the `strategy` section into a typed config
pub(crate) fn parse_strategy_config<T: serde::de::DeserializeOwned>(
    config: &Config,
) -> Result<T> {
    let name = config.strategy_name()?;
    serde_json::from_value(config.strategy.clone())
        .map_err(|e| anyhow::anyhow!("Failed to parse {} config: {}", name, e))
}
