//! Volatility Regime Gate
//!
//! A decision component for daily target-allocation strategies: it measures
//! realized volatility of a benchmark, tracks a cooldown-driven regime, and
//! resolves the regime into weights over a ticker universe. Also provides CSV
//! loading, persisted strategy state, replay over a bar history and parameter
//! sweeps.

pub mod allocation;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod replay;
pub mod state_manager;
pub mod strategies;
pub mod sweep;
pub mod types;

pub use allocation::TargetWeights;
pub use config::Config;
pub use error::{GateError, GateResult};
pub use strategies::{create_strategy, Strategy};
pub use types::*;
