//! Integration tests for the volatility regime gate
//!
//! These tests verify that all components work together correctly.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use vol_regime_gate::replay::Replayer;
use vol_regime_gate::state_manager::SqliteStateStore;
use vol_regime_gate::strategies::volatility_regime::{
    ExitRulesConfig, VolatilityRegimeConfig, VolatilityRegimeGate,
};
use vol_regime_gate::strategies::{available_strategies, create_strategy, Strategy};
use vol_regime_gate::{
    Config, Decision, MarketData, PriceBar, Regime, Severity, Snapshot, StrategyState, Symbol,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap()
}

/// Closes starting at 100 that realize the given log returns
fn closes_from_returns(returns: &[f64]) -> Vec<f64> {
    let mut closes = Vec::with_capacity(returns.len() + 1);
    let mut price = 100.0_f64;
    closes.push(price);
    for r in returns {
        price *= r.exp();
        closes.push(price);
    }
    closes
}

/// One snapshot per close, every ticker sharing the same close-only bar
fn snapshots_for(tickers: &[&str], closes: &[f64]) -> Vec<Snapshot> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let ts = start() + Duration::days(i as i64);
            tickers.iter().fold(Snapshot::new(ts), |snap, t| {
                snap.with_bar(Symbol::new(t), PriceBar::from_close(ts, close))
            })
        })
        .collect()
}

/// 140 quiet returns followed by 10 returns ten times larger
fn spike_returns() -> Vec<f64> {
    let mut returns: Vec<f64> = (0..140)
        .map(|i| if i % 2 == 0 { 0.005 } else { -0.005 })
        .collect();
    returns.extend((0..10).map(|i| if i % 2 == 0 { 0.05 } else { -0.05 }));
    returns
}

fn gate_config(tickers: &[&str]) -> VolatilityRegimeConfig {
    VolatilityRegimeConfig {
        tickers: tickers.iter().map(|t| t.to_string()).collect(),
        benchmark: "QQQ".to_string(),
        ..Default::default()
    }
}

fn gate(tickers: &[&str]) -> VolatilityRegimeGate {
    VolatilityRegimeGate::new(gate_config(tickers)).unwrap()
}

fn no_holdings() -> HashMap<Symbol, f64> {
    HashMap::new()
}

fn assert_covers_universe(strategy: &dyn Strategy, allocation: &vol_regime_gate::AllocationMap) {
    let keys: BTreeSet<Symbol> = allocation.tickers().cloned().collect();
    let universe: BTreeSet<Symbol> = strategy.universe().iter().cloned().collect();
    assert_eq!(keys, universe);
}

// =============================================================================
// End-to-End Scenarios
// =============================================================================

#[test]
fn test_scenario_flat_prices_reenter_with_full_weights() {
    let gate = gate(&["QQQ", "AAPL", "MSFT"]);
    let snaps = snapshots_for(&["QQQ", "AAPL", "MSFT"], &vec![100.0; 90]);
    let holdings = no_holdings();
    let data = MarketData::new(&snaps, &holdings);

    let eval = gate.run(&StrategyState::seeded(1), &data).unwrap();

    assert_eq!(eval.reading("vol_current"), Some(0.0));
    assert_eq!(eval.reading("vol_future"), Some(0.0));
    assert_eq!(eval.decision, Decision::Reentry);
    assert_eq!(eval.regime, Regime::Reentry);
    assert!((eval.allocation.total() - 1.0).abs() < 1e-9);
    for (_, &w) in eval.allocation.iter() {
        assert!((w - 1.0 / 3.0).abs() < 1e-12);
    }
    assert_covers_universe(&gate, &eval.allocation);
}

#[test]
fn test_scenario_volatility_spike_goes_defensive() {
    let config = gate_config(&["QQQ", "AAPL"]);
    let cooldown_high = config.cooldown_high;
    let gate = VolatilityRegimeGate::new(config).unwrap();
    let snaps = snapshots_for(&["QQQ", "AAPL"], &closes_from_returns(&spike_returns()));
    let holdings = no_holdings();

    let eval = gate
        .run(&StrategyState::seeded(0), &MarketData::new(&snaps, &holdings))
        .unwrap();

    let vc = eval.reading("vol_current").unwrap();
    assert!(vc > eval.reading("trigger_threshold").unwrap());
    assert!(vc > eval.reading("vol_future").unwrap());
    assert!(vc > eval.reading("high_threshold").unwrap());
    assert_eq!(
        eval.decision,
        Decision::Triggered {
            severity: Severity::High
        }
    );
    assert_eq!(eval.regime, Regime::Elevated);
    assert_eq!(eval.state.count, cooldown_high);
    assert_eq!(eval.allocation.len(), 2);
    assert!(eval.allocation.iter().all(|(_, &w)| w == 0.0));
}

#[test]
fn test_scenario_short_history_is_defensive_and_keeps_counter() {
    let gate = gate(&["QQQ"]);
    // 49 returns, default window + shift needs 80
    let snaps = snapshots_for(&["QQQ"], &closes_from_returns(&spike_returns()[..49]));
    let holdings = no_holdings();
    let state = StrategyState::seeded(4);

    let eval = gate.run(&state, &MarketData::new(&snaps, &holdings)).unwrap();
    assert_eq!(eval.decision, Decision::InsufficientData);
    assert_eq!(eval.state.count, 4);
    assert_eq!(eval.state, state);
    assert_eq!(eval.allocation.total(), 0.0);
}

#[test]
fn test_missing_benchmark_is_insufficient_data() {
    let gate = gate(&["AAPL"]);
    let snaps = snapshots_for(&["AAPL"], &vec![100.0; 120]);
    let holdings = no_holdings();
    let eval = gate
        .run(&gate.initial_state(), &MarketData::new(&snaps, &holdings))
        .unwrap();
    assert_eq!(eval.decision, Decision::InsufficientData);
}

// =============================================================================
// Regime Machine Properties
// =============================================================================

#[test]
fn test_cooldown_blocks_reentry_until_counter_expires() {
    let config = gate_config(&["QQQ"]);
    let cooldown_high = config.cooldown_high;
    let gate = VolatilityRegimeGate::new(config).unwrap();
    let holdings = no_holdings();

    let spike = snapshots_for(&["QQQ"], &closes_from_returns(&spike_returns()));
    let triggered = gate
        .run(&StrategyState::seeded(0), &MarketData::new(&spike, &holdings))
        .unwrap();
    assert!(triggered.decision.is_trigger());

    // Flat history: no trigger and the trend filter always passes
    let flat = snapshots_for(&["QQQ"], &vec![100.0; 120]);
    let flat_data = MarketData::new(&flat, &holdings);

    let mut state = triggered.state;
    for cycle in 1..cooldown_high {
        let eval = gate.run(&state, &flat_data).unwrap();
        assert_eq!(eval.decision, Decision::Cooldown, "cycle {}", cycle);
        assert!(eval.allocation.is_defensive());
        state = eval.state;
    }

    let eval = gate.run(&state, &flat_data).unwrap();
    assert_eq!(eval.decision, Decision::Reentry);
    assert_eq!(eval.state.count, 0);
}

#[test]
fn test_unchanged_history_does_not_retrigger() {
    let gate = gate(&["QQQ"]);
    let holdings = no_holdings();
    let flat = snapshots_for(&["QQQ"], &vec![100.0; 120]);
    let data = MarketData::new(&flat, &holdings);

    let first = gate.run(&StrategyState::seeded(6), &data).unwrap();
    let second = gate.run(&first.state, &data).unwrap();
    assert_eq!(first.decision, Decision::Cooldown);
    assert_eq!(second.decision, Decision::Cooldown);
    assert_eq!(second.state.count, 4);

    // A condition that is met again re-arms the full cooldown
    let spike = snapshots_for(&["QQQ"], &closes_from_returns(&spike_returns()));
    let spike_data = MarketData::new(&spike, &holdings);
    let first = gate.run(&StrategyState::seeded(0), &spike_data).unwrap();
    let again = gate.run(&first.state, &spike_data).unwrap();
    assert!(again.decision.is_trigger());
    assert_eq!(again.state.count, first.state.count);
}

#[test]
fn test_evaluation_is_pure() {
    let gate = gate(&["QQQ"]);
    let holdings = no_holdings();
    let spike = snapshots_for(&["QQQ"], &closes_from_returns(&spike_returns()));
    let data = MarketData::new(&spike, &holdings);
    let state = StrategyState::seeded(2);

    let a = gate.run(&state, &data).unwrap();
    let b = gate.run(&state, &data).unwrap();
    assert_eq!(a.state, b.state);
    assert_eq!(a.allocation, b.allocation);
    assert_eq!(state, StrategyState::seeded(2));
}

#[test]
fn test_allocations_cover_universe_and_sum_to_zero_or_one() {
    let tickers = ["QQQ", "AAPL", "AMZN", "META"];
    let gate = VolatilityRegimeGate::new(VolatilityRegimeConfig {
        weights: Some(vec![0.4, 0.3, 0.2, 0.1]),
        window: 30,
        n_future: 7,
        cooldown_low: 3,
        cooldown_high: 5,
        ..gate_config(&tickers)
    })
    .unwrap();

    // Calm, then a burst, then a quiet rally
    let mut returns: Vec<f64> = (0..150)
        .map(|i| 0.004 * ((i as f64) * 1.3).sin())
        .collect();
    returns.extend((0..15).map(|i| if i % 2 == 0 { 0.04 } else { -0.045 }));
    returns.extend((0..60).map(|i| 0.0015 + 0.0005 * ((i as f64) * 0.9).cos()));
    let snaps = snapshots_for(&tickers, &closes_from_returns(&returns));
    let holdings = no_holdings();

    let mut state = gate.initial_state();
    let mut seen = BTreeSet::new();
    for i in 0..snaps.len() {
        let eval = gate
            .run(&state, &MarketData::new(&snaps[..=i], &holdings))
            .unwrap();
        assert_covers_universe(&gate, &eval.allocation);
        let total = eval.allocation.total();
        assert!(
            total.abs() < 1e-9 || (total - 1.0).abs() < 1e-9,
            "cycle {} total {}",
            i,
            total
        );
        seen.insert(eval.decision.as_str());
        state = eval.state;
    }

    assert!(seen.contains("insufficient_data"));
    assert!(seen.iter().any(|d| d.starts_with("triggered")));
    assert!(seen.contains("reentry"));
}

#[test]
fn test_short_bias_holds_negative_weight_after_trigger() {
    let gate = VolatilityRegimeGate::new(VolatilityRegimeConfig {
        benchmark: "QQQ".to_string(),
        ..VolatilityRegimeConfig::short_bias()
    })
    .unwrap();
    let tickers = ["QQQ", "NFLX", "GOOGL", "AAPL", "AMZN", "META"];
    let snaps = snapshots_for(&tickers, &closes_from_returns(&spike_returns()));
    let holdings = no_holdings();

    let eval = gate
        .run(&StrategyState::seeded(0), &MarketData::new(&snaps, &holdings))
        .unwrap();
    assert!(eval.decision.is_trigger());
    assert_eq!(eval.state.count, 5);
    assert_eq!(eval.allocation.len(), 5);
    assert!(eval.allocation.iter().all(|(_, &w)| (w + 0.1).abs() < 1e-12));
}

// =============================================================================
// Exit Rules
// =============================================================================

#[test]
fn test_stopped_out_ticker_is_dropped_until_next_trigger() {
    let gate = VolatilityRegimeGate::new(VolatilityRegimeConfig {
        exits: Some(ExitRulesConfig::default()),
        ..gate_config(&["AAA", "BBB"])
    })
    .unwrap();

    let mut snaps = snapshots_for(&["QQQ", "AAA", "BBB"], &vec![100.0; 100]);
    let last = snaps.len() - 1;
    let ts = snaps[last].timestamp;
    snaps[last]
        .bars
        .insert(Symbol::new("AAA"), PriceBar::from_close(ts, 90.0));

    let holdings: HashMap<Symbol, f64> = [(Symbol::new("AAA"), 0.5), (Symbol::new("BBB"), 0.5)]
        .into_iter()
        .collect();
    let mut state = StrategyState::seeded(0);
    state.regime = Regime::Reentry;
    state.entry_prices = [(Symbol::new("AAA"), 100.0), (Symbol::new("BBB"), 100.0)]
        .into_iter()
        .collect::<BTreeMap<_, _>>();

    let data = MarketData::new(&snaps, &holdings);
    let eval = gate.run(&state, &data).unwrap();
    assert_eq!(eval.decision, Decision::Reentry);
    assert_eq!(eval.allocation.weight(&Symbol::new("AAA")), Some(0.0));
    assert_eq!(eval.allocation.weight(&Symbol::new("BBB")), Some(1.0));
    assert!(eval.state.exited.contains(&Symbol::new("AAA")));
    assert!(!eval.state.entry_prices.contains_key(&Symbol::new("AAA")));

    // Still excluded on the next cycle
    let next = gate.run(&eval.state, &data).unwrap();
    assert_eq!(next.allocation.weight(&Symbol::new("AAA")), Some(0.0));

    // A trigger clears the exit set
    let spike = snapshots_for(&["QQQ", "AAA", "BBB"], &closes_from_returns(&spike_returns()));
    let triggered = gate
        .run(&next.state, &MarketData::new(&spike, &holdings))
        .unwrap();
    assert!(triggered.decision.is_trigger());
    assert!(triggered.state.exited.is_empty());
    assert!(triggered.state.entry_prices.is_empty());
}

// =============================================================================
// Registry, Replay and Persistence
// =============================================================================

#[test]
fn test_shipped_configs_build_strategies() {
    for path in [
        "configs/qqq_gate.json",
        "configs/tech_short_bias.json",
        "configs/spy_decile_switch.json",
    ] {
        let config = Config::from_file(path).unwrap();
        let strategy = create_strategy(&config).unwrap();
        assert!(available_strategies().contains(&strategy.name()), "{}", path);
        assert!(!strategy.universe().is_empty());
    }
}

#[test]
fn test_invalid_strategy_config_is_rejected() {
    let config = Config::from_json(
        r#"{"strategy": {"name": "volatility_regime", "trigger_percentile": 90, "high_percentile": 80}}"#,
    )
    .unwrap();
    let err = create_strategy(&config).err().unwrap();
    assert!(err.to_string().contains("trigger percentile"));
}

#[test]
fn test_decile_switch_via_registry() {
    let config = Config::from_json(
        r#"{"strategy": {"name": "decile_switch", "tickers": ["AAPL", "MSFT"], "weights": [3, 1], "benchmark": "SPY", "vol_window": 20}}"#,
    )
    .unwrap();
    let strategy = create_strategy(&config).unwrap();

    // Flat, then one 8% jump
    let mut returns = vec![0.0; 79];
    returns.push(0.08);
    let snaps = snapshots_for(&["SPY", "AAPL", "MSFT"], &closes_from_returns(&returns));
    let holdings = no_holdings();

    let calm = strategy
        .run(
            &strategy.initial_state(),
            &MarketData::new(&snaps[..80], &holdings),
        )
        .unwrap();
    assert_eq!(calm.decision, Decision::RiskOn);
    assert!((calm.allocation.weight(&Symbol::new("AAPL")).unwrap() - 0.75).abs() < 1e-12);

    let shocked = strategy
        .run(&calm.state, &MarketData::new(&snaps, &holdings))
        .unwrap();
    assert_eq!(shocked.decision, Decision::VolatilityCash);
    assert!(shocked.allocation.is_defensive());
    assert_eq!(shocked.state.cycles, 2);
}

#[test]
fn test_persisted_cycles_match_replay() {
    let gate = VolatilityRegimeGate::new(VolatilityRegimeConfig {
        window: 30,
        n_future: 7,
        ..gate_config(&["QQQ"])
    })
    .unwrap();
    let snaps = snapshots_for(&["QQQ"], &closes_from_returns(&spike_returns()));

    let store = SqliteStateStore::in_memory().unwrap();
    let holdings = no_holdings();
    for i in 0..snaps.len() {
        let state = store
            .load_state("qqq")
            .unwrap()
            .map(|s| s.state)
            .unwrap_or_else(|| gate.initial_state());
        let eval = gate
            .run(&state, &MarketData::new(&snaps[..=i], &holdings))
            .unwrap();
        store.save_cycle("qqq", snaps[i].timestamp, &eval).unwrap();
    }

    let replay = Replayer::new(gate.clone_boxed()).run(&snaps);
    let stored = store.load_state("qqq").unwrap().unwrap();
    assert_eq!(stored.state, replay.final_state);
    assert_eq!(stored.as_of, snaps[snaps.len() - 1].timestamp);
    assert_eq!(
        store.recent_allocations("qqq", 1000).unwrap().len(),
        snaps.len()
    );
    assert!(replay.summary.triggers >= 1);
}
