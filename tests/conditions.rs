use ledgerflow::conditions::{Conditions, GateDecision};
use ledgerflow::gateway::AccountSnapshot;
use rustc_hash::FxHashMap;
use serde_json::json;

fn snapshot(total: f64, available: f64, invested: f64) -> AccountSnapshot {
    AccountSnapshot {
        total_balance: total,
        available_balance: available,
        invested_amount: invested,
    }
}

#[test]
fn no_conditions_always_allow() {
    let decision = Conditions::default().evaluate(&snapshot(0.0, 0.0, 0.0));
    assert!(decision.is_allowed());
}

#[test]
fn min_balance_denies_below_floor() {
    let conditions = Conditions {
        min_balance: Some(100.0),
        ..Default::default()
    };
    let decision = conditions.evaluate(&snapshot(500.0, 50.0, 0.0));
    assert_eq!(decision.reason(), Some("below minimum balance"));
}

#[test]
fn min_balance_allows_at_exact_floor() {
    let conditions = Conditions {
        min_balance: Some(100.0),
        ..Default::default()
    };
    assert!(conditions.evaluate(&snapshot(500.0, 100.0, 0.0)).is_allowed());
}

#[test]
fn max_balance_suppresses_once_cap_reached() {
    let conditions = Conditions {
        max_balance: Some(1_000.0),
        ..Default::default()
    };
    let decision = conditions.evaluate(&snapshot(2_000.0, 1_500.0, 0.0));
    assert_eq!(decision.reason(), Some("above maximum balance"));
    assert!(conditions.evaluate(&snapshot(2_000.0, 900.0, 0.0)).is_allowed());
}

#[test]
fn profit_threshold_compares_total_minus_invested() {
    let conditions = Conditions {
        profit_threshold: Some(200.0),
        ..Default::default()
    };
    // Profit 150 < 200: deny.
    let decision = conditions.evaluate(&snapshot(1_150.0, 500.0, 1_000.0));
    assert_eq!(decision.reason(), Some("profit below threshold"));
    // Profit 250 >= 200: allow.
    assert!(
        conditions
            .evaluate(&snapshot(1_250.0, 500.0, 1_000.0))
            .is_allowed()
    );
}

#[test]
fn first_violated_bound_decides() {
    let conditions = Conditions {
        min_balance: Some(100.0),
        max_balance: Some(50.0),
        profit_threshold: Some(1_000_000.0),
    };
    // Both min and max would trip; min is declared first.
    let decision = conditions.evaluate(&snapshot(0.0, 60.0, 0.0));
    assert_eq!(decision.reason(), Some("below minimum balance"));
}

#[test]
fn parses_from_step_config() {
    let mut config = FxHashMap::default();
    config.insert("min_balance".to_string(), json!(250.5));
    config.insert("profit_threshold".to_string(), json!(10));
    config.insert("max_balance".to_string(), json!("not a number"));
    let conditions = Conditions::from_config(&config);
    assert_eq!(conditions.min_balance, Some(250.5));
    assert_eq!(conditions.profit_threshold, Some(10.0));
    assert_eq!(conditions.max_balance, None);
    assert!(!conditions.is_empty());
}

#[test]
fn empty_config_parses_to_empty_conditions() {
    let conditions = Conditions::from_config(&FxHashMap::default());
    assert!(conditions.is_empty());
    assert_eq!(
        conditions.evaluate(&snapshot(1.0, 1.0, 1.0)),
        GateDecision::Allow
    );
}
