//! Runtime config store and risk gating behavior.

mod common;

use common::{MockVenue, RecordingEmail, enter_signal, test_settings};
use polysignal::application::system::Application;
use polysignal::domain::decisions::DecisionOutcome;
use polysignal::domain::trading::types::Side;
use std::collections::HashMap;
use std::sync::Arc;

async fn build_app() -> Application {
    let venue = Arc::new(MockVenue::new());
    let email = Arc::new(RecordingEmail::default());
    Application::build_with_ports(test_settings(), venue, email)
        .await
        .expect("application builds")
}

#[tokio::test]
async fn test_config_round_trip_and_partial_batch() {
    let app = build_app().await;

    // Seeded from defaults; the full policy surface is present.
    assert!((app.config.get("max_bet_usd") - 1.0).abs() < 1e-9);
    assert_eq!(app.config.get_all().len(), 14);

    let mut changes = HashMap::new();
    changes.insert("max_bet_usd".to_string(), 2.5);
    changes.insert("stop_loss_pct".to_string(), 10.0); // must be negative
    changes.insert("max_open_positions".to_string(), 2.5); // must be integer
    changes.insert("not_a_key".to_string(), 1.0);

    let outcome = app.config.update(&changes, "admin").await.unwrap();
    assert_eq!(outcome.updated, vec!["max_bet_usd".to_string()]);
    assert_eq!(outcome.errors.len(), 3);

    // Accepted key applied, rejected keys untouched.
    assert!((app.config.get("max_bet_usd") - 2.5).abs() < 1e-9);
    assert!((app.config.get("stop_loss_pct") + 20.0).abs() < 1e-9);
    assert!((app.config.get("max_open_positions") - 5.0).abs() < 1e-9);

    // Survives a reload from the same database.
    let detailed = app.config.get_detailed().await.unwrap();
    let row = detailed.iter().find(|d| d.key == "max_bet_usd").unwrap();
    assert!((row.value - 2.5).abs() < 1e-9);
    assert_eq!(row.updated_by.as_deref(), Some("admin"));
}

#[tokio::test]
async fn test_update_warns_when_limit_drops_below_current_state() {
    let app = build_app().await;

    app.bridge
        .handle_signal(&enter_signal("mkt-w1", Side::Up))
        .await
        .unwrap();
    app.bridge
        .handle_signal(&enter_signal("mkt-w2", Side::Up))
        .await
        .unwrap();
    assert_eq!(app.risk.open_positions(), 2);

    // Tightening below the live book warns but still applies.
    let mut changes = HashMap::new();
    changes.insert("max_open_positions".to_string(), 1.0);
    changes.insert("max_total_exposure_usd".to_string(), 1.0);
    let outcome = app.config.update(&changes, "admin").await.unwrap();
    assert_eq!(outcome.updated.len(), 2);
    assert!(
        outcome
            .warnings
            .iter()
            .any(|w| w.contains("below current open count")),
        "expected open-count warning, got {:?}",
        outcome.warnings
    );
    assert!(
        outcome
            .warnings
            .iter()
            .any(|w| w.contains("below current exposure")),
        "expected exposure warning, got {:?}",
        outcome.warnings
    );
    assert!((app.config.get("max_open_positions") - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_max_open_positions_blocks_as_risk_near_miss() {
    let app = build_app().await;

    let mut changes = HashMap::new();
    changes.insert("max_open_positions".to_string(), 1.0);
    app.config.update(&changes, "admin").await.unwrap();

    app.bridge
        .handle_signal(&enter_signal("mkt-a", Side::Up))
        .await
        .unwrap();
    app.bridge
        .handle_signal(&enter_signal("mkt-b", Side::Down))
        .await
        .unwrap();

    assert_eq!(app.executions.get_open_count().await.unwrap(), 1);

    let decisions = app.decisions.recent(1).await.unwrap();
    let blocked = &decisions[0];
    assert_eq!(blocked.outcome, DecisionOutcome::Blocked);
    assert_eq!(blocked.blocking_gate.as_deref(), Some("risk"));
    // Only the risk gate failed: a near-miss by definition.
    assert!(blocked.near_miss);
}

#[tokio::test]
async fn test_exposure_cap_blocks_new_trades() {
    let app = build_app().await;

    let mut changes = HashMap::new();
    changes.insert("max_total_exposure_usd".to_string(), 1.0);
    app.config.update(&changes, "admin").await.unwrap();

    app.bridge
        .handle_signal(&enter_signal("mkt-a", Side::Up))
        .await
        .unwrap();
    // First bet consumed the whole exposure budget.
    app.bridge
        .handle_signal(&enter_signal("mkt-b", Side::Up))
        .await
        .unwrap();

    assert_eq!(app.executions.get_open_count().await.unwrap(), 1);
    let decisions = app.decisions.recent(1).await.unwrap();
    assert_eq!(decisions[0].blocking_gate.as_deref(), Some("risk"));
}

#[tokio::test]
async fn test_settlement_and_spread_gates() {
    let app = build_app().await;

    let mut signal = enter_signal("mkt-late", Side::Up);
    signal.settlement_left_min = 10.0; // below min_settlement_minutes = 30
    app.bridge.handle_signal(&signal).await.unwrap();
    let decisions = app.decisions.recent(1).await.unwrap();
    assert_eq!(
        decisions[0].blocking_gate.as_deref(),
        Some("settlement_time")
    );

    let mut signal = enter_signal("mkt-wide", Side::Up);
    signal.spread_up = Some(0.09); // above max_spread = 0.05
    app.bridge.handle_signal(&signal).await.unwrap();
    let decisions = app.decisions.recent(1).await.unwrap();
    assert_eq!(decisions[0].blocking_gate.as_deref(), Some("spread"));

    assert_eq!(app.executions.get_open_count().await.unwrap(), 0);
}
