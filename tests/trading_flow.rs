//! End-to-end admission flow against an in-memory database: dry-run entry,
//! dedup blocking, circuit breaker, stale auto-repair.

mod common;

use common::{MockVenue, RecordingEmail, enter_signal, test_settings};
use polysignal::application::system::Application;
use polysignal::domain::audit::AuditFilter;
use polysignal::domain::control::BotState;
use polysignal::domain::decisions::DecisionOutcome;
use polysignal::domain::trading::lifecycle::PositionState;
use polysignal::domain::trading::types::{ExecutionStatus, Side};
use std::sync::Arc;

async fn build_app() -> (Application, Arc<MockVenue>, Arc<RecordingEmail>) {
    let venue = Arc::new(MockVenue::new());
    let email = Arc::new(RecordingEmail::default());
    let app = Application::build_with_ports(test_settings(), venue.clone(), email.clone())
        .await
        .expect("application builds");
    (app, venue, email)
}

#[tokio::test]
async fn test_dry_run_signal_admission() {
    let (app, _venue, _email) = build_app().await;

    let signal = enter_signal("mkt-1", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();

    // One open dry-run execution with the capped bet size.
    let open = app.executions.get_open().await.unwrap();
    assert_eq!(open.len(), 1);
    let execution = &open[0];
    assert!(execution.dry_run);
    assert_eq!(execution.market_id, "mkt-1");
    assert!((execution.amount_usd - 1.0).abs() < 1e-9);
    assert_eq!(execution.status, ExecutionStatus::Open);

    // Accounting balance: ledger, risk counter and store all agree.
    assert_eq!(app.monitor.open_count().await, 1);
    assert_eq!(app.risk.open_positions(), 1);
    assert_eq!(app.executions.get_open_count().await.unwrap(), 1);

    // Lifecycle went PENDING -> ENTERED.
    let decisions = app.decisions.recent(10).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].outcome, DecisionOutcome::DryRun);
    let trade = app
        .monitor
        .get_trade(execution.id)
        .await
        .expect("position registered with monitor");
    let record = app
        .lifecycle
        .get(&trade.position_id)
        .expect("lifecycle record exists");
    assert_eq!(record.state, PositionState::Entered);

    // POSITION_OPENED hit the audit log.
    let events = app
        .audit
        .query(&AuditFilter {
            event_type: Some("POSITION_OPENED".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].execution_id, Some(execution.id));

    // The trail and the summary see the same event.
    let trail = app.audit.execution_trail(execution.id).await.unwrap();
    assert!(trail.iter().any(|e| e.event_type == "POSITION_OPENED"));
    let summary = app.audit.summary(1).await.unwrap();
    assert!(
        summary
            .iter()
            .any(|(event_type, count)| event_type == "POSITION_OPENED" && *count == 1)
    );
}

#[tokio::test]
async fn test_admin_cancel_all_open() {
    let (app, _venue, _email) = build_app().await;

    app.bridge
        .handle_signal(&enter_signal("mkt-c1", Side::Up))
        .await
        .unwrap();
    app.bridge
        .handle_signal(&enter_signal("mkt-c2", Side::Down))
        .await
        .unwrap();
    assert_eq!(app.executions.get_open_count().await.unwrap(), 2);

    let cancelled = app.executions.cancel_all_open().await.unwrap();
    assert_eq!(cancelled, 2);
    assert_eq!(app.executions.get_open_count().await.unwrap(), 0);
    // Monotone closure: a cancelled row never reopens the ledger.
    assert_eq!(app.monitor.rehydrate().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_signal_blocked_on_dedup() {
    let (app, _venue, _email) = build_app().await;

    let signal = enter_signal("mkt-1", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();
    app.bridge.handle_signal(&signal).await.unwrap();

    // Still exactly one execution; no duplicate row of any status.
    let open = app.executions.get_open().await.unwrap();
    assert_eq!(open.len(), 1);
    let by_signal = app.executions.get_by_signal(&signal.signal_id).await.unwrap();
    assert_eq!(by_signal.len(), 1);

    let decisions = app.decisions.recent(10).await.unwrap();
    assert_eq!(decisions.len(), 2);
    // recent() is newest-first; the block comes first.
    let blocked = &decisions[0];
    assert_eq!(blocked.outcome, DecisionOutcome::Blocked);
    assert_eq!(blocked.blocking_gate.as_deref(), Some("dedup"));
    // The same market also trips the cooldown gate, so this is not a
    // near-miss: two gates failed.
    assert!(!blocked.near_miss);
    assert_eq!(blocked.gates_passed, blocked.gates_total - 2);
}

#[tokio::test]
async fn test_circuit_breaker_pauses_and_blocks() {
    let (app, _venue, _email) = build_app().await;

    // Bank a loss past the daily limit.
    app.risk.record_trade_open("crypto", 1.0);
    app.risk.record_trade_close("crypto", 1.0, -60.0).await;

    assert_eq!(app.control.state().await, BotState::Paused);
    let (_, reason) = app.control.state_reason().await;
    assert_eq!(reason, "circuit_breaker");

    let breaker_events = app
        .audit
        .query(&AuditFilter {
            event_type: Some("CIRCUIT_BREAKER".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(breaker_events.len(), 1);

    // Subsequent signals are blocked, and the control gate reports the
    // breaker as the block reason.
    let signal = enter_signal("mkt-2", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();
    assert_eq!(app.executions.get_open_count().await.unwrap(), 0);

    let decisions = app.decisions.recent(1).await.unwrap();
    assert_eq!(decisions[0].outcome, DecisionOutcome::Blocked);
    let control_detail = decisions[0].gate_details["control"]["detail"]
        .as_str()
        .unwrap_or_default();
    assert!(control_detail.contains("circuit_breaker"));
}

#[tokio::test]
async fn test_stale_open_execution_is_auto_repaired() {
    let (app, _venue, _email) = build_app().await;

    let signal = enter_signal("mkt-old", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();
    let open = app.executions.get_open().await.unwrap();
    let id = open[0].id;

    // Age the row beyond max_age_hours (72) by rewriting opened_at.
    let old = (chrono::Utc::now() - chrono::Duration::hours(73)).to_rfc3339();
    sqlx::query("UPDATE trade_executions SET opened_at = $1 WHERE id = $2")
        .bind(&old)
        .bind(id)
        .execute(&app.database.pool)
        .await
        .unwrap();

    let repaired = app.audit.auto_repair(72).await.unwrap();
    assert_eq!(repaired, 1);

    let execution = app.executions.get(id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.close_reason.as_deref(), Some("auto_repair_stale"));

    let events = app
        .audit
        .query(&AuditFilter {
            event_type: Some("POSITION_AUTO_REPAIRED".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    // Rehydration after repair sees a clean slate.
    assert_eq!(app.monitor.rehydrate().await.unwrap(), 0);
}

#[tokio::test]
async fn test_weak_signal_blocked_as_near_miss_candidate() {
    let (app, _venue, _email) = build_app().await;

    let mut signal = enter_signal("mkt-weak", Side::Up);
    signal.strength = polysignal::domain::signal::SignalStrength::Weak;
    app.bridge.handle_signal(&signal).await.unwrap();

    let decisions = app.decisions.recent(1).await.unwrap();
    let blocked = &decisions[0];
    assert_eq!(blocked.outcome, DecisionOutcome::Blocked);
    assert_eq!(blocked.blocking_gate.as_deref(), Some("strength"));
    // Everything else passed: textbook near-miss.
    assert!(blocked.near_miss);
    assert_eq!(blocked.gates_passed, blocked.gates_total - 1);

    let report = app.decisions.filter_cost(1).await.unwrap();
    assert_eq!(report.blocked, 1);
    assert_eq!(report.per_gate[0].gate, "strength");

    let near = app.decisions.near_misses(1, 10).await.unwrap();
    assert_eq!(near.len(), 1);
    assert_eq!(near[0].signal_id, signal.signal_id);
}
