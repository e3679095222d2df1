//! Settlement monitor exit behavior driven tick by tick with scripted
//! mark prices.

mod common;

use common::{MockVenue, RecordingEmail, enter_signal, test_settings};
use polysignal::application::system::Application;
use polysignal::domain::audit::AuditFilter;
use polysignal::domain::trading::types::{ExecutionStatus, Side};
use std::sync::Arc;

async fn build_app() -> (Application, Arc<MockVenue>) {
    let venue = Arc::new(MockVenue::new());
    let email = Arc::new(RecordingEmail::default());
    let app = Application::build_with_ports(test_settings(), venue.clone(), email)
        .await
        .expect("application builds");
    (app, venue)
}

#[tokio::test]
async fn test_partial_take_profit_then_trailing_stop() {
    let (app, venue) = build_app().await;

    // Entry at 0.50 (UP side buys token T1 at price_up).
    let signal = enter_signal("mkt-tp", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();
    let execution_id = app.executions.get_open().await.unwrap()[0].id;

    // 0.52: hold. 0.58: +16% >= 15% -> partial exit of half.
    venue.script_prices("T1", &[0.52, 0.58]);
    app.monitor.tick().await;
    app.monitor.tick().await;

    let trade = app.monitor.get_trade(execution_id).await.unwrap();
    assert!(trade.partial_exit_done);
    assert!(trade.breakeven_armed);
    assert!((trade.shares - 1.0).abs() < 1e-9); // half of 2.0 shares
    assert!((trade.realized_pnl - 0.08).abs() < 1e-9); // (0.58-0.50) * 1

    let partials = app
        .audit
        .query(&AuditFilter {
            event_type: Some("PARTIAL_EXIT".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(partials.len(), 1);

    // Peak at 0.60, then 0.555: 7.5% off the peak >= 5% trailing stop.
    venue.script_prices("T1", &[0.60, 0.555]);
    app.monitor.tick().await;
    assert_eq!(app.monitor.open_count().await, 1);
    app.monitor.tick().await;
    assert_eq!(app.monitor.open_count().await, 0);

    let execution = app.executions.get(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Closed);
    assert_eq!(execution.close_reason.as_deref(), Some("TRAILING_STOP"));
    // 0.08 banked on the partial plus (0.555-0.50) on the remaining share.
    assert!((execution.pnl_usd.unwrap() - 0.135).abs() < 1e-6);
    assert!((execution.pnl_pct.unwrap() - 13.5).abs() < 1e-6);

    // Risk accounting balanced back to zero.
    assert_eq!(app.risk.open_positions(), 0);
    assert!((app.risk.daily_pnl() - 0.135).abs() < 1e-6);
}

#[tokio::test]
async fn test_settlement_win_closes_without_sell() {
    let (app, venue) = build_app().await;

    let signal = enter_signal("mkt-win", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();
    let execution_id = app.executions.get_open().await.unwrap()[0].id;

    venue.script_prices("T1", &[0.995]);
    app.monitor.tick().await;

    let execution = app.executions.get(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Closed);
    assert_eq!(execution.close_reason.as_deref(), Some("SETTLED_WIN"));
    // 2 shares from 0.50 to 0.995.
    assert!((execution.pnl_usd.unwrap() - 0.99).abs() < 1e-6);

    // Settlement pays out by itself: no SELL order reached the venue.
    assert!(venue.sell_orders().is_empty());
    assert_eq!(app.monitor.open_count().await, 0);
    assert!((app.risk.daily_pnl() - 0.99).abs() < 1e-6);
}

#[tokio::test]
async fn test_stop_loss_closes_position() {
    let (app, venue) = build_app().await;

    let signal = enter_signal("mkt-sl", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();
    let execution_id = app.executions.get_open().await.unwrap()[0].id;

    // -22% <= -20%.
    venue.script_prices("T1", &[0.39]);
    app.monitor.tick().await;

    let execution = app.executions.get(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Closed);
    assert_eq!(execution.close_reason.as_deref(), Some("STOP_LOSS"));
    assert!(execution.pnl_usd.unwrap() < 0.0);
}

#[tokio::test]
async fn test_consecutive_price_failures_raise_unreachable() {
    let (app, venue) = build_app().await;

    let signal = enter_signal("mkt-dark", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();

    venue
        .fail_prices
        .store(true, std::sync::atomic::Ordering::SeqCst);
    app.monitor.tick().await;
    app.monitor.tick().await;

    let before = app
        .audit
        .query(&AuditFilter {
            event_type: Some("CLOB_UNREACHABLE".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(before.is_empty());

    app.monitor.tick().await;
    let after = app
        .audit
        .query(&AuditFilter {
            event_type: Some("CLOB_UNREACHABLE".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(after.len(), 1);

    // The position is still open; nothing was force-closed blind.
    assert_eq!(app.monitor.open_count().await, 1);
}

#[tokio::test]
async fn test_draining_completes_when_ledger_empties() {
    let (app, venue) = build_app().await;

    let signal = enter_signal("mkt-drain", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();

    app.control
        .set_state(polysignal::domain::control::BotState::Draining, "operator")
        .await
        .unwrap();

    // New admissions are refused while draining.
    let second = enter_signal("mkt-drain-2", Side::Up);
    app.bridge.handle_signal(&second).await.unwrap();
    assert_eq!(app.executions.get_open_count().await.unwrap(), 1);

    // The monitor keeps managing the existing position to settlement.
    venue.script_prices("T1", &[0.995]);
    app.monitor.tick().await;

    assert_eq!(app.monitor.open_count().await, 0);
    let (state, reason) = app.control.state_reason().await;
    assert_eq!(state, polysignal::domain::control::BotState::Paused);
    assert_eq!(reason, "drain_complete");
}
