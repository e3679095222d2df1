//! Dispatcher, webhook queue and throttle behavior against the real store.

mod common;

use common::{MockVenue, RecordingEmail, enter_signal, test_settings};
use polysignal::application::notify::webhook_worker::WebhookWorker;
use polysignal::application::system::Application;
use polysignal::domain::notify::EmailPref;
use polysignal::domain::repositories::{
    EmailPrefRepository, WebhookQueueRepository, WebhookRepository,
};
use polysignal::domain::trading::types::Side;
use polysignal::infrastructure::persistence::repositories::{
    SqliteEmailPrefRepository, SqliteWebhookQueueRepository, SqliteWebhookRepository,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn build_app() -> (Application, Arc<MockVenue>, Arc<RecordingEmail>) {
    let venue = Arc::new(MockVenue::new());
    let email = Arc::new(RecordingEmail::default());
    let app = Application::build_with_ports(test_settings(), venue.clone(), email.clone())
        .await
        .expect("application builds");
    (app, venue, email)
}

#[tokio::test]
async fn test_position_opened_fans_out_to_webhook_queue() {
    let (app, _venue, _email) = build_app().await;
    let webhooks = SqliteWebhookRepository::new(app.database.clone());
    let queue = SqliteWebhookQueueRepository::new(app.database.clone());

    webhooks
        .create("ops@example.com", "http://127.0.0.1:1/hook", "ops")
        .await
        .unwrap();

    let signal = enter_signal("mkt-hook", Side::Up);
    app.bridge.handle_signal(&signal).await.unwrap();

    // POSITION_OPENED maps to trade.opened and lands on the durable queue.
    assert_eq!(queue.queued_count().await.unwrap(), 1);
    let batch = queue.next_batch(10).await.unwrap();
    assert_eq!(batch[0].event, "trade.opened");
    assert_eq!(batch[0].payload["event"], json!("trade.opened"));
    assert!(batch[0].payload["data"]["market_id"].is_string());
}

#[tokio::test]
async fn test_webhook_deactivated_after_ten_consecutive_failures() {
    let (app, _venue, _email) = build_app().await;
    let webhooks = SqliteWebhookRepository::new(app.database.clone());
    let queue = SqliteWebhookQueueRepository::new(app.database.clone());

    // Port 1 refuses connections, so every delivery attempt fails fast.
    let hook = webhooks
        .create("ops@example.com", "http://127.0.0.1:1/hook", "dead")
        .await
        .unwrap();
    for _ in 0..10 {
        queue
            .enqueue(hook.id, "trade.opened", &json!({"event": "trade.opened"}))
            .await
            .unwrap();
    }

    let worker = WebhookWorker::new(
        Arc::new(SqliteWebhookQueueRepository::new(app.database.clone())),
        Arc::new(SqliteWebhookRepository::new(app.database.clone())),
        Duration::from_secs(3600),
    );
    worker.drain_batch().await;

    let hook = webhooks.get(hook.id).await.unwrap().unwrap();
    assert!(!hook.active);
    assert_eq!(hook.fail_count, 10);
    assert!(hook.last_error.is_some());
    assert_eq!(queue.queued_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_success_resets_consecutive_failures() {
    let (app, _venue, _email) = build_app().await;
    let webhooks = SqliteWebhookRepository::new(app.database.clone());

    let hook = webhooks
        .create("ops@example.com", "http://127.0.0.1:1/hook", "flaky")
        .await
        .unwrap();
    for _ in 0..9 {
        let deactivated = webhooks.record_failure(hook.id, "HTTP 500").await.unwrap();
        assert!(!deactivated);
    }
    webhooks.record_success(hook.id).await.unwrap();

    let hook = webhooks.get(hook.id).await.unwrap().unwrap();
    assert!(hook.active);
    assert_eq!(hook.fail_count, 0);
    assert_eq!(hook.success_count, 1);
    assert!(hook.last_error.is_none());
}

#[tokio::test]
async fn test_webhook_cap_per_owner() {
    let (app, _venue, _email) = build_app().await;
    let webhooks = SqliteWebhookRepository::new(app.database.clone());

    for i in 0..5 {
        webhooks
            .create("ops@example.com", &format!("http://h/{}", i), "h")
            .await
            .unwrap();
    }
    assert!(
        webhooks
            .create("ops@example.com", "http://h/6", "h")
            .await
            .is_err()
    );
    assert_eq!(webhooks.list_for_owner("ops@example.com").await.unwrap().len(), 5);
    // A different owner is unaffected.
    assert!(
        webhooks
            .create("other@example.com", "http://h/1", "h")
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_dispatch_signal_payload_shape() {
    let (app, _venue, email) = build_app().await;
    let webhooks = SqliteWebhookRepository::new(app.database.clone());
    let queue = SqliteWebhookQueueRepository::new(app.database.clone());
    let prefs = SqliteEmailPrefRepository::new(app.database.clone());

    webhooks
        .create("ops@example.com", "http://127.0.0.1:1/hook", "ops")
        .await
        .unwrap();
    prefs
        .upsert(&EmailPref {
            owner_email: "ops@example.com".to_string(),
            alerts_enabled: true,
            min_confidence: 0.0,
            categories: vec![],
            max_alerts_per_hour: 10,
        })
        .await
        .unwrap();
    assert!(prefs.get("ops@example.com").await.unwrap().is_some());

    let signal = enter_signal("mkt-sig", Side::Up);
    app.dispatcher.dispatch_signal("signal.entered", &signal).await;

    let batch = queue.next_batch(10).await.unwrap();
    assert_eq!(batch.len(), 1);
    let data = &batch[0].payload["data"];
    assert_eq!(data["category"], json!("crypto"));
    assert_eq!(data["side"], json!("UP"));
    assert_eq!(data["strength"], json!("STRONG"));
    assert_eq!(data["confidence_tier"], json!("medium"));
    assert!(data["edge"].is_number());
    assert!(data["kelly"].is_number());
    assert!(data["settlement_left_min"].is_number());

    // edge 0.12 with confidence 75 scores medium -> sent within budget.
    assert_eq!(email.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_email_throttle_and_digest() {
    let (app, _venue, email) = build_app().await;
    let prefs = SqliteEmailPrefRepository::new(app.database.clone());
    prefs
        .upsert(&EmailPref {
            owner_email: "trader@example.com".to_string(),
            alerts_enabled: true,
            min_confidence: 0.0,
            categories: vec![],
            max_alerts_per_hour: 1,
        })
        .await
        .unwrap();

    // Two medium-priority events against a limit of 1/hour.
    let data = json!({"market_id": "m", "amount_usd": 1.0});
    app.dispatcher
        .on_audit_event("trade.opened", data.clone(), None, true)
        .await;
    app.dispatcher
        .on_audit_event("trade.opened", data.clone(), None, true)
        .await;
    assert_eq!(email.sent.lock().unwrap().len(), 1);

    // Critical bypasses the throttle.
    app.dispatcher
        .on_audit_event("risk.circuit_breaker", json!({}), None, false)
        .await;
    assert_eq!(email.sent.lock().unwrap().len(), 2);

    // The over-limit alert is waiting in the digest.
    let digest = app.dispatcher.flush_digest_queue("trader@example.com").await;
    assert_eq!(digest.len(), 1);
    assert_eq!(digest[0].event, "trade.opened");
    // Flushing emailed the digest itself.
    assert_eq!(email.sent.lock().unwrap().len(), 3);
    assert!(
        app.dispatcher
            .flush_digest_queue("trader@example.com")
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn test_email_filters_confidence_and_category() {
    let (app, _venue, email) = build_app().await;
    let prefs = SqliteEmailPrefRepository::new(app.database.clone());
    prefs
        .upsert(&EmailPref {
            owner_email: "picky@example.com".to_string(),
            alerts_enabled: true,
            min_confidence: 80.0,
            categories: vec!["politics".to_string()],
            max_alerts_per_hour: 100,
        })
        .await
        .unwrap();

    // Below min confidence.
    app.dispatcher
        .on_audit_event(
            "trade.opened",
            json!({"confidence": 50.0, "category": "politics"}),
            None,
            true,
        )
        .await;
    // Wrong category.
    app.dispatcher
        .on_audit_event(
            "trade.opened",
            json!({"confidence": 90.0, "category": "crypto"}),
            None,
            true,
        )
        .await;
    assert!(email.sent.lock().unwrap().is_empty());

    // Both filters pass.
    app.dispatcher
        .on_audit_event(
            "trade.opened",
            json!({"confidence": 90.0, "category": "politics"}),
            None,
            true,
        )
        .await;
    assert_eq!(email.sent.lock().unwrap().len(), 1);
}
