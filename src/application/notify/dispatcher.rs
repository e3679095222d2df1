//! Notification dispatcher: fans events out to webhooks (via the durable
//! queue) and to email subscribers (priority-scored, throttled, with digest
//! overflow).
//!
//! Every public entry point swallows its own failures; notification
//! problems feed this component's bookkeeping, never the trading pipeline.

use crate::application::notify::priority::score_priority;
use crate::application::notify::throttle::{DigestEntry, ThrottleDecision, ThrottleRegistry};
use crate::domain::audit;
use crate::domain::notify::{Envelope, Priority};
use crate::domain::ports::EmailTransport;
use crate::domain::repositories::{
    AuditRepository, EmailPrefRepository, WebhookQueueRepository, WebhookRepository,
};
use crate::domain::signal::EnterSignal;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct NotificationDispatcher {
    webhooks: Arc<dyn WebhookRepository>,
    queue: Arc<dyn WebhookQueueRepository>,
    email_prefs: Arc<dyn EmailPrefRepository>,
    transport: Arc<dyn EmailTransport>,
    // Direct repository handle for delivery bookkeeping; delivery events are
    // not in the outbound mapping, so no fan-out recursion is possible.
    audit: Arc<dyn AuditRepository>,
    throttle: Mutex<ThrottleRegistry>,
}

impl NotificationDispatcher {
    pub fn new(
        webhooks: Arc<dyn WebhookRepository>,
        queue: Arc<dyn WebhookQueueRepository>,
        email_prefs: Arc<dyn EmailPrefRepository>,
        transport: Arc<dyn EmailTransport>,
        audit: Arc<dyn AuditRepository>,
    ) -> Arc<Self> {
        Arc::new(Self {
            webhooks,
            queue,
            email_prefs,
            transport,
            audit,
            throttle: Mutex::new(ThrottleRegistry::new()),
        })
    }

    /// Hook invoked by the audit log after a successful append of a mapped
    /// event type.
    pub async fn on_audit_event(
        &self,
        event: &str,
        data: Value,
        execution_id: Option<i64>,
        dry_run: bool,
    ) {
        self.fan_out_webhooks(event, &data, execution_id, dry_run).await;
        self.fan_out_email(event, &data, dry_run).await;
    }

    /// Per-signal notification with the common payload shape.
    pub async fn dispatch_signal(&self, event: &str, signal: &EnterSignal) {
        let data = json!({
            "question": signal.question,
            "category": signal.category,
            "side": signal.side.as_str(),
            "signal": signal.signal_id,
            "strength": signal.strength.as_str(),
            "edge": signal.edge(),
            "confidence": signal.confidence,
            "confidence_tier": signal.confidence_tier(),
            "model_up": signal.model_up,
            "price_up": signal.price_up,
            "price_down": signal.price_down,
            "kelly": signal.kelly,
            "settlement_left_min": signal.settlement_left_min,
        });
        self.fan_out_webhooks(event, &data, None, false).await;
        self.fan_out_email(event, &data, false).await;
    }

    /// Surface everything a subscriber missed while throttled.
    pub async fn flush_digest_queue(&self, owner: &str) -> Vec<DigestEntry> {
        let entries = self.throttle.lock().await.flush_digest_queue(owner);
        if entries.is_empty() {
            return entries;
        }
        let summary: Vec<String> = entries.iter().map(|e| e.event.clone()).collect();
        let body = format!(
            "Digest of {} queued alerts:\n{}",
            entries.len(),
            summary.join("\n")
        );
        if let Err(e) = self
            .transport
            .send(owner, "[PolySignal] Alert digest", &body)
            .await
        {
            warn!("Dispatcher: digest send to {} failed: {:#}", owner, e);
        }
        entries
    }

    async fn fan_out_webhooks(
        &self,
        event: &str,
        data: &Value,
        execution_id: Option<i64>,
        dry_run: bool,
    ) {
        let hooks = match self.webhooks.list_active().await {
            Ok(hooks) => hooks,
            Err(e) => {
                warn!("Dispatcher: could not list webhooks: {:#}", e);
                return;
            }
        };

        for hook in hooks {
            let envelope = Envelope::new(event, data.clone());
            let payload = match serde_json::to_value(&envelope) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Dispatcher: envelope encode failed: {:#}", e);
                    continue;
                }
            };
            match self.queue.enqueue(hook.id, event, &payload).await {
                Ok(delivery_id) => {
                    debug!(
                        "Dispatcher: queued {} for webhook {} (delivery {})",
                        event, hook.id, delivery_id
                    );
                    let _ = self
                        .audit
                        .append(
                            audit::WEBHOOK_QUEUED,
                            execution_id,
                            &json!({
                                "webhook_id": hook.id,
                                "event": event,
                                "status": "queued",
                            }),
                            dry_run,
                        )
                        .await;
                }
                Err(e) => warn!(
                    "Dispatcher: enqueue for webhook {} failed: {:#}",
                    hook.id, e
                ),
            }
        }
    }

    async fn fan_out_email(&self, event: &str, data: &Value, dry_run: bool) {
        let prefs = match self.email_prefs.all_enabled().await {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("Dispatcher: could not list email prefs: {:#}", e);
                return;
            }
        };
        if prefs.is_empty() {
            return;
        }

        let priority = score_priority(event, data);
        let confidence = data.get("confidence").and_then(Value::as_f64);
        let category = data.get("category").and_then(Value::as_str);

        for pref in prefs {
            if let Some(confidence) = confidence
                && confidence < pref.min_confidence
            {
                continue;
            }
            if let Some(category) = category
                && !pref.accepts_category(category)
            {
                continue;
            }

            let now = Utc::now();
            let decision = self.throttle.lock().await.decide(
                &pref.owner_email,
                priority,
                pref.max_alerts_per_hour,
                now,
            );

            match decision {
                ThrottleDecision::Send => {
                    self.send_email(&pref.owner_email, event, data, priority, dry_run)
                        .await;
                }
                ThrottleDecision::Digest => {
                    let kept = self.throttle.lock().await.queue_digest(
                        &pref.owner_email,
                        DigestEntry {
                            event: event.to_string(),
                            data: data.clone(),
                            priority,
                            queued_at: now,
                        },
                        now,
                    );
                    if kept {
                        let _ = self
                            .audit
                            .append(
                                audit::EMAIL_DIGEST_QUEUED,
                                None,
                                &json!({
                                    "to": pref.owner_email,
                                    "event": event,
                                    "priority": priority.as_str(),
                                }),
                                dry_run,
                            )
                            .await;
                    }
                }
            }
        }
    }

    async fn send_email(
        &self,
        to: &str,
        event: &str,
        data: &Value,
        priority: Priority,
        dry_run: bool,
    ) {
        let subject = format!("[PolySignal] {} ({})", event, priority.as_str());
        let body = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());

        match self.transport.send(to, &subject, &body).await {
            Ok(()) => {
                self.throttle.lock().await.record_send(to, Utc::now());
                let _ = self
                    .audit
                    .append(
                        audit::EMAIL_DELIVERED,
                        None,
                        &json!({
                            "to": to,
                            "event": event,
                            "priority": priority.as_str(),
                        }),
                        dry_run,
                    )
                    .await;
            }
            Err(e) => {
                warn!("Dispatcher: email to {} failed: {:#}", to, e);
                let _ = self
                    .audit
                    .append(
                        audit::EMAIL_FAILED,
                        None,
                        &json!({
                            "to": to,
                            "event": event,
                            "error": e.to_string(),
                        }),
                        dry_run,
                    )
                    .await;
            }
        }
    }
}
