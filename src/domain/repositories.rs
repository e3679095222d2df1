//! Repository traits over the persistent store. One implementation per
//! trait lives in `infrastructure::persistence::repositories`; components
//! hold `Arc<dyn ...>` handles so tests can substitute fakes.

use crate::domain::audit::{AuditEvent, AuditFilter};
use crate::domain::control::ControlRow;
use crate::domain::decisions::{DecisionRecord, GateStat, NewDecision};
use crate::domain::notify::{EmailPref, QueuedDelivery, Webhook};
use crate::domain::settings::ConfigRow;
use crate::domain::trading::types::{Execution, NewExecution};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn insert(&self, new: &NewExecution) -> Result<i64>;
    async fn get(&self, id: i64) -> Result<Option<Execution>>;
    async fn get_open(&self) -> Result<Vec<Execution>>;
    async fn get_by_signal(&self, signal_id: &str) -> Result<Vec<Execution>>;
    async fn open_count(&self) -> Result<i64>;
    async fn has_open_on_market(&self, market_id: &str) -> Result<bool>;
    /// Most recent `opened_at` over any execution on the market, regardless
    /// of status; drives the cooldown gate.
    async fn last_trade_on_market(&self, market_id: &str) -> Result<Option<DateTime<Utc>>>;
    /// open -> closed with full exit accounting.
    async fn close(
        &self,
        id: i64,
        exit_price: f64,
        pnl_usd: f64,
        pnl_pct: f64,
        close_reason: &str,
    ) -> Result<()>;
    /// open -> failed with the error recorded.
    async fn fail(&self, id: i64, error: &str) -> Result<()>;
    /// open -> cancelled.
    async fn cancel(&self, id: i64, reason: &str) -> Result<()>;
    /// Cancel every open execution; returns how many rows changed.
    async fn cancel_all_open(&self, reason: &str) -> Result<u64>;
    async fn set_order_id(&self, id: i64, order_id: &str) -> Result<()>;
    async fn set_fill(&self, id: i64, fill_price: f64, slippage_bps: f64) -> Result<()>;
    /// Open executions older than the given number of hours.
    async fn stale_open(&self, older_than_hours: i64) -> Result<Vec<Execution>>;
    /// Sum of realized P&L over executions closed since the given instant;
    /// restores the daily counter across restarts.
    async fn pnl_realized_since(&self, since: DateTime<Utc>) -> Result<f64>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(
        &self,
        event_type: &str,
        execution_id: Option<i64>,
        detail: &serde_json::Value,
        dry_run: bool,
    ) -> Result<i64>;
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>>;
    /// Event counts per type over the trailing window.
    async fn counts_since(&self, since: DateTime<Utc>) -> Result<Vec<(String, i64)>>;
    async fn trail(&self, execution_id: i64) -> Result<Vec<AuditEvent>>;
    async fn last_event_for_execution(&self, execution_id: i64) -> Result<Option<AuditEvent>>;
}

#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn insert(&self, decision: &NewDecision) -> Result<i64>;
    async fn recent(&self, limit: i64) -> Result<Vec<DecisionRecord>>;
    async fn near_misses(&self, days: i64, limit: i64) -> Result<Vec<DecisionRecord>>;
    /// Per-gate block counts plus (total, blocked) over the window.
    async fn gate_stats(&self, days: i64) -> Result<(i64, i64, Vec<GateStat>)>;
}

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn load_all(&self) -> Result<Vec<ConfigRow>>;
    /// Upsert the batch in a single transaction.
    async fn upsert_many(&self, changes: &[(String, f64)], actor: &str) -> Result<()>;
}

#[async_trait]
pub trait ControlRepository: Send + Sync {
    async fn load(&self) -> Result<Option<ControlRow>>;
    async fn save(&self, state: &str, reason: &str) -> Result<()>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Enforces the 5-webhooks-per-owner cap.
    async fn create(&self, owner_email: &str, url: &str, name: &str) -> Result<Webhook>;
    async fn list_active(&self) -> Result<Vec<Webhook>>;
    async fn list_for_owner(&self, owner_email: &str) -> Result<Vec<Webhook>>;
    async fn get(&self, id: i64) -> Result<Option<Webhook>>;
    /// Bumps `success_count`, resets the consecutive-failure counter and
    /// clears `last_error`.
    async fn record_success(&self, id: i64) -> Result<()>;
    /// Bumps the consecutive-failure counter and stores the error; returns
    /// `true` when the row crossed the deactivation threshold.
    async fn record_failure(&self, id: i64, error: &str) -> Result<bool>;
    async fn set_active(&self, id: i64, active: bool) -> Result<()>;
}

#[async_trait]
pub trait EmailPrefRepository: Send + Sync {
    async fn upsert(&self, pref: &EmailPref) -> Result<()>;
    async fn get(&self, owner_email: &str) -> Result<Option<EmailPref>>;
    async fn all_enabled(&self) -> Result<Vec<EmailPref>>;
}

#[async_trait]
pub trait WebhookQueueRepository: Send + Sync {
    async fn enqueue(&self, webhook_id: i64, event: &str, payload: &serde_json::Value)
    -> Result<i64>;
    /// Oldest queued rows first.
    async fn next_batch(&self, limit: i64) -> Result<Vec<QueuedDelivery>>;
    async fn mark_delivered(&self, id: i64) -> Result<()>;
    async fn mark_failed(&self, id: i64, error: &str) -> Result<()>;
    async fn queued_count(&self) -> Result<i64>;
}
