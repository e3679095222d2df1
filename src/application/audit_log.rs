//! Durable audit log with reconciliation and auto-repair.
//!
//! Appends are infallible from the caller's point of view: auditing must
//! never break the trading pipeline, so failures are logged and swallowed.
//! After each successful append the notification dispatcher hook fires for
//! the bounded set of outbound-mapped event types.

use crate::domain::audit::{self, AuditEvent, AuditFilter, outbound_event};
use crate::domain::repositories::{AuditRepository, ExecutionRepository};
use crate::application::notify::dispatcher::NotificationDispatcher;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

/// Open executions whose last audit event is older than this are flagged by
/// reconciliation.
const STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, Default)]
pub struct AuditAttrs {
    pub execution_id: Option<i64>,
    pub detail: Value,
    pub dry_run: bool,
}

impl AuditAttrs {
    pub fn for_execution(execution_id: i64, detail: Value, dry_run: bool) -> Self {
        Self {
            execution_id: Some(execution_id),
            detail,
            dry_run,
        }
    }

    pub fn detail(detail: Value) -> Self {
        Self {
            execution_id: None,
            detail,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileFinding {
    pub execution_id: i64,
    pub market_id: String,
    pub age_hours: f64,
}

pub struct AuditLog {
    repo: Arc<dyn AuditRepository>,
    executions: Arc<dyn ExecutionRepository>,
    // Set after construction; the dispatcher is built later in the wiring.
    notifier: RwLock<Option<Arc<NotificationDispatcher>>>,
}

impl AuditLog {
    pub fn new(repo: Arc<dyn AuditRepository>, executions: Arc<dyn ExecutionRepository>) -> Self {
        Self {
            repo,
            executions,
            notifier: RwLock::new(None),
        }
    }

    pub fn set_notifier(&self, dispatcher: Arc<NotificationDispatcher>) {
        if let Ok(mut guard) = self.notifier.write() {
            *guard = Some(dispatcher);
        }
    }

    /// Append an event. Never returns an error; a failed append is an
    /// operational problem, not a trading one.
    pub async fn log(&self, event_type: &str, attrs: AuditAttrs) {
        match self
            .repo
            .append(event_type, attrs.execution_id, &attrs.detail, attrs.dry_run)
            .await
        {
            Ok(_) => {
                if let Some(outbound) = outbound_event(event_type) {
                    let dispatcher = self
                        .notifier
                        .read()
                        .ok()
                        .and_then(|guard| guard.clone());
                    if let Some(dispatcher) = dispatcher {
                        dispatcher
                            .on_audit_event(outbound, attrs.detail, attrs.execution_id, attrs.dry_run)
                            .await;
                    }
                }
            }
            Err(e) => {
                error!("AuditLog: failed to append {}: {:#}", event_type, e);
            }
        }
    }

    pub async fn query(&self, filter: &AuditFilter) -> anyhow::Result<Vec<AuditEvent>> {
        self.repo.query(filter).await
    }

    /// Event counts per type over the trailing window.
    pub async fn summary(&self, days: i64) -> anyhow::Result<Vec<(String, i64)>> {
        self.repo.counts_since(Utc::now() - Duration::days(days)).await
    }

    pub async fn execution_trail(&self, execution_id: i64) -> anyhow::Result<Vec<AuditEvent>> {
        self.repo.trail(execution_id).await
    }

    /// Compare every open execution's age against its last audit event and
    /// flag positions nothing has touched for 24 h.
    pub async fn reconcile(&self) -> anyhow::Result<Vec<ReconcileFinding>> {
        let open = self.executions.get_open().await?;
        let now = Utc::now();
        let mut findings = Vec::new();

        for execution in open {
            let last_seen = self
                .repo
                .last_event_for_execution(execution.id)
                .await?
                .map(|e| e.created_at)
                .unwrap_or(execution.opened_at);
            let age = now - last_seen;
            if age > Duration::hours(STALE_AFTER_HOURS) {
                let age_hours = age.num_minutes() as f64 / 60.0;
                warn!(
                    "AuditLog: execution {} on {} is stale ({:.1}h since last event)",
                    execution.id, execution.market_id, age_hours
                );
                self.log(
                    audit::STALE_POSITION,
                    AuditAttrs::for_execution(
                        execution.id,
                        json!({
                            "market_id": execution.market_id,
                            "age_hours": age_hours,
                            "flag": "stale_position",
                        }),
                        execution.dry_run,
                    ),
                )
                .await;
                findings.push(ReconcileFinding {
                    execution_id: execution.id,
                    market_id: execution.market_id,
                    age_hours,
                });
            }
        }
        Ok(findings)
    }

    /// Cancel any execution still open after `max_age_hours`; the position
    /// was lost track of and must not pin risk counters forever.
    pub async fn auto_repair(&self, max_age_hours: i64) -> anyhow::Result<u64> {
        let stale = self.executions.stale_open(max_age_hours).await?;
        let mut repaired = 0u64;

        for execution in stale {
            self.executions
                .cancel(execution.id, "auto_repair_stale")
                .await?;
            info!(
                "AuditLog: auto-repaired stale execution {} on {} (opened {})",
                execution.id, execution.market_id, execution.opened_at
            );
            self.log(
                audit::POSITION_AUTO_REPAIRED,
                AuditAttrs::for_execution(
                    execution.id,
                    json!({
                        "market_id": execution.market_id,
                        "opened_at": execution.opened_at.to_rfc3339(),
                        "max_age_hours": max_age_hours,
                        "reason": "auto_repair_stale",
                    }),
                    execution.dry_run,
                ),
            )
            .await;
            repaired += 1;
        }
        Ok(repaired)
    }
}
