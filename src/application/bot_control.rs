//! Coarse run-state machine, persisted as the `bot_control` singleton row.

use crate::application::audit_log::{AuditAttrs, AuditLog};
use crate::application::events::{BotEvent, EventBus};
use crate::domain::audit;
use crate::domain::control::BotState;
use crate::domain::repositories::ControlRepository;
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const REASON_DRAIN_COMPLETE: &str = "drain_complete";
pub const REASON_CIRCUIT_BREAKER: &str = "circuit_breaker";

pub struct BotControl {
    repo: Arc<dyn ControlRepository>,
    audit: Arc<AuditLog>,
    events: EventBus,
    state: RwLock<(BotState, String)>,
}

impl BotControl {
    /// Load the persisted state, defaulting a fresh install to `running`.
    pub async fn load(
        repo: Arc<dyn ControlRepository>,
        audit: Arc<AuditLog>,
        events: EventBus,
    ) -> Result<Arc<Self>> {
        let (state, reason) = match repo.load().await? {
            Some(row) => (row.state, row.reason),
            None => {
                repo.save(BotState::Running.as_str(), "startup").await?;
                (BotState::Running, "startup".to_string())
            }
        };
        info!("BotControl: state is {} ({})", state.as_str(), reason);

        Ok(Arc::new(Self {
            repo,
            audit,
            events,
            state: RwLock::new((state, reason)),
        }))
    }

    pub async fn state(&self) -> BotState {
        self.state.read().await.0
    }

    pub async fn state_reason(&self) -> (BotState, String) {
        let guard = self.state.read().await;
        (guard.0, guard.1.clone())
    }

    pub async fn admits_new_trades(&self) -> bool {
        self.state().await.admits_new_trades()
    }

    pub async fn monitor_active(&self) -> bool {
        self.state().await.monitor_active()
    }

    pub async fn set_state(&self, to: BotState, reason: &str) -> Result<()> {
        let from = {
            let mut guard = self.state.write().await;
            let from = guard.0;
            if from == to {
                return Ok(());
            }
            *guard = (to, reason.to_string());
            from
        };

        self.repo.save(to.as_str(), reason).await?;
        info!(
            "BotControl: {} -> {} ({})",
            from.as_str(),
            to.as_str(),
            reason
        );

        self.audit
            .log(
                audit::BOT_STATE_CHANGE,
                AuditAttrs::detail(json!({
                    "from": from.as_str(),
                    "to": to.as_str(),
                    "reason": reason,
                })),
            )
            .await;
        self.events.publish(BotEvent::StateChanged {
            state: to,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Called by the settlement monitor after every full close. Draining
    /// completes when the open ledger hits zero.
    pub async fn on_drain_progress(&self, open_count: usize) {
        if open_count == 0 && self.state().await == BotState::Draining {
            if let Err(e) = self
                .set_state(BotState::Paused, REASON_DRAIN_COMPLETE)
                .await
            {
                warn!("BotControl: failed to complete drain: {:#}", e);
            }
        }
    }
}
