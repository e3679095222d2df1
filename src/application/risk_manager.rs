//! Risk manager: in-memory counters gating every trade.
//!
//! Counters are reconciled from the persistent store at startup, so
//! `open_positions` always mirrors `trade_executions WHERE status='open'`
//! across restarts. The daily realized P&L drives the circuit breaker.

use crate::application::audit_log::{AuditAttrs, AuditLog};
use crate::application::bot_control::{BotControl, REASON_CIRCUIT_BREAKER};
use crate::application::config_store::{ConfigStore, ExposureView};
use crate::application::events::{BotEvent, EventBus};
use crate::domain::audit;
use crate::domain::control::BotState;
use crate::domain::errors::BlockReason;
use crate::domain::repositories::ExecutionRepository;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Edge at which the linear sizer reaches the full `max_bet_usd`.
const FULL_SIZE_EDGE: f64 = 0.10;

#[derive(Debug, Clone, Default)]
struct RiskCounters {
    open_positions: usize,
    daily_pnl: f64,
    daily_date: Option<NaiveDate>,
    total_exposure_usd: f64,
    category_exposure: HashMap<String, f64>,
}

impl RiskCounters {
    /// Daily P&L rolls over on the UTC day boundary.
    fn roll_day(&mut self, today: NaiveDate) {
        if self.daily_date != Some(today) {
            self.daily_date = Some(today);
            self.daily_pnl = 0.0;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub allowed: bool,
    pub reason: Option<BlockReason>,
    pub detail: Option<String>,
}

impl RiskAssessment {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            detail: None,
        }
    }

    fn deny(reason: BlockReason, detail: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            detail: Some(detail.into()),
        }
    }
}

pub struct RiskManager {
    config: Arc<ConfigStore>,
    control: Arc<BotControl>,
    audit: Arc<AuditLog>,
    events: EventBus,
    counters: Mutex<RiskCounters>,
}

impl RiskManager {
    pub fn new(
        config: Arc<ConfigStore>,
        control: Arc<BotControl>,
        audit: Arc<AuditLog>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            control,
            audit,
            events,
            counters: Mutex::new(RiskCounters::default()),
        })
    }

    /// Rebuild counters from the store: open rows restore the position count
    /// and exposure, today's closed rows restore the daily P&L.
    pub async fn reconcile_from_store(&self, repo: &dyn ExecutionRepository) -> Result<()> {
        let open = repo.get_open().await?;
        let today = Utc::now().date_naive();
        let midnight = today
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists")
            .and_utc();
        let daily_pnl = repo.pnl_realized_since(midnight).await?;

        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.open_positions = open.len();
        counters.total_exposure_usd = open.iter().map(|e| e.amount_usd).sum();
        counters.category_exposure.clear();
        for execution in &open {
            *counters
                .category_exposure
                .entry(execution.category.clone())
                .or_insert(0.0) += execution.amount_usd;
        }
        counters.daily_date = Some(today);
        counters.daily_pnl = daily_pnl;

        info!(
            "RiskManager: reconciled from store - {} open, {:.2} exposure, {:.2} daily pnl",
            counters.open_positions, counters.total_exposure_usd, counters.daily_pnl
        );
        Ok(())
    }

    /// Gate check for one prospective trade of `amount_usd` in `category`.
    pub async fn can_trade(&self, category: &str, amount_usd: f64) -> RiskAssessment {
        let (state, state_reason) = self.control.state_reason().await;
        if !state.admits_new_trades() {
            // A breaker-paused bot reports the breaker, not the pause.
            if state_reason == REASON_CIRCUIT_BREAKER {
                return RiskAssessment::deny(BlockReason::CircuitBreaker, "circuit breaker tripped");
            }
            return RiskAssessment::deny(
                BlockReason::BotNotRunning,
                format!("bot state is {}", state.as_str()),
            );
        }

        let max_open = self.config.get("max_open_positions") as usize;
        let daily_limit = self.config.get("daily_loss_limit_usd");
        let max_exposure = self.config.get("max_total_exposure_usd");
        let max_category_pct = self.config.get("max_category_concentration_pct");

        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.roll_day(Utc::now().date_naive());

        if counters.open_positions >= max_open {
            return RiskAssessment::deny(
                BlockReason::RiskBlocked,
                format!("open positions {} >= max {}", counters.open_positions, max_open),
            );
        }

        if counters.daily_pnl <= -daily_limit {
            return RiskAssessment::deny(
                BlockReason::CircuitBreaker,
                format!(
                    "daily pnl {:.2} <= -{:.2}",
                    counters.daily_pnl, daily_limit
                ),
            );
        }

        if counters.total_exposure_usd >= max_exposure {
            return RiskAssessment::deny(
                BlockReason::RiskBlocked,
                format!(
                    "total exposure {:.2} >= max {:.2}",
                    counters.total_exposure_usd, max_exposure
                ),
            );
        }

        let category_after = counters.category_exposure.get(category).copied().unwrap_or(0.0)
            + amount_usd;
        let total_after = counters.total_exposure_usd + amount_usd;
        if total_after > 0.0 {
            let share_pct = category_after / total_after * 100.0;
            // A first position is always 100% of a tiny book; only enforce
            // concentration once more than one position could coexist.
            if counters.open_positions > 0 && share_pct > max_category_pct {
                return RiskAssessment::deny(
                    BlockReason::RiskBlocked,
                    format!(
                        "category '{}' share {:.1}% > max {:.1}%",
                        category, share_pct, max_category_pct
                    ),
                );
            }
        }

        RiskAssessment::allow()
    }

    /// Linear in edge, reaching `max_bet_usd` at 10 points of edge.
    pub fn get_bet_size(&self, edge: f64) -> f64 {
        let max_bet = self.config.get("max_bet_usd");
        max_bet * (edge.max(0.0) / FULL_SIZE_EDGE).clamp(0.0, 1.0)
    }

    pub fn record_trade_open(&self, category: &str, amount_usd: f64) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.open_positions += 1;
        counters.total_exposure_usd += amount_usd;
        *counters
            .category_exposure
            .entry(category.to_string())
            .or_insert(0.0) += amount_usd;
    }

    /// Balance the matching `record_trade_open` and bank realized P&L.
    /// Crossing the daily loss limit trips the circuit breaker.
    pub async fn record_trade_close(&self, category: &str, amount_usd: f64, pnl_usd: f64) {
        let daily_limit = self.config.get("daily_loss_limit_usd");
        let (crossed, daily_pnl) = {
            let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            counters.roll_day(Utc::now().date_naive());
            counters.open_positions = counters.open_positions.saturating_sub(1);
            counters.total_exposure_usd = (counters.total_exposure_usd - amount_usd).max(0.0);
            if let Some(exposure) = counters.category_exposure.get_mut(category) {
                *exposure = (*exposure - amount_usd).max(0.0);
            }
            let before = counters.daily_pnl;
            counters.daily_pnl += pnl_usd;
            let crossed = before > -daily_limit && counters.daily_pnl <= -daily_limit;
            (crossed, counters.daily_pnl)
        };

        if crossed {
            error!(
                "RiskManager: CIRCUIT BREAKER - daily pnl {:.2} breached limit -{:.2}",
                daily_pnl, daily_limit
            );
            self.audit
                .log(
                    audit::CIRCUIT_BREAKER,
                    AuditAttrs::detail(json!({
                        "daily_pnl": daily_pnl,
                        "daily_loss_limit_usd": daily_limit,
                    })),
                )
                .await;
            self.events.publish(BotEvent::CircuitBreaker { daily_pnl });
            if let Err(e) = self
                .control
                .set_state(BotState::Paused, REASON_CIRCUIT_BREAKER)
                .await
            {
                warn!("RiskManager: failed to pause bot after breaker: {:#}", e);
            }
        }
    }

    pub fn open_positions(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .open_positions
    }

    pub fn daily_pnl(&self) -> f64 {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .daily_pnl
    }

    pub fn total_exposure(&self) -> f64 {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_exposure_usd
    }
}

impl ExposureView for RiskManager {
    fn open_count(&self) -> usize {
        self.open_positions()
    }

    fn total_exposure_usd(&self) -> f64 {
        self.total_exposure()
    }
}
