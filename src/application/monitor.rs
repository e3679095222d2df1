//! Settlement monitor: the single periodic loop that watches every open
//! trade, applies the exit rule cascade and closes positions.

use crate::application::audit_log::{AuditAttrs, AuditLog};
use crate::application::bot_control::BotControl;
use crate::application::config_store::ConfigStore;
use crate::application::events::{BotEvent, EventBus};
use crate::application::execution_log::ExecutionLog;
use crate::application::lifecycle_store::LifecycleStore;
use crate::application::risk_manager::RiskManager;
use crate::domain::audit;
use crate::domain::ports::{ClobVenue, OrderRequest, OrderSide};
use crate::domain::trading::types::{CloseReason, OpenTrade};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

/// Mark at or above which a binary token is considered settled in.
const SETTLED_WIN_PRICE: f64 = 0.99;
const SETTLED_LOSS_PRICE: f64 = 0.01;
/// Below this notional a partial exit is not worth a venue round-trip; the
/// position closes in full instead.
const MIN_PARTIAL_NOTIONAL_USD: f64 = 0.10;
/// Consecutive all-fail ticks before the venue is declared unreachable.
const UNREACHABLE_AFTER_TICKS: u32 = 3;

/// Exit thresholds, snapshotted from the config store once per tick.
#[derive(Debug, Clone, Copy)]
pub struct ExitPolicy {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub trailing_stop_pct: f64,
    pub breakeven_trigger_pct: f64,
    pub max_hold_hours: f64,
}

impl ExitPolicy {
    pub fn from_config(config: &ConfigStore) -> Self {
        Self {
            take_profit_pct: config.get("take_profit_pct"),
            stop_loss_pct: config.get("stop_loss_pct"),
            trailing_stop_pct: config.get("trailing_stop_pct"),
            breakeven_trigger_pct: config.get("breakeven_trigger_pct"),
            max_hold_hours: config.get("max_hold_hours"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitAction {
    /// Close half the position at the current mark.
    PartialTakeProfit,
    Close(CloseReason),
}

/// Apply the exit cascade to one trade at the current mark. Mutates the
/// trade's tracking state (peak price, breakeven arming) and returns the
/// first matching action, if any.
pub fn evaluate_exit(
    trade: &mut OpenTrade,
    price: f64,
    policy: &ExitPolicy,
    now: DateTime<Utc>,
) -> Option<ExitAction> {
    if price > trade.highest_price {
        trade.highest_price = price;
    }

    let pnl_pct = trade.pnl_pct_at(price);
    let drawdown = trade.drawdown_from_peak_at(price);

    // Arming is a state change, not an exit; it survives whichever rule
    // fires later.
    if pnl_pct >= policy.breakeven_trigger_pct {
        trade.breakeven_armed = true;
    }

    // 1. Settlement
    if price >= SETTLED_WIN_PRICE {
        return Some(ExitAction::Close(CloseReason::SettledWin));
    }
    if price <= SETTLED_LOSS_PRICE {
        return Some(ExitAction::Close(CloseReason::SettledLoss));
    }

    // 2. First take-profit: scale out half, keep the rest running.
    if !trade.partial_exit_done && pnl_pct >= policy.take_profit_pct {
        let half_notional = trade.shares / 2.0 * price;
        if half_notional < MIN_PARTIAL_NOTIONAL_USD {
            return Some(ExitAction::Close(CloseReason::TakeProfit));
        }
        return Some(ExitAction::PartialTakeProfit);
    }

    // 3. Second take-profit on the remainder.
    if trade.partial_exit_done && pnl_pct >= 1.5 * policy.take_profit_pct {
        return Some(ExitAction::Close(CloseReason::TakeProfit2));
    }

    // 4. Stop loss
    if pnl_pct <= policy.stop_loss_pct {
        return Some(ExitAction::Close(CloseReason::StopLoss));
    }

    // 5. Trailing stop, only while in profit.
    if pnl_pct > 0.0 && drawdown >= policy.trailing_stop_pct {
        return Some(ExitAction::Close(CloseReason::TrailingStop));
    }

    // 6. Breakeven stop once armed.
    if trade.breakeven_armed && price <= trade.entry_price {
        return Some(ExitAction::Close(CloseReason::BreakevenStop));
    }

    // 7. Time stop
    if trade.hold_hours_at(now) >= policy.max_hold_hours {
        return Some(ExitAction::Close(CloseReason::MaxHoldTime));
    }

    None
}

pub struct SettlementMonitor {
    venue: Arc<dyn ClobVenue>,
    config: Arc<ConfigStore>,
    control: Arc<BotControl>,
    risk: Arc<RiskManager>,
    executions: Arc<ExecutionLog>,
    lifecycle: Arc<LifecycleStore>,
    audit: Arc<AuditLog>,
    events: EventBus,
    ledger: Mutex<HashMap<i64, OpenTrade>>,
    live: bool,
    interval_secs: u64,
    running: AtomicBool,
    consecutive_failed_ticks: AtomicU32,
}

impl SettlementMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue: Arc<dyn ClobVenue>,
        config: Arc<ConfigStore>,
        control: Arc<BotControl>,
        risk: Arc<RiskManager>,
        executions: Arc<ExecutionLog>,
        lifecycle: Arc<LifecycleStore>,
        audit: Arc<AuditLog>,
        events: EventBus,
        live: bool,
        interval_secs: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            venue,
            config,
            control,
            risk,
            executions,
            lifecycle,
            audit,
            events,
            ledger: Mutex::new(HashMap::new()),
            live,
            interval_secs,
            running: AtomicBool::new(false),
            consecutive_failed_ticks: AtomicU32::new(0),
        })
    }

    /// Rebuild the in-memory ledger from `trade_executions WHERE
    /// status='open'`. Peak tracking and partial-exit flags restart fresh;
    /// the durable row is the accounting authority.
    pub async fn rehydrate(&self) -> Result<usize> {
        let open = self.executions.get_open().await?;
        let mut ledger = self.ledger.lock().await;
        ledger.clear();
        for execution in &open {
            let entry_price = execution.fill_price.unwrap_or(execution.entry_price);
            let shares = if entry_price > 0.0 {
                execution.amount_usd / entry_price
            } else {
                0.0
            };
            ledger.insert(
                execution.id,
                OpenTrade {
                    execution_id: execution.id,
                    position_id: format!("rehydrated-{}", execution.id),
                    signal_id: execution.signal_id.clone(),
                    market_id: execution.market_id.clone(),
                    token_id: execution.token_id.clone(),
                    side: execution.side,
                    entry_price,
                    shares,
                    initial_amount_usd: execution.amount_usd,
                    category: execution.category.clone(),
                    dry_run: execution.dry_run,
                    opened_at: execution.opened_at,
                    highest_price: entry_price,
                    partial_exit_done: false,
                    breakeven_armed: false,
                    realized_pnl: 0.0,
                },
            );
        }
        info!("SettlementMonitor: rehydrated {} open trades", ledger.len());
        Ok(ledger.len())
    }

    pub async fn register(&self, trade: OpenTrade) {
        info!(
            "SettlementMonitor: tracking execution {} on {} ({} @ {:.4})",
            trade.execution_id,
            trade.market_id,
            trade.side.as_str(),
            trade.entry_price
        );
        self.ledger.lock().await.insert(trade.execution_id, trade);
    }

    pub async fn open_count(&self) -> usize {
        self.ledger.lock().await.len()
    }

    pub async fn get_trade(&self, execution_id: i64) -> Option<OpenTrade> {
        self.ledger.lock().await.get(&execution_id).cloned()
    }

    /// Idempotent start; a second call while running is a no-op.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let monitor = Arc::clone(self);
        let mut shutdown = shutdown;
        tokio::spawn(async move {
            info!(
                "SettlementMonitor: started ({}s interval)",
                monitor.interval_secs
            );
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(monitor.interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !monitor.running.load(Ordering::SeqCst) {
                            break;
                        }
                        monitor.tick().await;
                    }
                    _ = shutdown.changed() => {
                        break;
                    }
                }
            }
            monitor.running.store(false, Ordering::SeqCst);
            info!("SettlementMonitor: stopped");
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn tick(&self) {
        if !self.control.monitor_active().await {
            return;
        }

        // The monitor is the process heartbeat; lifecycle housekeeping rides
        // on its tick.
        for position_id in self.lifecycle.sweep_expired_pending() {
            warn!("SettlementMonitor: pending position {} auto-cancelled", position_id);
        }
        self.lifecycle.gc_terminal();

        let ids: Vec<i64> = self.ledger.lock().await.keys().copied().collect();
        if ids.is_empty() {
            // A restart into draining with nothing open must still complete
            // the drain.
            self.control.on_drain_progress(0).await;
            return;
        }

        let policy = ExitPolicy::from_config(&self.config);
        let now = Utc::now();
        let mut any_price_ok = false;

        for execution_id in ids {
            let token_id = match self.ledger.lock().await.get(&execution_id) {
                Some(trade) => trade.token_id.clone(),
                None => continue,
            };

            // The HTTP layer already retries 5xx/429 up to three times.
            let price = match self.venue.mark_price(&token_id).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(
                        "SettlementMonitor: price fetch failed for {}: {}",
                        token_id, e
                    );
                    continue;
                }
            };
            any_price_ok = true;

            let action = {
                let mut ledger = self.ledger.lock().await;
                match ledger.get_mut(&execution_id) {
                    Some(trade) => evaluate_exit(trade, price, &policy, now),
                    None => continue,
                }
            };

            match action {
                Some(ExitAction::PartialTakeProfit) => {
                    self.do_partial_exit(execution_id, price).await;
                }
                Some(ExitAction::Close(reason)) => {
                    self.do_close(execution_id, price, reason).await;
                }
                None => {}
            }
        }

        if any_price_ok {
            self.consecutive_failed_ticks.store(0, Ordering::SeqCst);
        } else {
            let failed = self.consecutive_failed_ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if failed == UNREACHABLE_AFTER_TICKS {
                error!(
                    "SettlementMonitor: all price fetches failed for {} consecutive ticks",
                    failed
                );
                self.audit
                    .log(
                        audit::CLOB_UNREACHABLE,
                        AuditAttrs::detail(json!({ "consecutive_ticks": failed })),
                    )
                    .await;
            }
        }
    }

    /// First take-profit: close half at the mark, bank the P&L, arm the
    /// breakeven stop, keep the remainder running.
    async fn do_partial_exit(&self, execution_id: i64, price: f64) {
        let snapshot = {
            let mut ledger = self.ledger.lock().await;
            let Some(trade) = ledger.get_mut(&execution_id) else {
                return;
            };
            let half = trade.shares / 2.0;
            let realized = (price - trade.entry_price) * half;
            trade.shares -= half;
            trade.realized_pnl += realized;
            trade.partial_exit_done = true;
            trade.breakeven_armed = true;
            (trade.clone(), half, realized)
        };
        let (trade, half_shares, realized) = snapshot;

        info!(
            "SettlementMonitor: partial exit on execution {} - {:.2} shares @ {:.4} ({:+.2} USD)",
            execution_id, half_shares, price, realized
        );

        self.lifecycle.partial_exit(
            &trade.position_id,
            trade.side.yes_price(price),
            half_shares,
        );

        if self.live && !trade.dry_run {
            self.place_exit_order(&trade, price, half_shares).await;
        }

        self.audit
            .log(
                audit::PARTIAL_EXIT,
                AuditAttrs::for_execution(
                    execution_id,
                    json!({
                        "market_id": trade.market_id,
                        "exit_price": price,
                        "shares_closed": half_shares,
                        "pnl_usd": realized,
                        "amount_usd": trade.initial_amount_usd,
                        "breakeven_armed": true,
                    }),
                    trade.dry_run,
                ),
            )
            .await;
    }

    async fn do_close(&self, execution_id: i64, price: f64, reason: CloseReason) {
        let Some(trade) = self.ledger.lock().await.remove(&execution_id) else {
            return;
        };

        let remaining_pnl = (price - trade.entry_price) * trade.shares;
        let pnl_usd = trade.realized_pnl + remaining_pnl;
        let pnl_pct = if trade.initial_amount_usd > 0.0 {
            pnl_usd / trade.initial_amount_usd * 100.0
        } else {
            0.0
        };

        info!(
            "SettlementMonitor: closing execution {} on {} - {} @ {:.4} ({:+.2} USD / {:+.1}%)",
            execution_id,
            trade.market_id,
            reason.as_str(),
            price,
            pnl_usd,
            pnl_pct
        );

        self.risk
            .record_trade_close(&trade.category, trade.initial_amount_usd, pnl_usd)
            .await;

        if let Err(e) = self
            .executions
            .close_execution(execution_id, price, pnl_usd, pnl_pct, reason.as_str())
            .await
        {
            error!(
                "SettlementMonitor: failed to persist close of {}: {:#}",
                execution_id, e
            );
        }

        // Settlement pays out by itself; only live exits before resolution
        // need a SELL on the book.
        if self.live && !trade.dry_run && !reason.is_settlement() && trade.shares > 0.0 {
            self.place_exit_order(&trade, price, trade.shares).await;
        }

        self.lifecycle.close(
            &trade.position_id,
            trade.side.yes_price(price),
            reason.as_str(),
        );

        self.audit
            .log(
                audit::POSITION_CLOSED,
                AuditAttrs::for_execution(
                    execution_id,
                    json!({
                        "market_id": trade.market_id,
                        "reason": reason.as_str(),
                        "exit_price": price,
                        "pnl_usd": pnl_usd,
                        "pnl_pct": pnl_pct,
                        "amount_usd": trade.initial_amount_usd,
                    }),
                    trade.dry_run,
                ),
            )
            .await;

        self.events.publish(BotEvent::PositionClosed {
            execution_id,
            reason: reason.as_str().to_string(),
            pnl_usd,
        });

        let remaining = self.open_count().await;
        self.control.on_drain_progress(remaining).await;
    }

    /// Best-effort SELL at the mark; a failed exit order is audited and the
    /// close stands.
    async fn place_exit_order(&self, trade: &OpenTrade, price: f64, shares: f64) {
        let request = OrderRequest {
            token_id: trade.token_id.clone(),
            side: OrderSide::Sell,
            price,
            size: shares,
        };
        match self.venue.place_order(&request).await {
            Ok(order) => {
                info!(
                    "SettlementMonitor: SELL {} x {:.2} placed ({})",
                    trade.token_id, shares, order.order_id
                );
            }
            Err(e) => {
                warn!(
                    "SettlementMonitor: SELL for execution {} failed: {}",
                    trade.execution_id, e
                );
                self.audit
                    .log(
                        audit::ORDER_FILL_ERROR,
                        AuditAttrs::for_execution(
                            trade.execution_id,
                            json!({
                                "phase": "exit",
                                "error": e.to_string(),
                            }),
                            trade.dry_run,
                        ),
                    )
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::Side;

    fn trade(entry: f64) -> OpenTrade {
        OpenTrade {
            execution_id: 1,
            position_id: "p1".to_string(),
            signal_id: "s1".to_string(),
            market_id: "m1".to_string(),
            token_id: "t1".to_string(),
            side: Side::Up,
            entry_price: entry,
            shares: 2.0,
            initial_amount_usd: entry * 2.0,
            category: "crypto".to_string(),
            dry_run: true,
            opened_at: Utc::now(),
            highest_price: entry,
            partial_exit_done: false,
            breakeven_armed: false,
            realized_pnl: 0.0,
        }
    }

    fn policy() -> ExitPolicy {
        ExitPolicy {
            take_profit_pct: 15.0,
            stop_loss_pct: -20.0,
            trailing_stop_pct: 5.0,
            breakeven_trigger_pct: 8.0,
            max_hold_hours: 6.0,
        }
    }

    #[test]
    fn test_settlement_wins_over_everything() {
        let mut t = trade(0.50);
        assert_eq!(
            evaluate_exit(&mut t, 0.995, &policy(), Utc::now()),
            Some(ExitAction::Close(CloseReason::SettledWin))
        );
        let mut t = trade(0.50);
        assert_eq!(
            evaluate_exit(&mut t, 0.005, &policy(), Utc::now()),
            Some(ExitAction::Close(CloseReason::SettledLoss))
        );
    }

    #[test]
    fn test_partial_then_trailing_sequence() {
        // Scenario: entry 0.50, rises to 0.52 then 0.58, peaks 0.60, falls
        // to 0.555 with a 5% trailing stop.
        let mut t = trade(0.50);
        let p = policy();
        let now = Utc::now();

        assert_eq!(evaluate_exit(&mut t, 0.52, &p, now), None);

        // +16% >= 15% -> partial, breakeven armed.
        assert_eq!(
            evaluate_exit(&mut t, 0.58, &p, now),
            Some(ExitAction::PartialTakeProfit)
        );
        t.shares /= 2.0;
        t.partial_exit_done = true;
        t.breakeven_armed = true;

        // New peak, +20% but below 1.5x TP (22.5%) -> hold.
        assert_eq!(evaluate_exit(&mut t, 0.60, &p, now), None);
        assert!((t.highest_price - 0.60).abs() < 1e-9);

        // Drawdown from 0.60 to 0.555 is 7.5% >= 5% -> trailing stop.
        assert_eq!(
            evaluate_exit(&mut t, 0.555, &p, now),
            Some(ExitAction::Close(CloseReason::TrailingStop))
        );
    }

    #[test]
    fn test_second_take_profit_after_partial() {
        let mut t = trade(0.50);
        t.partial_exit_done = true;
        // +24% >= 22.5% -> TP2.
        assert_eq!(
            evaluate_exit(&mut t, 0.62, &policy(), Utc::now()),
            Some(ExitAction::Close(CloseReason::TakeProfit2))
        );
    }

    #[test]
    fn test_stop_loss() {
        let mut t = trade(0.50);
        assert_eq!(
            evaluate_exit(&mut t, 0.40, &policy(), Utc::now()),
            Some(ExitAction::Close(CloseReason::StopLoss))
        );
    }

    #[test]
    fn test_trailing_needs_profit() {
        let mut t = trade(0.50);
        t.highest_price = 0.52;
        // Price back below entry: drawdown is large but pnl <= 0, and the
        // drop to -7.7% has not hit the -20% stop -> hold.
        assert_eq!(evaluate_exit(&mut t, 0.46, &policy(), Utc::now()), None);
    }

    #[test]
    fn test_breakeven_arms_then_stops_at_entry() {
        let mut t = trade(0.50);
        let p = policy();
        let now = Utc::now();

        // +10% >= 8% trigger -> armed, no exit yet.
        assert_eq!(evaluate_exit(&mut t, 0.55, &p, now), None);
        assert!(t.breakeven_armed);

        // Back at entry with the stop armed. Drawdown from 0.55 to 0.50 is
        // 9%, but pnl is 0 so trailing does not apply; breakeven fires.
        assert_eq!(
            evaluate_exit(&mut t, 0.50, &p, now),
            Some(ExitAction::Close(CloseReason::BreakevenStop))
        );
    }

    #[test]
    fn test_time_stop() {
        let mut t = trade(0.50);
        t.opened_at = Utc::now() - chrono::Duration::hours(7);
        assert_eq!(
            evaluate_exit(&mut t, 0.50, &policy(), Utc::now()),
            Some(ExitAction::Close(CloseReason::MaxHoldTime))
        );
    }

    #[test]
    fn test_tiny_partial_closes_in_full() {
        let mut t = trade(0.50);
        t.shares = 0.2; // half notional = 0.1 * 0.58 < 0.10 USD
        assert_eq!(
            evaluate_exit(&mut t, 0.58, &policy(), Utc::now()),
            Some(ExitAction::Close(CloseReason::TakeProfit))
        );
    }
}
