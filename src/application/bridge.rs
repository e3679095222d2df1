//! Scanner-Trader bridge: turns qualifying `signal:enter` events into
//! positions.
//!
//! Every signal runs the full local gate chain and leaves a Decision record
//! whether it was admitted or not. Live admissions go through balance and
//! liquidity checks, a book-driven BUY market order with bounded retry, and
//! an async fill poll; dry-run admissions go to the CSV sink and the
//! simulated ledger.

use crate::application::audit_log::{AuditAttrs, AuditLog};
use crate::application::bot_control::{BotControl, REASON_CIRCUIT_BREAKER};
use crate::application::config_store::ConfigStore;
use crate::application::decision_tracker::DecisionTracker;
use crate::application::events::{BotEvent, EventBus};
use crate::application::execution_log::ExecutionLog;
use crate::application::lifecycle_store::LifecycleStore;
use crate::application::monitor::SettlementMonitor;
use crate::application::risk_manager::RiskManager;
use crate::domain::audit;
use crate::domain::decisions::{DecisionOutcome, GateOutcome};
use crate::domain::errors::{BlockReason, VenueError};
use crate::domain::ports::{BookSummary, ClobVenue, OrderRequest, OrderSide, OrderState};
use crate::domain::signal::{EnterSignal, SignalAction};
use crate::domain::trading::types::{ExecutionStatus, NewExecution, OpenTrade, Side};
use crate::infrastructure::sink::dry_run_csv::DryRunCsv;
use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

const PLACEMENT_ATTEMPTS: u32 = 3;

/// Injected bet-sizing seam. The default implementation delegates to the
/// risk manager's edge-linear rule.
pub trait BetSizer: Send + Sync {
    fn bet_size(&self, signal: &EnterSignal) -> f64;
    fn method(&self) -> &'static str;
}

pub struct EdgeLinearSizer {
    risk: Arc<RiskManager>,
}

impl EdgeLinearSizer {
    pub fn new(risk: Arc<RiskManager>) -> Arc<Self> {
        Arc::new(Self { risk })
    }
}

impl BetSizer for EdgeLinearSizer {
    fn bet_size(&self, signal: &EnterSignal) -> f64 {
        self.risk.get_bet_size(signal.edge())
    }

    fn method(&self) -> &'static str {
        "edge_linear"
    }
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub live: bool,
    pub cooldown_minutes: i64,
    pub max_poll_ms: u64,
    pub poll_interval_ms: u64,
    pub balance_cache_ttl: Duration,
}

/// Metadata the fill poller needs after the handler returns.
#[derive(Debug, Clone)]
struct PendingEntry {
    execution_id: i64,
    position_id: String,
    signal_id: String,
    market_id: String,
    token_id: String,
    side: Side,
    category: String,
    entry_price: f64,
    shares: f64,
}

pub struct TraderBridge {
    venue: Arc<dyn ClobVenue>,
    config: Arc<ConfigStore>,
    control: Arc<BotControl>,
    risk: Arc<RiskManager>,
    executions: Arc<ExecutionLog>,
    decisions: Arc<DecisionTracker>,
    lifecycle: Arc<LifecycleStore>,
    monitor: Arc<SettlementMonitor>,
    audit: Arc<AuditLog>,
    events: EventBus,
    sizer: Arc<dyn BetSizer>,
    csv: DryRunCsv,
    settings: BridgeSettings,
    balance_cache: Mutex<Option<(f64, Instant)>>,
}

impl TraderBridge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue: Arc<dyn ClobVenue>,
        config: Arc<ConfigStore>,
        control: Arc<BotControl>,
        risk: Arc<RiskManager>,
        executions: Arc<ExecutionLog>,
        decisions: Arc<DecisionTracker>,
        lifecycle: Arc<LifecycleStore>,
        monitor: Arc<SettlementMonitor>,
        audit: Arc<AuditLog>,
        events: EventBus,
        sizer: Arc<dyn BetSizer>,
        csv: DryRunCsv,
        settings: BridgeSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            venue,
            config,
            control,
            risk,
            executions,
            decisions,
            lifecycle,
            monitor,
            audit,
            events,
            sizer,
            csv,
            settings,
            balance_cache: Mutex::new(None),
        })
    }

    /// Event loop: one signal at a time, errors contained per signal.
    pub async fn run(
        self: Arc<Self>,
        mut signals: mpsc::Receiver<EnterSignal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            "TraderBridge: started ({})",
            if self.settings.live { "LIVE" } else { "dry run" }
        );
        loop {
            tokio::select! {
                signal = signals.recv() => {
                    match signal {
                        Some(signal) => {
                            if let Err(e) = self.handle_signal(&signal).await {
                                error!(
                                    "TraderBridge: signal {} failed: {:#}",
                                    signal.signal_id, e
                                );
                            }
                        }
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    info!("TraderBridge: shutting down");
                    break;
                }
            }
        }
    }

    pub async fn handle_signal(self: &Arc<Self>, signal: &EnterSignal) -> Result<()> {
        let max_bet = self.config.get("max_bet_usd");
        let bet_size = self.sizer.bet_size(signal).min(max_bet);

        // Local gates all evaluate so the Decision record carries the full
        // tree; the first failure is the blocking gate.
        let mut gates = self.evaluate_local_gates(signal, bet_size).await?;
        if gates.iter().any(|g| !g.passed) {
            self.decisions
                .record(signal, DecisionOutcome::Blocked, &gates)
                .await;
            return Ok(());
        }

        // Token resolution is fatal when the scanner gave us no id to buy.
        let Some(token_id) = signal.token_id().map(str::to_string) else {
            gates.push(GateOutcome::fail("token", BlockReason::NoTokenId.as_str()));
            self.record_failed_attempt(signal, bet_size, "", BlockReason::NoTokenId, &gates)
                .await;
            return Ok(());
        };
        gates.push(GateOutcome::pass("token"));

        if !self.settings.live {
            self.decisions
                .record(signal, DecisionOutcome::DryRun, &gates)
                .await;
            return self.enter_dry_run(signal, bet_size, &token_id).await;
        }

        // Live-only gates; these spend HTTP calls, so they only run once the
        // local chain has passed.
        match self.check_balance(bet_size).await {
            Ok(gate) => {
                let passed = gate.passed;
                gates.push(gate);
                if !passed {
                    self.record_failed_attempt(
                        signal,
                        bet_size,
                        &token_id,
                        BlockReason::InsufficientBalance,
                        &gates,
                    )
                    .await;
                    return Ok(());
                }
            }
            Err(e) => {
                gates.push(GateOutcome::fail("balance", format!("balance unavailable: {}", e)));
                self.record_failed_attempt(
                    signal,
                    bet_size,
                    &token_id,
                    BlockReason::InsufficientBalance,
                    &gates,
                )
                .await;
                return Ok(());
            }
        }

        let book = match self.check_liquidity(signal, bet_size, &token_id, &mut gates).await {
            Some(book) => book,
            None => return Ok(()),
        };

        self.decisions
            .record(signal, DecisionOutcome::Executed, &gates)
            .await;
        self.enter_live(signal, bet_size, &token_id, &book).await
    }

    /// Gates 1-7: cheap, local, always all evaluated.
    async fn evaluate_local_gates(
        &self,
        signal: &EnterSignal,
        bet_size: f64,
    ) -> Result<Vec<GateOutcome>> {
        let mut gates = Vec::with_capacity(9);

        // 1. Signal strength
        if signal.action == SignalAction::Enter && signal.strength.is_tradeable() {
            gates.push(GateOutcome::pass("strength"));
        } else {
            gates.push(GateOutcome::fail(
                "strength",
                format!(
                    "{}: action {:?} strength {}",
                    BlockReason::WeakSignal.as_str(),
                    signal.action,
                    signal.strength.as_str()
                ),
            ));
        }

        // 2. Bot control
        let (state, state_reason) = self.control.state_reason().await;
        if state.admits_new_trades() {
            gates.push(GateOutcome::pass("control"));
        } else if state_reason == REASON_CIRCUIT_BREAKER {
            gates.push(GateOutcome::fail("control", BlockReason::CircuitBreaker.as_str()));
        } else {
            gates.push(GateOutcome::fail(
                "control",
                format!("bot state {}", state.as_str()),
            ));
        }

        // 3. Dedup: at most one active position per market.
        if self
            .executions
            .has_open_position_on_market(&signal.market_id)
            .await?
        {
            gates.push(GateOutcome::fail("dedup", BlockReason::DedupOpen.as_str()));
        } else {
            gates.push(GateOutcome::pass("dedup"));
        }

        // 4. Market cooldown
        if self
            .executions
            .is_market_on_cooldown(&signal.market_id, self.settings.cooldown_minutes)
            .await?
        {
            gates.push(GateOutcome::fail(
                "cooldown",
                format!(
                    "{}: traded within last {} min",
                    BlockReason::Cooldown.as_str(),
                    self.settings.cooldown_minutes
                ),
            ));
        } else {
            gates.push(GateOutcome::pass("cooldown"));
        }

        // 5. Settlement window
        let min_settlement = self.config.get("min_settlement_minutes");
        if signal.settlement_left_min >= min_settlement {
            gates.push(GateOutcome::pass("settlement_time"));
        } else {
            gates.push(GateOutcome::fail(
                "settlement_time",
                format!(
                    "{}: {:.0} min left < {:.0} min",
                    BlockReason::SettlingTooSoon.as_str(),
                    signal.settlement_left_min,
                    min_settlement
                ),
            ));
        }

        // 6. Quoted spread on the chosen side
        let max_spread = self.config.get("max_spread");
        match signal.spread() {
            Some(spread) if spread <= max_spread => gates.push(GateOutcome::pass("spread")),
            Some(spread) => gates.push(GateOutcome::fail(
                "spread",
                format!(
                    "{}: spread {:.4} > max {:.4}",
                    BlockReason::SpreadTooWide.as_str(),
                    spread,
                    max_spread
                ),
            )),
            None => gates.push(GateOutcome::fail("spread", "no spread data")),
        }

        // 7. Risk manager
        let assessment = self.risk.can_trade(&signal.category, bet_size).await;
        if assessment.allowed {
            gates.push(GateOutcome::pass("risk"));
        } else {
            gates.push(GateOutcome::fail(
                "risk",
                assessment
                    .reason
                    .map(|r| r.as_str().to_string())
                    .unwrap_or_else(|| "denied".to_string()),
            ));
        }

        Ok(gates)
    }

    /// Gate 8: cached wallet balance must cover `max(min_balance, bet)`.
    async fn check_balance(&self, bet_size: f64) -> Result<GateOutcome, VenueError> {
        let balance = self.cached_balance().await?;
        let required = self.config.get("min_balance_usd").max(bet_size);
        if balance >= required {
            Ok(GateOutcome::pass("balance"))
        } else {
            Ok(GateOutcome::fail(
                "balance",
                format!("balance {:.2} < required {:.2}", balance, required),
            ))
        }
    }

    /// Gate 9: depth on the chosen side must cover the bet within the
    /// slippage budget. Returns the book for order pricing.
    async fn check_liquidity(
        self: &Arc<Self>,
        signal: &EnterSignal,
        bet_size: f64,
        token_id: &str,
        gates: &mut Vec<GateOutcome>,
    ) -> Option<BookSummary> {
        let book = match self.venue.orderbook(token_id).await {
            Ok(book) => book,
            Err(e) => {
                gates.push(GateOutcome::fail(
                    "liquidity",
                    format!("orderbook unavailable: {}", e),
                ));
                self.record_failed_attempt(
                    signal,
                    bet_size,
                    token_id,
                    BlockReason::InsufficientLiquidity,
                    gates,
                )
                .await;
                return None;
            }
        };

        let available_usd = book.ask_liquidity * book.best_ask;
        if available_usd < bet_size {
            gates.push(GateOutcome::fail(
                "liquidity",
                format!("ask depth {:.2} USD < bet {:.2}", available_usd, bet_size),
            ));
            self.record_failed_attempt(
                signal,
                bet_size,
                token_id,
                BlockReason::InsufficientLiquidity,
                gates,
            )
            .await;
            return None;
        }

        let max_slippage = self.config.get("max_slippage_pct");
        let slippage = book.estimated_slippage_pct(OrderSide::Buy);
        if slippage > max_slippage {
            gates.push(GateOutcome::fail(
                "liquidity",
                format!("slippage {:.2}% > max {:.2}%", slippage, max_slippage),
            ));
            self.record_failed_attempt(
                signal,
                bet_size,
                token_id,
                BlockReason::SlippageExceedsMax,
                gates,
            )
            .await;
            return None;
        }

        gates.push(GateOutcome::pass("liquidity"));
        Some(book)
    }

    /// Post-admission failures leave both a failed execution and a blocked
    /// decision, so accounting and causality stay consistent.
    async fn record_failed_attempt(
        &self,
        signal: &EnterSignal,
        bet_size: f64,
        token_id: &str,
        reason: BlockReason,
        gates: &[GateOutcome],
    ) {
        let new = NewExecution {
            signal_id: signal.signal_id.clone(),
            market_id: signal.market_id.clone(),
            token_id: token_id.to_string(),
            side: signal.side,
            amount_usd: bet_size,
            entry_price: signal.entry_price(),
            status: ExecutionStatus::Failed,
            dry_run: !self.settings.live,
            order_id: None,
            edge: signal.edge(),
            confidence: signal.confidence,
            quality_score: signal.quality_score,
            regime: signal.regime.clone(),
            category: signal.category.clone(),
            sizing_method: self.sizer.method().to_string(),
            error: Some(reason.as_str().to_string()),
        };

        let execution_id = match self.executions.log_execution(&new).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("TraderBridge: failed to record failed attempt: {:#}", e);
                None
            }
        };

        self.decisions
            .record(signal, DecisionOutcome::Blocked, gates)
            .await;
        self.audit
            .log(
                audit::ORDER_REJECTED,
                AuditAttrs {
                    execution_id,
                    detail: json!({
                        "market_id": signal.market_id,
                        "reason": reason.as_str(),
                        "amount_usd": bet_size,
                    }),
                    dry_run: !self.settings.live,
                },
            )
            .await;
    }

    /// Dry-run path: CSV row, simulated execution, straight into the ledger.
    async fn enter_dry_run(
        &self,
        signal: &EnterSignal,
        bet_size: f64,
        token_id: &str,
    ) -> Result<()> {
        if let Err(e) = self.csv.append(signal, bet_size) {
            warn!("TraderBridge: CSV sink failed: {:#}", e);
        }

        let entry_price = signal.entry_price();
        let execution_id = self
            .executions
            .log_execution(&NewExecution {
                signal_id: signal.signal_id.clone(),
                market_id: signal.market_id.clone(),
                token_id: token_id.to_string(),
                side: signal.side,
                amount_usd: bet_size,
                entry_price,
                status: ExecutionStatus::Open,
                dry_run: true,
                order_id: None,
                edge: signal.edge(),
                confidence: signal.confidence,
                quality_score: signal.quality_score,
                regime: signal.regime.clone(),
                category: signal.category.clone(),
                sizing_method: self.sizer.method().to_string(),
                error: None,
            })
            .await?;

        let position_id = Uuid::new_v4().to_string();
        let shares = if entry_price > 0.0 {
            bet_size / entry_price
        } else {
            0.0
        };

        self.lifecycle
            .create(&position_id, execution_id, &signal.market_id, signal.side);
        self.finish_entry(
            PendingEntry {
                execution_id,
                position_id,
                signal_id: signal.signal_id.clone(),
                market_id: signal.market_id.clone(),
                token_id: token_id.to_string(),
                side: signal.side,
                category: signal.category.clone(),
                entry_price,
                shares,
            },
            entry_price,
            shares,
            bet_size,
            true,
        )
        .await;
        Ok(())
    }

    /// Live path: execution row, BUY market order with bounded linear-backoff
    /// retry, then an async fill poll.
    async fn enter_live(
        self: &Arc<Self>,
        signal: &EnterSignal,
        bet_size: f64,
        token_id: &str,
        book: &BookSummary,
    ) -> Result<()> {
        // Book-driven marketable price: cross the spread at the ask.
        let price = book.best_ask;
        let shares = if price > 0.0 { bet_size / price } else { 0.0 };

        let execution_id = self
            .executions
            .log_execution(&NewExecution {
                signal_id: signal.signal_id.clone(),
                market_id: signal.market_id.clone(),
                token_id: token_id.to_string(),
                side: signal.side,
                amount_usd: bet_size,
                entry_price: price,
                status: ExecutionStatus::Open,
                dry_run: false,
                order_id: None,
                edge: signal.edge(),
                confidence: signal.confidence,
                quality_score: signal.quality_score,
                regime: signal.regime.clone(),
                category: signal.category.clone(),
                sizing_method: self.sizer.method().to_string(),
                error: None,
            })
            .await?;

        let position_id = Uuid::new_v4().to_string();
        self.lifecycle
            .create(&position_id, execution_id, &signal.market_id, signal.side);

        let request = OrderRequest {
            token_id: token_id.to_string(),
            side: OrderSide::Buy,
            price,
            size: shares,
        };

        let placed = match self.place_with_retry(&request).await {
            Ok(placed) => placed,
            Err(e) => {
                let reason = match &e {
                    VenueError::Rejected { body } => format!("venue rejected: {}", body),
                    other => format!("placement failed: {}", other),
                };
                self.executions.fail_execution(execution_id, &reason).await?;
                self.lifecycle.cancel(&position_id, &reason);
                self.audit
                    .log(
                        audit::ORDER_REJECTED,
                        AuditAttrs::for_execution(
                            execution_id,
                            json!({
                                "market_id": signal.market_id,
                                "reason": reason,
                                "amount_usd": bet_size,
                            }),
                            false,
                        ),
                    )
                    .await;
                return Ok(());
            }
        };

        self.executions
            .set_order_id(execution_id, &placed.order_id)
            .await?;
        self.invalidate_balance().await;
        self.audit
            .log(
                audit::ORDER_PLACED,
                AuditAttrs::for_execution(
                    execution_id,
                    json!({
                        "market_id": signal.market_id,
                        "order_id": placed.order_id,
                        "side": signal.side.as_str(),
                        "price": price,
                        "size": shares,
                        "amount_usd": bet_size,
                    }),
                    false,
                ),
            )
            .await;

        let pending = PendingEntry {
            execution_id,
            position_id,
            signal_id: signal.signal_id.clone(),
            market_id: signal.market_id.clone(),
            token_id: token_id.to_string(),
            side: signal.side,
            category: signal.category.clone(),
            entry_price: price,
            shares,
        };
        let bridge = Arc::clone(self);
        let order_id = placed.order_id;
        tokio::spawn(async move {
            bridge.poll_fill(pending, order_id, bet_size).await;
        });
        Ok(())
    }

    /// Bounded linear backoff: 1 s x attempt, max 3 attempts, transient
    /// errors only. Rejections are final immediately.
    async fn place_with_retry(
        &self,
        request: &OrderRequest,
    ) -> Result<crate::domain::ports::PlacedOrder, VenueError> {
        let mut last_err = None;
        for attempt in 1..=PLACEMENT_ATTEMPTS {
            match self.venue.place_order(request).await {
                Ok(placed) => return Ok(placed),
                Err(e) if e.is_transient() && attempt < PLACEMENT_ATTEMPTS => {
                    warn!(
                        "TraderBridge: placement attempt {} failed ({}), retrying",
                        attempt, e
                    );
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(VenueError::Timeout))
    }

    /// Bounded fill poll. Terminal outcomes: matched (full or partial),
    /// rejected/expired/cancelled, or wall-budget timeout with optimistic
    /// registration so the monitor takes over.
    async fn poll_fill(self: Arc<Self>, pending: PendingEntry, order_id: String, bet_size: f64) {
        let deadline = Instant::now() + Duration::from_millis(self.settings.max_poll_ms);
        let interval = Duration::from_millis(self.settings.poll_interval_ms);

        loop {
            tokio::time::sleep(interval).await;

            match self.venue.order_status(&order_id).await {
                Ok(status) => match status.state {
                    OrderState::Matched => {
                        let fill_price = status.average_price.unwrap_or(pending.entry_price);
                        let requested = if status.size > 0.0 {
                            status.size
                        } else {
                            pending.shares
                        };
                        let filled = if status.size_matched > 0.0 {
                            status.size_matched
                        } else {
                            requested
                        };
                        let slippage_bps = if pending.entry_price > 0.0 {
                            (fill_price - pending.entry_price) / pending.entry_price * 10_000.0
                        } else {
                            0.0
                        };
                        if let Err(e) = self
                            .executions
                            .set_fill(pending.execution_id, fill_price, slippage_bps)
                            .await
                        {
                            warn!("TraderBridge: set_fill failed: {:#}", e);
                        }

                        if filled + f64::EPSILON < requested {
                            let amount = filled * fill_price;
                            self.audit
                                .log(
                                    audit::ORDER_PARTIAL_FILL,
                                    AuditAttrs::for_execution(
                                        pending.execution_id,
                                        json!({
                                            "order_id": order_id,
                                            "filled": filled,
                                            "requested": requested,
                                            "fill_price": fill_price,
                                        }),
                                        false,
                                    ),
                                )
                                .await;
                            self.finish_entry(pending, fill_price, filled, amount, false)
                                .await;
                        } else {
                            self.finish_entry(pending, fill_price, filled, bet_size, false)
                                .await;
                        }
                        return;
                    }
                    OrderState::Rejected | OrderState::Expired | OrderState::Cancelled => {
                        let reason = format!("order {:?}", status.state);
                        if let Err(e) = self
                            .executions
                            .fail_execution(pending.execution_id, &reason)
                            .await
                        {
                            warn!("TraderBridge: fail_execution failed: {:#}", e);
                        }
                        self.lifecycle.cancel(&pending.position_id, &reason);
                        self.audit
                            .log(
                                audit::ORDER_REJECTED,
                                AuditAttrs::for_execution(
                                    pending.execution_id,
                                    json!({
                                        "order_id": order_id,
                                        "reason": reason,
                                        "market_id": pending.market_id,
                                    }),
                                    false,
                                ),
                            )
                            .await;
                        return;
                    }
                    OrderState::Live => {}
                },
                Err(e) => {
                    warn!("TraderBridge: fill poll error for {}: {}", order_id, e);
                }
            }

            if Instant::now() >= deadline {
                // Fill ambiguity: register optimistically so the monitor
                // owns the position either way.
                warn!(
                    "TraderBridge: fill poll timed out for {}, registering optimistically",
                    order_id
                );
                self.audit
                    .log(
                        audit::ORDER_FILL_ERROR,
                        AuditAttrs::for_execution(
                            pending.execution_id,
                            json!({
                                "order_id": order_id,
                                "reason": "poll_timeout",
                                "market_id": pending.market_id,
                            }),
                            false,
                        ),
                    )
                    .await;
                let price = pending.entry_price;
                let shares = pending.shares;
                self.finish_entry(pending, price, shares, bet_size, false).await;
                return;
            }
        }
    }

    /// Shared tail of every successful entry: lifecycle ENTERED, monitor
    /// registration, risk open accounting, audit + broadcast.
    async fn finish_entry(
        &self,
        pending: PendingEntry,
        fill_price: f64,
        shares: f64,
        amount_usd: f64,
        dry_run: bool,
    ) {
        self.lifecycle.mark_entered(
            &pending.position_id,
            pending.side.yes_price(fill_price),
            shares,
        );

        self.monitor
            .register(OpenTrade {
                execution_id: pending.execution_id,
                position_id: pending.position_id.clone(),
                signal_id: pending.signal_id.clone(),
                market_id: pending.market_id.clone(),
                token_id: pending.token_id.clone(),
                side: pending.side,
                entry_price: fill_price,
                shares,
                initial_amount_usd: amount_usd,
                category: pending.category.clone(),
                dry_run,
                opened_at: Utc::now(),
                highest_price: fill_price,
                partial_exit_done: false,
                breakeven_armed: false,
                realized_pnl: 0.0,
            })
            .await;

        self.risk.record_trade_open(&pending.category, amount_usd);

        self.audit
            .log(
                audit::POSITION_OPENED,
                AuditAttrs::for_execution(
                    pending.execution_id,
                    json!({
                        "market_id": pending.market_id,
                        "side": pending.side.as_str(),
                        "entry_price": fill_price,
                        "shares": shares,
                        "amount_usd": amount_usd,
                        "signal_id": pending.signal_id,
                    }),
                    dry_run,
                ),
            )
            .await;

        self.events.publish(BotEvent::PositionOpened {
            execution_id: pending.execution_id,
            market_id: pending.market_id,
        });
    }

    async fn cached_balance(&self) -> Result<f64, VenueError> {
        let mut cache = self.balance_cache.lock().await;
        if let Some((balance, at)) = *cache
            && at.elapsed() < self.settings.balance_cache_ttl
        {
            return Ok(balance);
        }
        let balance = self.venue.balance().await?;
        *cache = Some((balance, Instant::now()));
        Ok(balance)
    }

    /// Placement consumes collateral; the next balance gate must see fresh
    /// numbers.
    async fn invalidate_balance(&self) {
        *self.balance_cache.lock().await = None;
    }
}
