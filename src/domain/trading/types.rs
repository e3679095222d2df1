use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a binary-outcome position. `Up` holds the YES token,
/// `Down` holds the NO token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Up => "UP",
            Side::Down => "DOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UP" | "YES" => Some(Side::Up),
            "DOWN" | "NO" => Some(Side::Down),
            _ => None,
        }
    }

    /// `true` for the YES side. P&L sign handling in the lifecycle overlay
    /// keys off this.
    pub fn is_yes(&self) -> bool {
        matches!(self, Side::Up)
    }

    /// YES-equivalent of a held-token price. The lifecycle overlay tracks
    /// YES-denominated prices, so a NO token price maps through `1 - p`.
    pub fn yes_price(&self, token_price: f64) -> f64 {
        if self.is_yes() {
            token_price
        } else {
            1.0 - token_price
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Open,
    Closed,
    Cancelled,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Open => "open",
            ExecutionStatus::Closed => "closed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ExecutionStatus::Open),
            "closed" => Some(ExecutionStatus::Closed),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Open)
    }
}

/// Why a position was fully closed. Stored verbatim in
/// `trade_executions.close_reason` and in `POSITION_CLOSED` audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    SettledWin,
    SettledLoss,
    TakeProfit,
    TakeProfit2,
    StopLoss,
    TrailingStop,
    BreakevenStop,
    MaxHoldTime,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::SettledWin => "SETTLED_WIN",
            CloseReason::SettledLoss => "SETTLED_LOSS",
            CloseReason::TakeProfit => "TAKE_PROFIT",
            CloseReason::TakeProfit2 => "TAKE_PROFIT_2",
            CloseReason::StopLoss => "STOP_LOSS",
            CloseReason::TrailingStop => "TRAILING_STOP",
            CloseReason::BreakevenStop => "BREAKEVEN_STOP",
            CloseReason::MaxHoldTime => "MAX_HOLD_TIME",
        }
    }

    /// Settlement closes are paid out by the venue; no SELL order is placed.
    pub fn is_settlement(&self) -> bool {
        matches!(self, CloseReason::SettledWin | CloseReason::SettledLoss)
    }
}

/// One row of `trade_executions`: a single attempted trade, live or simulated.
#[derive(Debug, Clone)]
pub struct Execution {
    pub id: i64,
    pub signal_id: String,
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    pub amount_usd: f64,
    pub entry_price: f64,
    pub fill_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub pnl_usd: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub status: ExecutionStatus,
    pub dry_run: bool,
    pub order_id: Option<String>,
    pub edge: f64,
    pub confidence: f64,
    pub quality_score: f64,
    pub regime: String,
    pub category: String,
    pub sizing_method: String,
    pub slippage_bps: Option<f64>,
    pub close_reason: Option<String>,
    pub error: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Insert attributes for a new execution row. The repository assigns the id.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub signal_id: String,
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    pub amount_usd: f64,
    pub entry_price: f64,
    pub status: ExecutionStatus,
    pub dry_run: bool,
    pub order_id: Option<String>,
    pub edge: f64,
    pub confidence: f64,
    pub quality_score: f64,
    pub regime: String,
    pub category: String,
    pub sizing_method: String,
    pub error: Option<String>,
}

/// In-memory open-trade ledger entry, owned by the settlement monitor.
/// Rehydrated from `trade_executions WHERE status = 'open'` on startup.
#[derive(Debug, Clone)]
pub struct OpenTrade {
    pub execution_id: i64,
    pub position_id: String,
    pub signal_id: String,
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    /// Entry price of the held token.
    pub entry_price: f64,
    /// Shares still held; reduced by partial exits.
    pub shares: f64,
    /// Notional at entry; exposure accounting uses this.
    pub initial_amount_usd: f64,
    pub category: String,
    pub dry_run: bool,
    pub opened_at: DateTime<Utc>,
    /// Peak mark price observed since entry; drives the trailing stop.
    pub highest_price: f64,
    pub partial_exit_done: bool,
    pub breakeven_armed: bool,
    /// P&L already banked by partial exits.
    pub realized_pnl: f64,
}

impl OpenTrade {
    pub fn pnl_pct_at(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn drawdown_from_peak_at(&self, price: f64) -> f64 {
        if self.highest_price <= 0.0 {
            return 0.0;
        }
        (self.highest_price - price) / self.highest_price * 100.0
    }

    pub fn hold_hours_at(&self, now: DateTime<Utc>) -> f64 {
        (now - self.opened_at).num_seconds() as f64 / 3600.0
    }
}
