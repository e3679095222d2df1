use thiserror::Error;

/// Errors from the CLOB venue client. The bridge and monitor branch on the
/// variant: rejections are final, transient failures retry.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("order rejected by venue: {body}")]
    Rejected { body: String },

    #[error("venue unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    #[error("venue request timed out")]
    Timeout,

    #[error("venue response malformed: {reason}")]
    Malformed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VenueError {
    /// 5xx, 429 and timeouts are worth retrying; 4xx rejections are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Unavailable { .. } | VenueError::Timeout)
    }
}

/// Why the gate chain refused a signal. The string form is what lands in
/// Decision records and failed executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    WeakSignal,
    BotNotRunning,
    CircuitBreaker,
    DedupOpen,
    Cooldown,
    SettlingTooSoon,
    SpreadTooWide,
    RiskBlocked,
    NoTokenId,
    InsufficientBalance,
    InsufficientLiquidity,
    SlippageExceedsMax,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::WeakSignal => "weak_signal",
            BlockReason::BotNotRunning => "bot_not_running",
            BlockReason::CircuitBreaker => "circuit_breaker",
            BlockReason::DedupOpen => "dedup_open",
            BlockReason::Cooldown => "cooldown",
            BlockReason::SettlingTooSoon => "settling_too_soon",
            BlockReason::SpreadTooWide => "spread_too_wide",
            BlockReason::RiskBlocked => "risk_blocked",
            BlockReason::NoTokenId => "no_token_id",
            BlockReason::InsufficientBalance => "insufficient_balance",
            BlockReason::InsufficientLiquidity => "insufficient_liquidity",
            BlockReason::SlippageExceedsMax => "slippage_exceeds_max",
        }
    }
}
