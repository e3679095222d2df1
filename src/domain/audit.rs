//! Audit event vocabulary and row types.

use chrono::{DateTime, Utc};
use serde_json::Value;

// Internal event types. Kept as constants rather than an enum so ad-hoc
// operational events can be appended without a vocabulary change.
pub const POSITION_OPENED: &str = "POSITION_OPENED";
pub const POSITION_CLOSED: &str = "POSITION_CLOSED";
pub const PARTIAL_EXIT: &str = "PARTIAL_EXIT";
pub const ORDER_PLACED: &str = "ORDER_PLACED";
pub const ORDER_REJECTED: &str = "ORDER_REJECTED";
pub const ORDER_PARTIAL_FILL: &str = "ORDER_PARTIAL_FILL";
pub const ORDER_FILL_ERROR: &str = "ORDER_FILL_ERROR";
pub const CIRCUIT_BREAKER: &str = "CIRCUIT_BREAKER";
pub const BOT_STATE_CHANGE: &str = "BOT_STATE_CHANGE";
pub const CONFIG_CHANGE: &str = "CONFIG_CHANGE";
pub const CLOB_UNREACHABLE: &str = "CLOB_UNREACHABLE";
pub const POSITION_AUTO_REPAIRED: &str = "POSITION_AUTO_REPAIRED";
pub const STALE_POSITION: &str = "STALE_POSITION";
pub const WEBHOOK_QUEUED: &str = "WEBHOOK_QUEUED";
pub const EMAIL_DELIVERED: &str = "EMAIL_DELIVERED";
pub const EMAIL_FAILED: &str = "EMAIL_FAILED";
pub const EMAIL_DIGEST_QUEUED: &str = "EMAIL_DIGEST_QUEUED";

/// Bounded mapping from internal audit event types to outbound webhook event
/// names. Anything not listed stays internal.
pub fn outbound_event(event_type: &str) -> Option<&'static str> {
    match event_type {
        POSITION_OPENED => Some("trade.opened"),
        POSITION_CLOSED => Some("trade.closed"),
        PARTIAL_EXIT => Some("trade.partial_exit"),
        ORDER_REJECTED => Some("trade.rejected"),
        POSITION_AUTO_REPAIRED => Some("trade.auto_repaired"),
        CIRCUIT_BREAKER => Some("risk.circuit_breaker"),
        CLOB_UNREACHABLE => Some("venue.unreachable"),
        BOT_STATE_CHANGE => Some("bot.state_change"),
        _ => None,
    }
}

/// One immutable row of `trade_audit_log`.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub id: i64,
    pub event_type: String,
    pub execution_id: Option<i64>,
    pub detail: Value,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
}

/// Filters for `query`. All fields are conjunctive; `None` means no filter.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub event_type: Option<String>,
    pub execution_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_bounded() {
        assert_eq!(outbound_event(POSITION_OPENED), Some("trade.opened"));
        assert_eq!(outbound_event(CIRCUIT_BREAKER), Some("risk.circuit_breaker"));
        // Delivery bookkeeping events never fan back out.
        assert_eq!(outbound_event(WEBHOOK_QUEUED), None);
        assert_eq!(outbound_event(EMAIL_DELIVERED), None);
        assert_eq!(outbound_event("SOMETHING_ELSE"), None);
    }
}
