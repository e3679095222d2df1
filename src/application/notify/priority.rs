//! Priority scoring for outbound alerts.

use crate::domain::notify::Priority;
use serde_json::Value;

/// Events that always page, regardless of payload.
const CRITICAL_EVENTS: [&str; 2] = ["risk.circuit_breaker", "venue.unreachable"];

/// Events that are always at least high priority.
const HIGH_EVENTS: [&str; 2] = ["trade.rejected", "trade.auto_repaired"];

fn num(data: &Value, key: &str) -> Option<f64> {
    data.get(key).and_then(Value::as_f64)
}

/// Score one outbound event. Rules apply in order; the first match wins.
pub fn score_priority(event: &str, data: &Value) -> Priority {
    if CRITICAL_EVENTS.contains(&event) {
        return Priority::Critical;
    }
    if HIGH_EVENTS.contains(&event) {
        return Priority::High;
    }

    if event.starts_with("trade.") {
        let pnl = num(data, "pnl_usd").unwrap_or(0.0);
        let amount = num(data, "amount_usd").or_else(|| num(data, "amount")).unwrap_or(0.0);
        if pnl.abs() > 50.0 || amount > 100.0 {
            return Priority::High;
        }
        if event == "trade.closed" && pnl < -20.0 {
            return Priority::High;
        }
        return Priority::Medium;
    }

    if event.starts_with("signal.") {
        let edge = num(data, "edge").unwrap_or(0.0);
        let confidence = num(data, "confidence").unwrap_or(0.0);
        if edge > 0.15 {
            return Priority::High;
        }
        if confidence > 80.0 && edge > 0.08 {
            return Priority::High;
        }
        if confidence < 40.0 || edge < 0.03 {
            return Priority::Low;
        }
        return Priority::Medium;
    }

    Priority::Medium
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_critical_events() {
        assert_eq!(
            score_priority("risk.circuit_breaker", &json!({})),
            Priority::Critical
        );
        assert_eq!(
            score_priority("venue.unreachable", &json!({})),
            Priority::Critical
        );
    }

    #[test]
    fn test_high_events() {
        assert_eq!(score_priority("trade.rejected", &json!({})), Priority::High);
        assert_eq!(
            score_priority("trade.auto_repaired", &json!({})),
            Priority::High
        );
    }

    #[test]
    fn test_trade_rules() {
        assert_eq!(
            score_priority("trade.closed", &json!({"pnl_usd": 60.0})),
            Priority::High
        );
        assert_eq!(
            score_priority("trade.opened", &json!({"amount_usd": 150.0})),
            Priority::High
        );
        // Loss beyond -20 on a close is high even though |pnl| <= 50.
        assert_eq!(
            score_priority("trade.closed", &json!({"pnl_usd": -25.0})),
            Priority::High
        );
        assert_eq!(
            score_priority("trade.opened", &json!({"amount_usd": 1.0})),
            Priority::Medium
        );
    }

    #[test]
    fn test_signal_rules() {
        assert_eq!(
            score_priority("signal.entered", &json!({"edge": 0.20, "confidence": 50.0})),
            Priority::High
        );
        assert_eq!(
            score_priority("signal.entered", &json!({"edge": 0.09, "confidence": 85.0})),
            Priority::High
        );
        assert_eq!(
            score_priority("signal.entered", &json!({"edge": 0.05, "confidence": 30.0})),
            Priority::Low
        );
        assert_eq!(
            score_priority("signal.entered", &json!({"edge": 0.02, "confidence": 70.0})),
            Priority::Low
        );
        assert_eq!(
            score_priority("signal.entered", &json!({"edge": 0.05, "confidence": 70.0})),
            Priority::Medium
        );
    }

    #[test]
    fn test_default_is_medium() {
        assert_eq!(score_priority("bot.state_change", &json!({})), Priority::Medium);
    }
}
