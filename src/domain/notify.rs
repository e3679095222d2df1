//! Notification-side row types and the outbound envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A registered outbound webhook. `fail_count` counts consecutive failures
/// and resets on success; ten in a row deactivates the row.
#[derive(Debug, Clone)]
pub struct Webhook {
    pub id: i64,
    pub owner_email: String,
    pub url: String,
    pub name: String,
    pub active: bool,
    pub success_count: i64,
    pub fail_count: i64,
    pub last_error: Option<String>,
}

/// Per-owner email alert preferences.
#[derive(Debug, Clone)]
pub struct EmailPref {
    pub owner_email: String,
    pub alerts_enabled: bool,
    pub min_confidence: f64,
    /// Empty means all categories.
    pub categories: Vec<String>,
    pub max_alerts_per_hour: u32,
}

impl EmailPref {
    pub fn accepts_category(&self, category: &str) -> bool {
        self.categories.is_empty() || self.categories.iter().any(|c| c == category)
    }
}

/// One durable `webhook_queue` row awaiting delivery.
#[derive(Debug, Clone)]
pub struct QueuedDelivery {
    pub id: i64,
    pub webhook_id: i64,
    pub event: String,
    pub payload: Value,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}

/// Outbound webhook envelope; serialized as the POST body.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub event: String,
    /// ISO-8601 UTC.
    pub timestamp: String,
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            timestamp: Utc::now().to_rfc3339(),
            data,
        }
    }
}

/// Email alert priority, scored per event. Controls throttle multipliers and
/// digest routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Throttle multiplier: the effective hourly limit is
    /// `max_alerts_per_hour * multiplier`. `None` bypasses the throttle
    /// entirely; zero routes straight to the digest.
    pub fn throttle_multiplier(&self) -> Option<u32> {
        match self {
            Priority::Critical => None,
            Priority::High => Some(3),
            Priority::Medium => Some(1),
            Priority::Low => Some(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_filter() {
        let mut pref = EmailPref {
            owner_email: "a@b.c".to_string(),
            alerts_enabled: true,
            min_confidence: 0.0,
            categories: vec![],
            max_alerts_per_hour: 10,
        };
        assert!(pref.accepts_category("crypto"));
        pref.categories = vec!["politics".to_string()];
        assert!(!pref.accepts_category("crypto"));
        assert!(pref.accepts_category("politics"));
    }

    #[test]
    fn test_multipliers() {
        assert_eq!(Priority::Critical.throttle_multiplier(), None);
        assert_eq!(Priority::High.throttle_multiplier(), Some(3));
        assert_eq!(Priority::Medium.throttle_multiplier(), Some(1));
        assert_eq!(Priority::Low.throttle_multiplier(), Some(0));
    }
}
