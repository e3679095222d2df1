mod audit_repository;
mod config_repository;
mod control_repository;
mod decision_repository;
mod email_pref_repository;
mod execution_repository;
mod webhook_queue_repository;
mod webhook_repository;

pub use audit_repository::SqliteAuditRepository;
pub use config_repository::SqliteConfigRepository;
pub use control_repository::SqliteControlRepository;
pub use decision_repository::SqliteDecisionRepository;
pub use email_pref_repository::SqliteEmailPrefRepository;
pub use execution_repository::SqliteExecutionRepository;
pub use webhook_queue_repository::SqliteWebhookQueueRepository;
pub use webhook_repository::SqliteWebhookRepository;

use chrono::{DateTime, Utc};

/// Timestamps are persisted as ISO-8601 UTC strings; unparseable values fall
/// back to the epoch rather than poisoning a whole result set.
pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
