use crate::domain::audit::{AuditEvent, AuditFilter};
use crate::domain::repositories::AuditRepository;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::parse_ts;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Append-only repository over `trade_audit_log`. There is deliberately no
/// UPDATE or DELETE here.
pub struct SqliteAuditRepository {
    database: Database,
}

impl SqliteAuditRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn from_row(row: &SqliteRow) -> Result<AuditEvent> {
        let detail: String = row.try_get("detail")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(AuditEvent {
            id: row.try_get("id")?,
            event_type: row.try_get("event_type")?,
            execution_id: row.try_get("execution_id")?,
            detail: serde_json::from_str(&detail).unwrap_or(serde_json::Value::Null),
            dry_run: row.try_get::<i64, _>("dry_run")? != 0,
            created_at: parse_ts(&created_at),
        })
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn append(
        &self,
        event_type: &str,
        execution_id: Option<i64>,
        detail: &serde_json::Value,
        dry_run: bool,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO trade_audit_log (event_type, execution_id, detail, dry_run, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event_type)
        .bind(execution_id)
        .bind(detail.to_string())
        .bind(dry_run as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.database.pool)
        .await
        .context("Failed to append audit event")?;
        Ok(result.last_insert_rowid())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let mut sql = String::from("SELECT * FROM trade_audit_log WHERE 1=1");
        if filter.event_type.is_some() {
            sql.push_str(" AND event_type = $1");
        }
        if filter.execution_id.is_some() {
            sql.push_str(" AND execution_id = $2");
        }
        if filter.since.is_some() {
            sql.push_str(" AND created_at >= $3");
        }
        sql.push_str(" ORDER BY id DESC LIMIT $4");

        let rows = sqlx::query(&sql)
            .bind(filter.event_type.clone().unwrap_or_default())
            .bind(filter.execution_id.unwrap_or_default())
            .bind(filter.since.map(|t| t.to_rfc3339()).unwrap_or_default())
            .bind(filter.limit.unwrap_or(100))
            .fetch_all(&self.database.pool)
            .await
            .context("Failed to query audit log")?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn counts_since(&self, since: DateTime<Utc>) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT event_type, COUNT(*) FROM trade_audit_log
            WHERE created_at >= $1
            GROUP BY event_type
            ORDER BY COUNT(*) DESC
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to summarize audit log")?;
        Ok(rows)
    }

    async fn trail(&self, execution_id: i64) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM trade_audit_log WHERE execution_id = $1 ORDER BY id ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to load execution trail")?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn last_event_for_execution(&self, execution_id: i64) -> Result<Option<AuditEvent>> {
        let row = sqlx::query(
            "SELECT * FROM trade_audit_log WHERE execution_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(execution_id)
        .fetch_optional(&self.database.pool)
        .await
        .context("Failed to load last audit event")?;
        row.as_ref().map(Self::from_row).transpose()
    }
}
