use crate::domain::notify::QueuedDelivery;
use crate::domain::repositories::WebhookQueueRepository;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::parse_ts;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

pub struct SqliteWebhookQueueRepository {
    database: Database,
}

impl SqliteWebhookQueueRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl WebhookQueueRepository for SqliteWebhookQueueRepository {
    async fn enqueue(
        &self,
        webhook_id: i64,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_queue (webhook_id, event, payload, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(webhook_id)
        .bind(event)
        .bind(payload.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.database.pool)
        .await
        .context("Failed to enqueue webhook delivery")?;
        Ok(result.last_insert_rowid())
    }

    async fn next_batch(&self, limit: i64) -> Result<Vec<QueuedDelivery>> {
        let rows: Vec<(i64, i64, String, String, i64, String)> = sqlx::query_as(
            r#"
            SELECT id, webhook_id, event, payload, attempts, created_at
            FROM webhook_queue
            WHERE status = 'queued'
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to load queued webhook deliveries")?;

        Ok(rows
            .into_iter()
            .map(
                |(id, webhook_id, event, payload, attempts, created_at)| QueuedDelivery {
                    id,
                    webhook_id,
                    event,
                    payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                    attempts,
                    created_at: parse_ts(&created_at),
                },
            )
            .collect())
    }

    async fn mark_delivered(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET status = 'delivered', attempts = attempts + 1, delivered_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.database.pool)
        .await
        .context("Failed to mark delivery as delivered")?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET status = 'failed', attempts = attempts + 1, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.database.pool)
        .await
        .context("Failed to mark delivery as failed")?;
        Ok(())
    }

    async fn queued_count(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM webhook_queue WHERE status = 'queued'")
                .fetch_one(&self.database.pool)
                .await
                .context("Failed to count queued deliveries")?;
        Ok(count)
    }
}
