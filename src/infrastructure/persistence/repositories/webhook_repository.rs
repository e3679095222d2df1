use crate::domain::notify::Webhook;
use crate::domain::repositories::WebhookRepository;
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::warn;

const MAX_WEBHOOKS_PER_OWNER: i64 = 5;
const DEACTIVATION_THRESHOLD: i64 = 10;

pub struct SqliteWebhookRepository {
    database: Database,
}

impl SqliteWebhookRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn from_row(row: &SqliteRow) -> Result<Webhook> {
        Ok(Webhook {
            id: row.try_get("id")?,
            owner_email: row.try_get("owner_email")?,
            url: row.try_get("url")?,
            name: row.try_get("name")?,
            active: row.try_get::<i64, _>("active")? != 0,
            success_count: row.try_get("success_count")?,
            fail_count: row.try_get("fail_count")?,
            last_error: row.try_get("last_error")?,
        })
    }
}

#[async_trait]
impl WebhookRepository for SqliteWebhookRepository {
    async fn create(&self, owner_email: &str, url: &str, name: &str) -> Result<Webhook> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM webhooks WHERE owner_email = $1")
                .bind(owner_email)
                .fetch_one(&self.database.pool)
                .await
                .context("Failed to count webhooks for owner")?;
        if count >= MAX_WEBHOOKS_PER_OWNER {
            anyhow::bail!(
                "webhook limit reached for {} ({} max)",
                owner_email,
                MAX_WEBHOOKS_PER_OWNER
            );
        }

        let result = sqlx::query(
            "INSERT INTO webhooks (owner_email, url, name) VALUES ($1, $2, $3)",
        )
        .bind(owner_email)
        .bind(url)
        .bind(name)
        .execute(&self.database.pool)
        .await
        .context("Failed to create webhook")?;

        Ok(Webhook {
            id: result.last_insert_rowid(),
            owner_email: owner_email.to_string(),
            url: url.to_string(),
            name: name.to_string(),
            active: true,
            success_count: 0,
            fail_count: 0,
            last_error: None,
        })
    }

    async fn list_active(&self) -> Result<Vec<Webhook>> {
        let rows = sqlx::query("SELECT * FROM webhooks WHERE active = 1 ORDER BY id ASC")
            .fetch_all(&self.database.pool)
            .await
            .context("Failed to list active webhooks")?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn list_for_owner(&self, owner_email: &str) -> Result<Vec<Webhook>> {
        let rows = sqlx::query("SELECT * FROM webhooks WHERE owner_email = $1 ORDER BY id ASC")
            .bind(owner_email)
            .fetch_all(&self.database.pool)
            .await
            .context("Failed to list webhooks for owner")?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn get(&self, id: i64) -> Result<Option<Webhook>> {
        let row = sqlx::query("SELECT * FROM webhooks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.database.pool)
            .await
            .context("Failed to load webhook")?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn record_success(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhooks
            SET success_count = success_count + 1, fail_count = 0, last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.database.pool)
        .await
        .context("Failed to record webhook success")?;
        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<bool> {
        sqlx::query(
            "UPDATE webhooks SET fail_count = fail_count + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.database.pool)
        .await
        .context("Failed to record webhook failure")?;

        let (fail_count,): (i64,) = sqlx::query_as("SELECT fail_count FROM webhooks WHERE id = $1")
            .bind(id)
            .fetch_one(&self.database.pool)
            .await
            .context("Failed to read webhook fail count")?;

        if fail_count >= DEACTIVATION_THRESHOLD {
            warn!(
                "WebhookRepository: webhook {} hit {} consecutive failures, deactivating",
                id, fail_count
            );
            self.set_active(id, false).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE webhooks SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active as i64)
            .execute(&self.database.pool)
            .await
            .context("Failed to update webhook active flag")?;
        Ok(())
    }
}
