use crate::domain::repositories::ConfigRepository;
use crate::domain::settings::ConfigRow;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::parse_ts;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

pub struct SqliteConfigRepository {
    database: Database,
}

impl SqliteConfigRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl ConfigRepository for SqliteConfigRepository {
    async fn load_all(&self) -> Result<Vec<ConfigRow>> {
        let rows: Vec<(String, f64, String, String)> =
            sqlx::query_as("SELECT key, value, updated_at, updated_by FROM trading_config")
                .fetch_all(&self.database.pool)
                .await
                .context("Failed to load trading config")?;

        Ok(rows
            .into_iter()
            .map(|(key, value, updated_at, updated_by)| ConfigRow {
                key,
                value,
                updated_at: parse_ts(&updated_at),
                updated_by,
            })
            .collect())
    }

    /// All-or-nothing batch upsert. Validation happens in the config store;
    /// by the time changes reach here they are committed together.
    async fn upsert_many(&self, changes: &[(String, f64)], actor: &str) -> Result<()> {
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .context("Failed to begin config transaction")?;

        let now = Utc::now().to_rfc3339();
        for (key, value) in changes {
            sqlx::query(
                r#"
                INSERT INTO trading_config (key, value, updated_at, updated_by)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at,
                    updated_by = excluded.updated_by
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(&now)
            .bind(actor)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert config key {}", key))?;
        }

        tx.commit().await.context("Failed to commit config changes")?;
        Ok(())
    }
}
