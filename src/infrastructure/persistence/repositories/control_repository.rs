use crate::domain::control::{BotState, ControlRow};
use crate::domain::repositories::ControlRepository;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::parse_ts;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

pub struct SqliteControlRepository {
    database: Database,
}

impl SqliteControlRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl ControlRepository for SqliteControlRepository {
    async fn load(&self) -> Result<Option<ControlRow>> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT state, changed_at, reason FROM bot_control WHERE id = 1")
                .fetch_optional(&self.database.pool)
                .await
                .context("Failed to load bot control row")?;

        Ok(row.and_then(|(state, changed_at, reason)| {
            BotState::parse(&state).map(|state| ControlRow {
                state,
                changed_at: parse_ts(&changed_at),
                reason,
            })
        }))
    }

    async fn save(&self, state: &str, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bot_control (id, state, changed_at, reason)
            VALUES (1, $1, $2, $3)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                changed_at = excluded.changed_at,
                reason = excluded.reason
            "#,
        )
        .bind(state)
        .bind(Utc::now().to_rfc3339())
        .bind(reason)
        .execute(&self.database.pool)
        .await
        .context("Failed to save bot control row")?;
        Ok(())
    }
}
