use crate::domain::notify::EmailPref;
use crate::domain::repositories::EmailPrefRepository;
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;

pub struct SqliteEmailPrefRepository {
    database: Database,
}

impl SqliteEmailPrefRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn from_tuple(row: (String, i64, f64, String, i64)) -> EmailPref {
        let (owner_email, alerts_enabled, min_confidence, categories, max_alerts_per_hour) = row;
        EmailPref {
            owner_email,
            alerts_enabled: alerts_enabled != 0,
            min_confidence,
            categories: serde_json::from_str(&categories).unwrap_or_default(),
            max_alerts_per_hour: max_alerts_per_hour.clamp(1, 100) as u32,
        }
    }
}

#[async_trait]
impl EmailPrefRepository for SqliteEmailPrefRepository {
    async fn upsert(&self, pref: &EmailPref) -> Result<()> {
        let categories =
            serde_json::to_string(&pref.categories).context("Failed to encode categories")?;
        sqlx::query(
            r#"
            INSERT INTO email_prefs (
                owner_email, alerts_enabled, min_confidence, categories, max_alerts_per_hour
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(owner_email) DO UPDATE SET
                alerts_enabled = excluded.alerts_enabled,
                min_confidence = excluded.min_confidence,
                categories = excluded.categories,
                max_alerts_per_hour = excluded.max_alerts_per_hour
            "#,
        )
        .bind(&pref.owner_email)
        .bind(pref.alerts_enabled as i64)
        .bind(pref.min_confidence)
        .bind(categories)
        .bind(pref.max_alerts_per_hour.clamp(1, 100) as i64)
        .execute(&self.database.pool)
        .await
        .context("Failed to upsert email preference")?;
        Ok(())
    }

    async fn get(&self, owner_email: &str) -> Result<Option<EmailPref>> {
        let row: Option<(String, i64, f64, String, i64)> = sqlx::query_as(
            r#"
            SELECT owner_email, alerts_enabled, min_confidence, categories, max_alerts_per_hour
            FROM email_prefs WHERE owner_email = $1
            "#,
        )
        .bind(owner_email)
        .fetch_optional(&self.database.pool)
        .await
        .context("Failed to load email preference")?;
        Ok(row.map(Self::from_tuple))
    }

    async fn all_enabled(&self) -> Result<Vec<EmailPref>> {
        let rows: Vec<(String, i64, f64, String, i64)> = sqlx::query_as(
            r#"
            SELECT owner_email, alerts_enabled, min_confidence, categories, max_alerts_per_hour
            FROM email_prefs WHERE alerts_enabled = 1
            "#,
        )
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to list enabled email preferences")?;
        Ok(rows.into_iter().map(Self::from_tuple).collect())
    }
}
