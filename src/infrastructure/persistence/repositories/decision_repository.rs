use crate::domain::decisions::{DecisionOutcome, DecisionRecord, GateStat, NewDecision};
use crate::domain::repositories::DecisionRepository;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::parse_ts;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

pub struct SqliteDecisionRepository {
    database: Database,
}

impl SqliteDecisionRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn from_row(row: &SqliteRow) -> Result<DecisionRecord> {
        let outcome: String = row.try_get("outcome")?;
        let scores: String = row.try_get("scores")?;
        let gate_details: String = row.try_get("gate_details")?;
        let snapshot: String = row.try_get("signal_snapshot")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(DecisionRecord {
            id: row.try_get("id")?,
            signal_id: row.try_get("signal_id")?,
            market_id: row.try_get("market_id")?,
            outcome: DecisionOutcome::parse(&outcome)
                .with_context(|| format!("unknown decision outcome: {}", outcome))?,
            blocking_gate: row.try_get("blocking_gate")?,
            gates_passed: row.try_get("gates_passed")?,
            gates_total: row.try_get("gates_total")?,
            near_miss: row.try_get::<i64, _>("near_miss")? != 0,
            scores: serde_json::from_str(&scores).unwrap_or(serde_json::Value::Null),
            gate_details: serde_json::from_str(&gate_details).unwrap_or(serde_json::Value::Null),
            signal_snapshot: serde_json::from_str(&snapshot).unwrap_or(serde_json::Value::Null),
            created_at: parse_ts(&created_at),
        })
    }
}

#[async_trait]
impl DecisionRepository for SqliteDecisionRepository {
    async fn insert(&self, decision: &NewDecision) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO decision_log (
                signal_id, market_id, outcome, blocking_gate, gates_passed,
                gates_total, near_miss, scores, gate_details, signal_snapshot,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&decision.signal_id)
        .bind(&decision.market_id)
        .bind(decision.outcome.as_str())
        .bind(&decision.blocking_gate)
        .bind(decision.gates_passed)
        .bind(decision.gates_total)
        .bind(decision.near_miss as i64)
        .bind(decision.scores.to_string())
        .bind(decision.gate_details.to_string())
        .bind(decision.signal_snapshot.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.database.pool)
        .await
        .context("Failed to insert decision record")?;
        Ok(result.last_insert_rowid())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DecisionRecord>> {
        let rows = sqlx::query("SELECT * FROM decision_log ORDER BY id DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.database.pool)
            .await
            .context("Failed to load recent decisions")?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn near_misses(&self, days: i64, limit: i64) -> Result<Vec<DecisionRecord>> {
        let since = (Utc::now() - Duration::days(days)).to_rfc3339();
        let rows = sqlx::query(
            r#"
            SELECT * FROM decision_log
            WHERE near_miss = 1 AND created_at >= $1
            ORDER BY id DESC LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to load near misses")?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn gate_stats(&self, days: i64) -> Result<(i64, i64, Vec<GateStat>)> {
        let since = (Utc::now() - Duration::days(days)).to_rfc3339();

        let (total, blocked): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN outcome = 'blocked' THEN 1 ELSE 0 END), 0)
            FROM decision_log WHERE created_at >= $1
            "#,
        )
        .bind(&since)
        .fetch_one(&self.database.pool)
        .await
        .context("Failed to aggregate decisions")?;

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT blocking_gate, COUNT(*) FROM decision_log
            WHERE outcome = 'blocked' AND blocking_gate IS NOT NULL AND created_at >= $1
            GROUP BY blocking_gate
            ORDER BY COUNT(*) DESC
            "#,
        )
        .bind(&since)
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to aggregate gate blocks")?;

        let per_gate = rows
            .into_iter()
            .map(|(gate, blocks)| GateStat { gate, blocks })
            .collect();
        Ok((total, blocked, per_gate))
    }
}
