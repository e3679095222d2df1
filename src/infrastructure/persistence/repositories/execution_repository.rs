use crate::domain::repositories::ExecutionRepository;
use crate::domain::trading::types::{Execution, ExecutionStatus, NewExecution, Side};
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::parse_ts;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

pub struct SqliteExecutionRepository {
    database: Database,
}

impl SqliteExecutionRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn from_row(row: &SqliteRow) -> Result<Execution> {
        let side_str: String = row.try_get("side")?;
        let status_str: String = row.try_get("status")?;
        let opened_at: String = row.try_get("opened_at")?;
        let closed_at: Option<String> = row.try_get("closed_at")?;

        Ok(Execution {
            id: row.try_get("id")?,
            signal_id: row.try_get("signal_id")?,
            market_id: row.try_get("market_id")?,
            token_id: row.try_get("token_id")?,
            side: Side::parse(&side_str)
                .with_context(|| format!("unknown side in trade_executions: {}", side_str))?,
            amount_usd: row.try_get("amount_usd")?,
            entry_price: row.try_get("entry_price")?,
            fill_price: row.try_get("fill_price")?,
            exit_price: row.try_get("exit_price")?,
            pnl_usd: row.try_get("pnl_usd")?,
            pnl_pct: row.try_get("pnl_pct")?,
            status: ExecutionStatus::parse(&status_str)
                .with_context(|| format!("unknown status in trade_executions: {}", status_str))?,
            dry_run: row.try_get::<i64, _>("dry_run")? != 0,
            order_id: row.try_get("order_id")?,
            edge: row.try_get("edge")?,
            confidence: row.try_get("confidence")?,
            quality_score: row.try_get("quality_score")?,
            regime: row.try_get("regime")?,
            category: row.try_get("category")?,
            sizing_method: row.try_get("sizing_method")?,
            slippage_bps: row.try_get("slippage_bps")?,
            close_reason: row.try_get("close_reason")?,
            error: row.try_get("error")?,
            opened_at: parse_ts(&opened_at),
            closed_at: closed_at.as_deref().map(parse_ts),
        })
    }

    async fn fetch_where(&self, clause: &str, bind: Option<String>) -> Result<Vec<Execution>> {
        let sql = format!(
            "SELECT * FROM trade_executions WHERE {} ORDER BY id ASC",
            clause
        );
        let mut query = sqlx::query(&sql);
        if let Some(v) = bind {
            query = query.bind(v);
        }
        let rows = query
            .fetch_all(&self.database.pool)
            .await
            .context("Failed to query trade_executions")?;
        rows.iter().map(Self::from_row).collect()
    }
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    async fn insert(&self, new: &NewExecution) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO trade_executions (
                signal_id, market_id, token_id, side, amount_usd, entry_price,
                status, dry_run, order_id, edge, confidence, quality_score,
                regime, category, sizing_method, error, opened_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&new.signal_id)
        .bind(&new.market_id)
        .bind(&new.token_id)
        .bind(new.side.as_str())
        .bind(new.amount_usd)
        .bind(new.entry_price)
        .bind(new.status.as_str())
        .bind(new.dry_run as i64)
        .bind(&new.order_id)
        .bind(new.edge)
        .bind(new.confidence)
        .bind(new.quality_score)
        .bind(&new.regime)
        .bind(&new.category)
        .bind(&new.sizing_method)
        .bind(&new.error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.database.pool)
        .await
        .context("Failed to insert execution")?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Option<Execution>> {
        let row = sqlx::query("SELECT * FROM trade_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.database.pool)
            .await
            .context("Failed to load execution")?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn get_open(&self) -> Result<Vec<Execution>> {
        self.fetch_where("status = 'open'", None).await
    }

    async fn get_by_signal(&self, signal_id: &str) -> Result<Vec<Execution>> {
        self.fetch_where("signal_id = $1", Some(signal_id.to_string()))
            .await
    }

    async fn open_count(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trade_executions WHERE status = 'open'")
                .fetch_one(&self.database.pool)
                .await
                .context("Failed to count open executions")?;
        Ok(count)
    }

    async fn has_open_on_market(&self, market_id: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trade_executions WHERE status = 'open' AND market_id = $1",
        )
        .bind(market_id)
        .fetch_one(&self.database.pool)
        .await
        .context("Failed to check open position on market")?;
        Ok(count > 0)
    }

    async fn last_trade_on_market(&self, market_id: &str) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT opened_at FROM trade_executions WHERE market_id = $1
             ORDER BY opened_at DESC LIMIT 1",
        )
        .bind(market_id)
        .fetch_optional(&self.database.pool)
        .await
        .context("Failed to load last trade time for market")?;
        Ok(row.map(|(ts,)| parse_ts(&ts)))
    }

    async fn close(
        &self,
        id: i64,
        exit_price: f64,
        pnl_usd: f64,
        pnl_pct: f64,
        close_reason: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trade_executions
            SET status = 'closed', exit_price = $2, pnl_usd = $3, pnl_pct = $4,
                close_reason = $5, closed_at = $6
            WHERE id = $1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(exit_price)
        .bind(pnl_usd)
        .bind(pnl_pct)
        .bind(close_reason)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.database.pool)
        .await
        .context("Failed to close execution")?;
        Ok(())
    }

    async fn fail(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trade_executions
            SET status = 'failed', error = $2, closed_at = $3
            WHERE id = $1 AND status != 'closed'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.database.pool)
        .await
        .context("Failed to mark execution failed")?;
        Ok(())
    }

    async fn cancel(&self, id: i64, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trade_executions
            SET status = 'cancelled', close_reason = $2, closed_at = $3
            WHERE id = $1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.database.pool)
        .await
        .context("Failed to cancel execution")?;
        Ok(())
    }

    async fn cancel_all_open(&self, reason: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE trade_executions
            SET status = 'cancelled', close_reason = $1, closed_at = $2
            WHERE status = 'open'
            "#,
        )
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.database.pool)
        .await
        .context("Failed to cancel open executions")?;
        Ok(result.rows_affected())
    }

    async fn set_order_id(&self, id: i64, order_id: &str) -> Result<()> {
        sqlx::query("UPDATE trade_executions SET order_id = $2 WHERE id = $1")
            .bind(id)
            .bind(order_id)
            .execute(&self.database.pool)
            .await
            .context("Failed to set order id")?;
        Ok(())
    }

    async fn set_fill(&self, id: i64, fill_price: f64, slippage_bps: f64) -> Result<()> {
        sqlx::query(
            "UPDATE trade_executions SET fill_price = $2, slippage_bps = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(fill_price)
        .bind(slippage_bps)
        .execute(&self.database.pool)
        .await
        .context("Failed to record fill")?;
        Ok(())
    }

    async fn stale_open(&self, older_than_hours: i64) -> Result<Vec<Execution>> {
        let cutoff = (Utc::now() - Duration::hours(older_than_hours)).to_rfc3339();
        self.fetch_where("status = 'open' AND opened_at < $1", Some(cutoff))
            .await
    }

    async fn pnl_realized_since(&self, since: DateTime<Utc>) -> Result<f64> {
        let (sum,): (f64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(pnl_usd), 0.0) FROM trade_executions
            WHERE status = 'closed' AND closed_at >= $1
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_one(&self.database.pool)
        .await
        .context("Failed to sum realized pnl")?;
        Ok(sum)
    }
}
