use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Singleton database wrapper. The embedded store is the single source of
/// truth for durable state; every table is created by `init` at startup.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        // A pooled in-memory database needs a shared cache and a single
        // connection, or every pool member sees its own empty database.
        let in_memory = db_url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal); // Better for concurrency
        if in_memory {
            options = options.shared_cache(true);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Trade executions: one row per attempted trade, live or simulated
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signal_id TEXT NOT NULL,
                market_id TEXT NOT NULL,
                token_id TEXT NOT NULL,
                side TEXT NOT NULL CHECK (side IN ('UP', 'DOWN')),
                amount_usd REAL NOT NULL,
                entry_price REAL NOT NULL,
                fill_price REAL,
                exit_price REAL,
                pnl_usd REAL,
                pnl_pct REAL,
                status TEXT NOT NULL DEFAULT 'open'
                    CHECK (status IN ('open', 'closed', 'cancelled', 'failed')),
                dry_run INTEGER NOT NULL DEFAULT 0,
                order_id TEXT,
                edge REAL NOT NULL DEFAULT 0,
                confidence REAL NOT NULL DEFAULT 0,
                quality_score REAL NOT NULL DEFAULT 0,
                regime TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                sizing_method TEXT NOT NULL DEFAULT '',
                slippage_bps REAL,
                close_reason TEXT,
                error TEXT,
                opened_at TEXT NOT NULL,
                closed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_executions_status
            ON trade_executions (status);
            CREATE INDEX IF NOT EXISTS idx_executions_market
            ON trade_executions (market_id);
            CREATE INDEX IF NOT EXISTS idx_executions_opened_at
            ON trade_executions (opened_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trade_executions table")?;

        // 2. Audit log: append-only, never updated or deleted
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                execution_id INTEGER,
                detail TEXT NOT NULL DEFAULT '{}',
                dry_run INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_event_type
            ON trade_audit_log (event_type, created_at);
            CREATE INDEX IF NOT EXISTS idx_audit_execution
            ON trade_audit_log (execution_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trade_audit_log table")?;

        // 3. Bot control singleton
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_control (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state TEXT NOT NULL
                    CHECK (state IN ('running', 'paused', 'stopped', 'draining')),
                changed_at TEXT NOT NULL,
                reason TEXT NOT NULL DEFAULT ''
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create bot_control table")?;

        // 4. Runtime trading config
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trading_config (
                key TEXT PRIMARY KEY,
                value REAL NOT NULL,
                updated_at TEXT NOT NULL,
                updated_by TEXT NOT NULL DEFAULT 'system'
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trading_config table")?;

        // 5. Decision log: gate tree per evaluated signal
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decision_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signal_id TEXT NOT NULL,
                market_id TEXT NOT NULL,
                outcome TEXT NOT NULL
                    CHECK (outcome IN ('executed', 'blocked', 'dry_run')),
                blocking_gate TEXT,
                gates_passed INTEGER NOT NULL,
                gates_total INTEGER NOT NULL,
                near_miss INTEGER NOT NULL DEFAULT 0,
                scores TEXT NOT NULL DEFAULT '{}',
                gate_details TEXT NOT NULL DEFAULT '{}',
                signal_snapshot TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_decisions_created
            ON decision_log (created_at);
            CREATE INDEX IF NOT EXISTS idx_decisions_near_miss
            ON decision_log (near_miss, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create decision_log table")?;

        // 6. Webhooks
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS webhooks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_email TEXT NOT NULL,
                url TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                active INTEGER NOT NULL DEFAULT 1,
                success_count INTEGER NOT NULL DEFAULT 0,
                fail_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_webhooks_owner
            ON webhooks (owner_email);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create webhooks table")?;

        // 7. Email preferences
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS email_prefs (
                owner_email TEXT PRIMARY KEY,
                alerts_enabled INTEGER NOT NULL DEFAULT 1,
                min_confidence REAL NOT NULL DEFAULT 0,
                categories TEXT NOT NULL DEFAULT '[]'
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create email_prefs table")?;

        // Migration: add max_alerts_per_hour for databases created before the
        // throttle existed. Ignore the error if the column is already there.
        let _ = sqlx::query(
            "ALTER TABLE email_prefs ADD COLUMN max_alerts_per_hour INTEGER NOT NULL DEFAULT 10",
        )
        .execute(&mut *conn)
        .await;

        // 8. Durable webhook delivery queue
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS webhook_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                webhook_id INTEGER NOT NULL,
                event TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'queued'
                    CHECK (status IN ('queued', 'delivered', 'failed')),
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL,
                delivered_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_webhook_queue_status
            ON webhook_queue (status, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create webhook_queue table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
