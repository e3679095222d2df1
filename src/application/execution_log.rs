//! Execution log: the durable record of every intended trade.

use crate::domain::repositories::ExecutionRepository;
use crate::domain::trading::types::{Execution, NewExecution};
use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;

pub struct ExecutionLog {
    repo: Arc<dyn ExecutionRepository>,
}

impl ExecutionLog {
    pub fn new(repo: Arc<dyn ExecutionRepository>) -> Arc<Self> {
        Arc::new(Self { repo })
    }

    pub async fn log_execution(&self, new: &NewExecution) -> Result<i64> {
        self.repo.insert(new).await
    }

    pub async fn close_execution(
        &self,
        id: i64,
        exit_price: f64,
        pnl_usd: f64,
        pnl_pct: f64,
        close_reason: &str,
    ) -> Result<()> {
        self.repo
            .close(id, exit_price, pnl_usd, pnl_pct, close_reason)
            .await
    }

    pub async fn fail_execution(&self, id: i64, error: &str) -> Result<()> {
        self.repo.fail(id, error).await
    }

    /// Admin cancellation; the row keeps its entry data, status becomes
    /// `cancelled`.
    pub async fn cancel_execution(&self, id: i64) -> Result<()> {
        self.repo.cancel(id, "admin_cancel").await
    }

    pub async fn cancel_all_open(&self) -> Result<u64> {
        self.repo.cancel_all_open("admin_cancel_all").await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Execution>> {
        self.repo.get(id).await
    }

    pub async fn get_open(&self) -> Result<Vec<Execution>> {
        self.repo.get_open().await
    }

    pub async fn get_by_signal(&self, signal_id: &str) -> Result<Vec<Execution>> {
        self.repo.get_by_signal(signal_id).await
    }

    pub async fn get_open_count(&self) -> Result<i64> {
        self.repo.open_count().await
    }

    pub async fn has_open_position_on_market(&self, market_id: &str) -> Result<bool> {
        self.repo.has_open_on_market(market_id).await
    }

    /// A market is cooling down for `minutes` after any trade on it,
    /// regardless of how that trade ended.
    pub async fn is_market_on_cooldown(&self, market_id: &str, minutes: i64) -> Result<bool> {
        match self.repo.last_trade_on_market(market_id).await? {
            Some(last) => Ok(Utc::now() - last < Duration::minutes(minutes)),
            None => Ok(false),
        }
    }

    pub async fn set_order_id(&self, id: i64, order_id: &str) -> Result<()> {
        self.repo.set_order_id(id, order_id).await
    }

    pub async fn set_fill(&self, id: i64, fill_price: f64, slippage_bps: f64) -> Result<()> {
        self.repo.set_fill(id, fill_price, slippage_bps).await
    }
}
