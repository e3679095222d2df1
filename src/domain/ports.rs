//! Ports to external collaborators: the CLOB venue and the email transport.

use crate::domain::errors::VenueError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// A market (taker) order against one outcome token.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: OrderSide,
    /// Book-derived marketable price, quoted in [0, 1].
    pub price: f64,
    /// Outcome-token shares.
    pub size: f64,
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Live,
    Matched,
    Cancelled,
    Expired,
    Rejected,
}

impl OrderState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "live" => Some(OrderState::Live),
            "matched" => Some(OrderState::Matched),
            "cancelled" | "canceled" => Some(OrderState::Cancelled),
            "expired" => Some(OrderState::Expired),
            "rejected" => Some(OrderState::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderState::Live)
    }
}

#[derive(Debug, Clone)]
pub struct OrderStatus {
    pub state: OrderState,
    pub size: f64,
    pub size_matched: f64,
    pub average_price: Option<f64>,
}

/// Best-of-book summary derived from the venue's ladder.
#[derive(Debug, Clone, Copy)]
pub struct BookSummary {
    pub best_bid: f64,
    pub best_ask: f64,
    /// Resting size at the bid / ask, in shares.
    pub bid_liquidity: f64,
    pub ask_liquidity: f64,
    pub spread: f64,
}

impl BookSummary {
    pub fn mid(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }

    /// Crude taker-slippage estimate for a marketable order on `side`:
    /// distance from mid to the touch, as a percentage of mid.
    pub fn estimated_slippage_pct(&self, side: OrderSide) -> f64 {
        let mid = self.mid();
        if mid <= 0.0 {
            return 0.0;
        }
        let touch = match side {
            OrderSide::Buy => self.best_ask,
            OrderSide::Sell => self.best_bid,
        };
        ((touch - mid).abs() / mid) * 100.0
    }
}

/// The CLOB venue contract (§6). One implementation speaks HTTP; tests use
/// scripted fakes.
#[async_trait]
pub trait ClobVenue: Send + Sync {
    async fn place_order(&self, req: &OrderRequest) -> Result<PlacedOrder, VenueError>;
    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, VenueError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;
    /// Mark price for one outcome token.
    async fn mark_price(&self, token_id: &str) -> Result<f64, VenueError>;
    async fn orderbook(&self, token_id: &str) -> Result<BookSummary, VenueError>;
    /// Spendable collateral balance in USD.
    async fn balance(&self) -> Result<f64, VenueError>;
}

/// Outbound email seam. Transports (SMTP, provider APIs) live outside the
/// core; tests and the default wiring use a logging stub.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}
