//! Shared fixtures: scripted venue, recording email transport, test wiring.

use async_trait::async_trait;
use polysignal::config::Settings;
use polysignal::domain::errors::VenueError;
use polysignal::domain::ports::{
    BookSummary, ClobVenue, EmailTransport, OrderRequest, OrderState, OrderStatus, PlacedOrder,
};
use polysignal::domain::signal::{EnterSignal, SignalAction, SignalStrength};
use polysignal::domain::trading::types::Side;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Venue fake with per-token scripted price sequences. The last scripted
/// price repeats once the script runs out; with no script the call fails
/// like an unreachable venue.
pub struct MockVenue {
    prices: Mutex<HashMap<String, VecDeque<f64>>>,
    last_price: Mutex<HashMap<String, f64>>,
    pub orders: Mutex<Vec<OrderRequest>>,
    pub balance: Mutex<f64>,
    pub fail_prices: AtomicBool,
    order_seq: AtomicU64,
}

impl MockVenue {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            last_price: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            balance: Mutex::new(1_000.0),
            fail_prices: AtomicBool::new(false),
            order_seq: AtomicU64::new(0),
        }
    }

    pub fn script_prices(&self, token_id: &str, prices: &[f64]) {
        self.prices
            .lock()
            .unwrap()
            .insert(token_id.to_string(), prices.iter().copied().collect());
    }

    pub fn sell_orders(&self) -> Vec<OrderRequest> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.side == polysignal::domain::ports::OrderSide::Sell)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ClobVenue for MockVenue {
    async fn place_order(&self, req: &OrderRequest) -> Result<PlacedOrder, VenueError> {
        self.orders.lock().unwrap().push(req.clone());
        let n = self.order_seq.fetch_add(1, Ordering::SeqCst);
        Ok(PlacedOrder {
            order_id: format!("mock-{}", n),
        })
    }

    async fn order_status(&self, _order_id: &str) -> Result<OrderStatus, VenueError> {
        Ok(OrderStatus {
            state: OrderState::Matched,
            size: 0.0,
            size_matched: 0.0,
            average_price: None,
        })
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), VenueError> {
        Ok(())
    }

    async fn mark_price(&self, token_id: &str) -> Result<f64, VenueError> {
        if self.fail_prices.load(Ordering::SeqCst) {
            return Err(VenueError::Unavailable { status: 503 });
        }
        let mut scripts = self.prices.lock().unwrap();
        if let Some(script) = scripts.get_mut(token_id)
            && let Some(price) = script.pop_front()
        {
            self.last_price
                .lock()
                .unwrap()
                .insert(token_id.to_string(), price);
            return Ok(price);
        }
        self.last_price
            .lock()
            .unwrap()
            .get(token_id)
            .copied()
            .ok_or(VenueError::Unavailable { status: 503 })
    }

    async fn orderbook(&self, _token_id: &str) -> Result<BookSummary, VenueError> {
        Ok(BookSummary {
            best_bid: 0.49,
            best_ask: 0.51,
            bid_liquidity: 1_000.0,
            ask_liquidity: 1_000.0,
            spread: 0.02,
        })
    }

    async fn balance(&self) -> Result<f64, VenueError> {
        Ok(*self.balance.lock().unwrap())
    }
}

/// Email transport that records instead of sending.
#[derive(Default)]
pub struct RecordingEmail {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl EmailTransport for RecordingEmail {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

pub fn test_settings() -> Settings {
    let mut policy_defaults = HashMap::new();
    policy_defaults.insert("max_bet_usd".to_string(), 1.0);
    policy_defaults.insert("daily_loss_limit_usd".to_string(), 50.0);
    policy_defaults.insert("max_open_positions".to_string(), 5.0);
    policy_defaults.insert("take_profit_pct".to_string(), 15.0);
    policy_defaults.insert("stop_loss_pct".to_string(), -20.0);
    policy_defaults.insert("max_total_exposure_usd".to_string(), 100.0);
    policy_defaults.insert("max_category_concentration_pct".to_string(), 40.0);
    policy_defaults.insert("max_slippage_pct".to_string(), 5.0);
    policy_defaults.insert("min_balance_usd".to_string(), 5.0);
    policy_defaults.insert("trailing_stop_pct".to_string(), 5.0);
    policy_defaults.insert("breakeven_trigger_pct".to_string(), 8.0);
    policy_defaults.insert("max_hold_hours".to_string(), 6.0);
    policy_defaults.insert("min_settlement_minutes".to_string(), 30.0);
    policy_defaults.insert("max_spread".to_string(), 0.05);

    Settings {
        enable_trading: true,
        dry_run: true,
        database_url: "sqlite::memory:".to_string(),
        clob_base_url: "http://localhost:1".to_string(),
        clob_api_key: String::new(),
        clob_api_secret: String::new(),
        clob_passphrase: String::new(),
        dry_run_csv_path: std::env::temp_dir()
            .join(format!("polysignal-test-{}.csv", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string(),
        monitor_interval_secs: 60,
        market_cooldown_minutes: 5,
        max_poll_ms: 1_000,
        poll_interval_ms: 100,
        max_audit_age_hours: 72,
        balance_cache_ttl_secs: 30,
        policy_defaults,
    }
}

pub fn enter_signal(market_id: &str, side: Side) -> EnterSignal {
    EnterSignal {
        signal_id: format!("sig-{}", market_id),
        market_id: market_id.to_string(),
        slug: format!("{}-slug", market_id),
        question: "Will BTC be up in 15 minutes?".to_string(),
        category: "crypto".to_string(),
        action: SignalAction::Enter,
        strength: SignalStrength::Strong,
        side,
        phase: "mid".to_string(),
        settlement_left_min: 120.0,
        spread_up: Some(0.02),
        spread_down: Some(0.02),
        up_token_id: Some("T1".to_string()),
        down_token_id: Some("T2".to_string()),
        price_up: 0.50,
        price_down: 0.50,
        spot: Some(65_000.0),
        edge_up: 0.12,
        edge_down: 0.12,
        model_up: 0.62,
        confidence: 75.0,
        kelly: 0.05,
        regime: "trending".to_string(),
        quality_score: 0.8,
        btc_price: Some(65_000.0),
        price_to_beat: Some(64_900.0),
    }
}
