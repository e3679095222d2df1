//! CLOB wire types. Prices and sizes travel as strings on this venue.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderBody {
    #[serde(rename = "tokenID")]
    pub token_id: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub price: String,
    pub size: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderResponse {
    #[serde(rename = "orderID")]
    pub order_id: Option<String>,
    pub id: Option<String>,
    pub error: Option<String>,
}

impl PlaceOrderResponse {
    /// The venue answers with `orderID` on one code path and `id` on another.
    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref().or(self.id.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusResponse {
    pub status: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub size_matched: Option<String>,
    #[serde(default)]
    pub size_remaining: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub average_price: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    pub price: serde_json::Value,
}

impl PriceResponse {
    pub fn as_f64(&self) -> Option<f64> {
        match &self.price {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub size: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookResponse {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    pub balance: serde_json::Value,
}

impl BalanceResponse {
    pub fn as_f64(&self) -> Option<f64> {
        match &self.balance {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }
}

pub(crate) fn parse_size(s: &Option<String>) -> f64 {
    s.as_deref()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_fallback() {
        let r: PlaceOrderResponse =
            serde_json::from_str(r#"{"orderID": "abc"}"#).unwrap();
        assert_eq!(r.order_id(), Some("abc"));
        let r: PlaceOrderResponse = serde_json::from_str(r#"{"id": "xyz"}"#).unwrap();
        assert_eq!(r.order_id(), Some("xyz"));
    }

    #[test]
    fn test_price_accepts_string_or_number() {
        let r: PriceResponse = serde_json::from_str(r#"{"price": "0.55"}"#).unwrap();
        assert_eq!(r.as_f64(), Some(0.55));
        let r: PriceResponse = serde_json::from_str(r#"{"price": 0.55}"#).unwrap();
        assert_eq!(r.as_f64(), Some(0.55));
    }
}
