//! CLOB venue HTTP client
//!
//! Speaks the venue's JSON contract: market order placement, order status
//! polling, cancellation, mark prices, orderbook snapshots and the
//! collateral balance. Private requests carry HMAC-SHA256 headers.

use crate::domain::errors::VenueError;
use crate::domain::ports::{
    BookSummary, ClobVenue, OrderRequest, OrderState, OrderStatus, PlacedOrder,
};
use crate::infrastructure::clob::types::{
    BalanceResponse, OrderbookResponse, OrderStatusResponse, PlaceOrderBody, PlaceOrderResponse,
    PriceResponse, parse_size,
};
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use anyhow::anyhow;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use sha2::Sha256;

#[derive(Debug, Clone)]
pub struct ClobCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

pub struct ClobClient {
    /// Retrying client for read-side calls.
    client: ClientWithMiddleware,
    /// Non-retrying client for order placement (not idempotent).
    raw_client: ClientWithMiddleware,
    base_url: String,
    credentials: Option<ClobCredentials>,
}

impl ClobClient {
    pub fn new(base_url: String, credentials: Option<ClobCredentials>) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            raw_client: HttpClientFactory::create_raw_client(),
            base_url,
            credentials,
        }
    }

    /// `POLY_SIGNATURE = base64(HMAC-SHA256(secret, timestamp + METHOD + path + body))`
    fn sign(secret: &str, timestamp: i64, method: &str, path: &str, body: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;

        let message = format!("{}{}{}{}", timestamp, method, path, body);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn auth_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<Vec<(&'static str, String)>, VenueError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| VenueError::Other(anyhow!("CLOB credentials not configured")))?;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = Self::sign(&creds.api_secret, timestamp, method, path, body);
        Ok(vec![
            ("POLY_TIMESTAMP", timestamp.to_string()),
            ("POLY_API_KEY", creds.api_key.clone()),
            ("POLY_PASSPHRASE", creds.passphrase.clone()),
            ("POLY_SIGNATURE", signature),
        ])
    }

    fn classify(err: reqwest_middleware::Error) -> VenueError {
        match err {
            reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => VenueError::Timeout,
            other => VenueError::Other(anyhow!(other)),
        }
    }

    /// 429 and 5xx are transient; other non-success statuses carry the venue's
    /// error body and are final.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, VenueError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(VenueError::Unavailable {
                status: status.as_u16(),
            });
        }
        let body = response.text().await.unwrap_or_default();
        Err(VenueError::Rejected { body })
    }
}

#[async_trait]
impl ClobVenue for ClobClient {
    async fn place_order(&self, req: &OrderRequest) -> Result<PlacedOrder, VenueError> {
        let path = "/order";
        let body = PlaceOrderBody {
            token_id: req.token_id.clone(),
            side: req.side.as_str().to_string(),
            order_type: "MARKET".to_string(),
            price: format!("{:.4}", req.price),
            size: format!("{:.2}", req.size),
        };
        let body_json = serde_json::to_string(&body)
            .map_err(|e| VenueError::Malformed {
                reason: e.to_string(),
            })?;

        let mut request = self
            .raw_client
            .post(format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/json")
            .body(body_json.clone());
        for (name, value) in self.auth_headers("POST", path, &body_json)? {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(Self::classify)?;
        let response = Self::check_status(response).await?;

        let parsed: PlaceOrderResponse = response.json().await.map_err(|e| {
            VenueError::Malformed {
                reason: format!("order response: {}", e),
            }
        })?;

        if let Some(error) = parsed.error {
            return Err(VenueError::Rejected { body: error });
        }
        let order_id = parsed.order_id().ok_or_else(|| VenueError::Malformed {
            reason: "order response missing orderID".to_string(),
        })?;

        Ok(PlacedOrder {
            order_id: order_id.to_string(),
        })
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, VenueError> {
        let path = format!("/order/{}", order_id);

        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        for (name, value) in self.auth_headers("GET", &path, "")? {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(Self::classify)?;
        let response = Self::check_status(response).await?;

        let parsed: OrderStatusResponse = response.json().await.map_err(|e| {
            VenueError::Malformed {
                reason: format!("order status response: {}", e),
            }
        })?;

        let state = OrderState::parse(&parsed.status).ok_or_else(|| VenueError::Malformed {
            reason: format!("unknown order status: {}", parsed.status),
        })?;

        Ok(OrderStatus {
            state,
            size: parse_size(&parsed.size),
            size_matched: parse_size(&parsed.size_matched),
            average_price: parsed
                .average_price
                .as_deref()
                .and_then(|p| p.parse::<f64>().ok())
                .or_else(|| parsed.price.as_deref().and_then(|p| p.parse::<f64>().ok())),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        let path = format!("/order/{}", order_id);

        let mut request = self.raw_client.delete(format!("{}{}", self.base_url, path));
        for (name, value) in self.auth_headers("DELETE", &path, "")? {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(Self::classify)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn mark_price(&self, token_id: &str) -> Result<f64, VenueError> {
        let path = format!("/price?token_id={}&side=BUY", token_id);
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(Self::classify)?;
        let response = Self::check_status(response).await?;

        let parsed: PriceResponse = response.json().await.map_err(|e| VenueError::Malformed {
            reason: format!("price response: {}", e),
        })?;
        parsed.as_f64().ok_or_else(|| VenueError::Malformed {
            reason: "price response missing price".to_string(),
        })
    }

    async fn orderbook(&self, token_id: &str) -> Result<BookSummary, VenueError> {
        let path = format!("/orderbook?token_id={}", token_id);
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(Self::classify)?;
        let response = Self::check_status(response).await?;

        let parsed: OrderbookResponse =
            response.json().await.map_err(|e| VenueError::Malformed {
                reason: format!("orderbook response: {}", e),
            })?;

        let best = |levels: &[crate::infrastructure::clob::types::BookLevel], max: bool| {
            levels
                .iter()
                .filter_map(|l| {
                    let price = l.price.parse::<f64>().ok()?;
                    let size = l.size.parse::<f64>().ok()?;
                    Some((price, size))
                })
                .fold(None::<(f64, f64)>, |acc, (price, size)| match acc {
                    None => Some((price, size)),
                    Some((bp, bs)) => {
                        if (max && price > bp) || (!max && price < bp) {
                            Some((price, size))
                        } else {
                            Some((bp, bs))
                        }
                    }
                })
        };

        let (best_bid, bid_liquidity) = best(&parsed.bids, true).unwrap_or((0.0, 0.0));
        let (best_ask, ask_liquidity) = best(&parsed.asks, false).unwrap_or((1.0, 0.0));

        Ok(BookSummary {
            best_bid,
            best_ask,
            bid_liquidity,
            ask_liquidity,
            spread: (best_ask - best_bid).max(0.0),
        })
    }

    async fn balance(&self) -> Result<f64, VenueError> {
        let path = "/balance-allowance?asset_type=COLLATERAL";
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        for (name, value) in self.auth_headers("GET", path, "")? {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(Self::classify)?;
        let response = Self::check_status(response).await?;

        let parsed: BalanceResponse =
            response.json().await.map_err(|e| VenueError::Malformed {
                reason: format!("balance response: {}", e),
            })?;
        parsed.as_f64().ok_or_else(|| VenueError::Malformed {
            reason: "balance response missing balance".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic_base64() {
        let sig = ClobClient::sign("secret", 1_700_000_000, "POST", "/order", "{}");
        let again = ClobClient::sign("secret", 1_700_000_000, "POST", "/order", "{}");
        assert_eq!(sig, again);
        // HMAC-SHA256 digests are 32 bytes -> 44 base64 chars with padding.
        assert_eq!(sig.len(), 44);
        assert!(BASE64.decode(&sig).is_ok());

        let other = ClobClient::sign("secret", 1_700_000_001, "POST", "/order", "{}");
        assert_ne!(sig, other);
    }
}
