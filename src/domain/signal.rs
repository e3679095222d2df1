//! Normalized upstream signal value object.
//!
//! The scanner emits a deeply nested event; the bridge operates on this
//! flattened form so the gate chain never reaches through optional
//! sub-objects.

use crate::domain::trading::types::Side;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    #[serde(rename = "ENTER")]
    Enter,
    #[serde(rename = "EXIT")]
    Exit,
    #[serde(rename = "HOLD")]
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStrength {
    #[serde(rename = "STRONG")]
    Strong,
    #[serde(rename = "GOOD")]
    Good,
    #[serde(rename = "WEAK")]
    Weak,
}

impl SignalStrength {
    pub fn is_tradeable(&self) -> bool {
        matches!(self, SignalStrength::Strong | SignalStrength::Good)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStrength::Strong => "STRONG",
            SignalStrength::Good => "GOOD",
            SignalStrength::Weak => "WEAK",
        }
    }
}

/// One `signal:enter` event, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterSignal {
    pub signal_id: String,
    pub market_id: String,
    pub slug: String,
    pub question: String,
    pub category: String,
    pub action: SignalAction,
    pub strength: SignalStrength,
    pub side: Side,
    pub phase: String,
    pub settlement_left_min: f64,
    pub spread_up: Option<f64>,
    pub spread_down: Option<f64>,
    pub up_token_id: Option<String>,
    pub down_token_id: Option<String>,
    pub price_up: f64,
    pub price_down: f64,
    pub spot: Option<f64>,
    pub edge_up: f64,
    pub edge_down: f64,
    pub model_up: f64,
    pub confidence: f64,
    pub kelly: f64,
    pub regime: String,
    pub quality_score: f64,
    pub btc_price: Option<f64>,
    pub price_to_beat: Option<f64>,
}

impl EnterSignal {
    /// Edge on the recommended side.
    pub fn edge(&self) -> f64 {
        match self.side {
            Side::Up => self.edge_up,
            Side::Down => self.edge_down,
        }
    }

    /// Token to buy for the recommended side; `None` is a fatal
    /// `no_token_id` condition.
    pub fn token_id(&self) -> Option<&str> {
        match self.side {
            Side::Up => self.up_token_id.as_deref(),
            Side::Down => self.down_token_id.as_deref(),
        }
    }

    /// Book spread on the recommended side, when the scanner carried one.
    pub fn spread(&self) -> Option<f64> {
        match self.side {
            Side::Up => self.spread_up,
            Side::Down => self.spread_down,
        }
    }

    /// Quoted price of the token we would hold.
    pub fn entry_price(&self) -> f64 {
        match self.side {
            Side::Up => self.price_up,
            Side::Down => self.price_down,
        }
    }

    pub fn model_down(&self) -> f64 {
        1.0 - self.model_up
    }

    /// Coarse confidence tier used in notification payloads.
    pub fn confidence_tier(&self) -> &'static str {
        if self.confidence >= 80.0 {
            "high"
        } else if self.confidence >= 55.0 {
            "medium"
        } else {
            "low"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn sample(side: Side) -> EnterSignal {
        EnterSignal {
            signal_id: "sig-1".to_string(),
            market_id: "mkt-1".to_string(),
            slug: "btc-up-15m".to_string(),
            question: "BTC up in 15m?".to_string(),
            category: "crypto".to_string(),
            action: SignalAction::Enter,
            strength: SignalStrength::Strong,
            side,
            phase: "mid".to_string(),
            settlement_left_min: 120.0,
            spread_up: Some(0.02),
            spread_down: Some(0.03),
            up_token_id: Some("T-UP".to_string()),
            down_token_id: Some("T-DOWN".to_string()),
            price_up: 0.55,
            price_down: 0.45,
            spot: Some(65000.0),
            edge_up: 0.12,
            edge_down: -0.12,
            model_up: 0.67,
            confidence: 75.0,
            kelly: 0.05,
            regime: "trending".to_string(),
            quality_score: 0.8,
            btc_price: Some(65000.0),
            price_to_beat: Some(64900.0),
        }
    }

    #[test]
    fn test_side_selectors() {
        let up = sample(Side::Up);
        assert_eq!(up.token_id(), Some("T-UP"));
        assert_eq!(up.spread(), Some(0.02));
        assert!((up.edge() - 0.12).abs() < 1e-9);
        assert!((up.entry_price() - 0.55).abs() < 1e-9);

        let down = sample(Side::Down);
        assert_eq!(down.token_id(), Some("T-DOWN"));
        assert_eq!(down.spread(), Some(0.03));
        assert!((down.edge() + 0.12).abs() < 1e-9);
        assert!((down.entry_price() - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_tiers() {
        let mut s = sample(Side::Up);
        s.confidence = 90.0;
        assert_eq!(s.confidence_tier(), "high");
        s.confidence = 60.0;
        assert_eq!(s.confidence_tier(), "medium");
        s.confidence = 30.0;
        assert_eq!(s.confidence_tier(), "low");
    }
}
