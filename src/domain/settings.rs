//! Runtime-mutable trading policy: row shape and validation rules.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ConfigRow {
    pub key: String,
    pub value: f64,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Integer,
}

/// Per-key validation rule. Values outside `[min, max]` or of the wrong kind
/// are rejected without affecting the rest of an update batch.
#[derive(Debug, Clone, Copy)]
pub struct ConfigRule {
    pub min: f64,
    pub max: f64,
    pub kind: ValueKind,
}

impl ConfigRule {
    pub const fn number(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            kind: ValueKind::Number,
        }
    }

    pub const fn integer(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            kind: ValueKind::Integer,
        }
    }

    pub fn check(&self, value: f64) -> Result<(), String> {
        if !value.is_finite() {
            return Err("value must be finite".to_string());
        }
        if self.kind == ValueKind::Integer && value.fract() != 0.0 {
            return Err(format!("expected integer, got {}", value));
        }
        if value < self.min || value > self.max {
            return Err(format!(
                "value {} out of range [{}, {}]",
                value, self.min, self.max
            ));
        }
        Ok(())
    }
}

/// Every recognized config key with its validation rule. Unknown keys are
/// rejected by `update`.
pub fn rule_for(key: &str) -> Option<ConfigRule> {
    let rule = match key {
        "max_bet_usd" => ConfigRule::number(0.1, 10_000.0),
        "daily_loss_limit_usd" => ConfigRule::number(1.0, 100_000.0),
        "max_open_positions" => ConfigRule::integer(1.0, 100.0),
        "take_profit_pct" => ConfigRule::number(1.0, 500.0),
        "stop_loss_pct" => ConfigRule::number(-95.0, -1.0),
        "max_total_exposure_usd" => ConfigRule::number(1.0, 1_000_000.0),
        "max_category_concentration_pct" => ConfigRule::number(1.0, 100.0),
        "max_slippage_pct" => ConfigRule::number(0.1, 20.0),
        "min_balance_usd" => ConfigRule::number(0.0, 10_000.0),
        "trailing_stop_pct" => ConfigRule::number(0.5, 50.0),
        "breakeven_trigger_pct" => ConfigRule::number(0.5, 100.0),
        "max_hold_hours" => ConfigRule::number(0.1, 240.0),
        "min_settlement_minutes" => ConfigRule::number(0.0, 1440.0),
        "max_spread" => ConfigRule::number(0.001, 0.5),
        _ => return None,
    };
    Some(rule)
}

pub const ALL_KEYS: &[&str] = &[
    "max_bet_usd",
    "daily_loss_limit_usd",
    "max_open_positions",
    "take_profit_pct",
    "stop_loss_pct",
    "max_total_exposure_usd",
    "max_category_concentration_pct",
    "max_slippage_pct",
    "min_balance_usd",
    "trailing_stop_pct",
    "breakeven_trigger_pct",
    "max_hold_hours",
    "min_settlement_minutes",
    "max_spread",
];
