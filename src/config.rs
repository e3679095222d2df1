use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;

/// Process-level settings, read once at startup from the environment.
///
/// Runtime-mutable trading policy lives in the `trading_config` table (see
/// `application::config_store`); the values here only seed that store with
/// defaults on first boot.
#[derive(Debug, Clone)]
pub struct Settings {
    pub enable_trading: bool,
    pub dry_run: bool,
    pub database_url: String,
    pub clob_base_url: String,
    pub clob_api_key: String,
    pub clob_api_secret: String,
    pub clob_passphrase: String,
    pub dry_run_csv_path: String,
    pub monitor_interval_secs: u64,
    pub market_cooldown_minutes: i64,
    pub max_poll_ms: u64,
    pub poll_interval_ms: u64,
    pub max_audit_age_hours: i64,
    pub balance_cache_ttl_secs: u64,
    /// Seed values for the runtime config store, keyed by config key.
    pub policy_defaults: HashMap<String, f64>,
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match env::var(key) {
        Ok(v) => v
            .parse::<f64>()
            .with_context(|| format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let enable_trading = env_bool("ENABLE_TRADING", false);
        let dry_run = env_bool("TRADING_DRY_RUN", true);

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/polysignal.db".to_string());

        let clob_base_url =
            env::var("CLOB_BASE_URL").unwrap_or_else(|_| "https://clob.polymarket.com".to_string());
        let clob_api_key = env::var("CLOB_API_KEY").unwrap_or_default();
        let clob_api_secret = env::var("CLOB_API_SECRET").unwrap_or_default();
        let clob_passphrase = env::var("CLOB_PASSPHRASE").unwrap_or_default();

        let dry_run_csv_path =
            env::var("DRY_RUN_CSV_PATH").unwrap_or_else(|_| "data/dry_run_trades.csv".to_string());

        let monitor_interval_secs = env::var("MONITOR_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .context("Failed to parse MONITOR_INTERVAL_SECS")?;

        let market_cooldown_minutes = env::var("MARKET_COOLDOWN_MINUTES")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<i64>()
            .context("Failed to parse MARKET_COOLDOWN_MINUTES")?;

        let max_poll_ms = env::var("ORDER_MAX_POLL_MS")
            .unwrap_or_else(|_| "60000".to_string())
            .parse::<u64>()
            .context("Failed to parse ORDER_MAX_POLL_MS")?;

        let poll_interval_ms = env::var("ORDER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .context("Failed to parse ORDER_POLL_INTERVAL_MS")?;

        let max_audit_age_hours = env::var("MAX_AGE_HOURS")
            .unwrap_or_else(|_| "72".to_string())
            .parse::<i64>()
            .context("Failed to parse MAX_AGE_HOURS")?;

        let balance_cache_ttl_secs = env::var("BALANCE_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .context("Failed to parse BALANCE_CACHE_TTL_SECS")?;

        let mut policy_defaults = HashMap::new();
        policy_defaults.insert("max_bet_usd".to_string(), env_f64("MAX_BET_USD", 1.0)?);
        policy_defaults.insert(
            "daily_loss_limit_usd".to_string(),
            env_f64("DAILY_LOSS_LIMIT_USD", 50.0)?,
        );
        policy_defaults.insert(
            "max_open_positions".to_string(),
            env_f64("MAX_OPEN_POSITIONS", 5.0)?,
        );
        policy_defaults.insert(
            "take_profit_pct".to_string(),
            env_f64("TAKE_PROFIT_PCT", 15.0)?,
        );
        policy_defaults.insert("stop_loss_pct".to_string(), env_f64("STOP_LOSS_PCT", -20.0)?);
        policy_defaults.insert(
            "max_total_exposure_usd".to_string(),
            env_f64("MAX_TOTAL_EXPOSURE_USD", 100.0)?,
        );
        policy_defaults.insert(
            "max_category_concentration_pct".to_string(),
            env_f64("MAX_CATEGORY_CONCENTRATION_PCT", 40.0)?,
        );
        policy_defaults.insert(
            "max_slippage_pct".to_string(),
            env_f64("MAX_SLIPPAGE_PCT", 2.0)?,
        );
        policy_defaults.insert(
            "min_balance_usd".to_string(),
            env_f64("MIN_BALANCE_USD", 5.0)?,
        );
        policy_defaults.insert(
            "trailing_stop_pct".to_string(),
            env_f64("TRAILING_STOP_PCT", 5.0)?,
        );
        policy_defaults.insert(
            "breakeven_trigger_pct".to_string(),
            env_f64("BREAKEVEN_TRIGGER_PCT", 8.0)?,
        );
        policy_defaults.insert("max_hold_hours".to_string(), env_f64("MAX_HOLD_HOURS", 6.0)?);
        policy_defaults.insert(
            "min_settlement_minutes".to_string(),
            env_f64("MIN_SETTLEMENT_MINUTES", 30.0)?,
        );
        policy_defaults.insert("max_spread".to_string(), env_f64("MAX_SPREAD", 0.05)?);

        let settings = Self {
            enable_trading,
            dry_run,
            database_url,
            clob_base_url,
            clob_api_key,
            clob_api_secret,
            clob_passphrase,
            dry_run_csv_path,
            monitor_interval_secs,
            market_cooldown_minutes,
            max_poll_ms,
            poll_interval_ms,
            max_audit_age_hours,
            balance_cache_ttl_secs,
            policy_defaults,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Live trading requires both flags flipped and CLOB credentials present.
    /// Missing credentials with live trading requested is a startup error.
    pub fn validate(&self) -> Result<()> {
        if self.is_live() && !self.has_clob_credentials() {
            anyhow::bail!(
                "ENABLE_TRADING=true with TRADING_DRY_RUN=false requires CLOB_API_KEY, \
                 CLOB_API_SECRET and CLOB_PASSPHRASE"
            );
        }
        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.enable_trading && !self.dry_run
    }

    pub fn has_clob_credentials(&self) -> bool {
        !self.clob_api_key.is_empty()
            && !self.clob_api_secret.is_empty()
            && !self.clob_passphrase.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_without_credentials_is_rejected() {
        let mut settings = Settings {
            enable_trading: true,
            dry_run: false,
            database_url: "sqlite::memory:".to_string(),
            clob_base_url: "http://localhost".to_string(),
            clob_api_key: String::new(),
            clob_api_secret: String::new(),
            clob_passphrase: String::new(),
            dry_run_csv_path: "/tmp/x.csv".to_string(),
            monitor_interval_secs: 60,
            market_cooldown_minutes: 5,
            max_poll_ms: 60_000,
            poll_interval_ms: 5_000,
            max_audit_age_hours: 72,
            balance_cache_ttl_secs: 30,
            policy_defaults: HashMap::new(),
        };
        assert!(settings.validate().is_err());

        settings.clob_api_key = "k".to_string();
        settings.clob_api_secret = "s".to_string();
        settings.clob_passphrase = "p".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_dry_run_needs_no_credentials() {
        let settings = Settings {
            enable_trading: true,
            dry_run: true,
            database_url: "sqlite::memory:".to_string(),
            clob_base_url: "http://localhost".to_string(),
            clob_api_key: String::new(),
            clob_api_secret: String::new(),
            clob_passphrase: String::new(),
            dry_run_csv_path: "/tmp/x.csv".to_string(),
            monitor_interval_secs: 60,
            market_cooldown_minutes: 5,
            max_poll_ms: 60_000,
            poll_interval_ms: 5_000,
            max_audit_age_hours: 72,
            balance_cache_ttl_secs: 30,
            policy_defaults: HashMap::new(),
        };
        assert!(settings.validate().is_ok());
        assert!(!settings.is_live());
    }
}
