#![allow(dead_code)]
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Process-wide configuration loaded by layering defaults, an optional
/// `config/default.toml`, and `SCREENER_`-prefixed environment variables
/// (via `.env` through `dotenvy`), mirroring the donor project's
/// `config`+`dotenvy`+`toml` stack (§6 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub exchange_base_url: String,
    pub exchange_api_key: Option<String>,
    pub exchange_api_secret: Option<String>,

    pub database_url: String,
    pub tsdb_url: String,

    pub smtp_host: Option<String>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub messaging_bot_token: Option<String>,

    pub update_interval_secs: u64,
    pub min_volume_usd: Decimal,
    pub min_price_change_5m_pct: Decimal,
    pub min_price_change_15m_pct: Decimal,
    pub beta_threshold: Decimal,
    pub log_level: String,

    /// IANA timezone name; all quiet-hours/daily-cap/preferred-window gating
    /// is evaluated in this timezone (§9). Stored timestamps stay UTC.
    pub operator_timezone: String,

    pub candle_retention_days: i64,
    pub snapshot_retention_days: i64,

    pub collector_batch_size: usize,
    pub collector_candles_per_fetch: u32,

    pub screener_worker_pool_size: usize,
    pub screener_pass_timeout_secs: u64,

    /// Minimum inter-call spacing enforced on both exchange channels (§4.1).
    pub exchange_min_call_spacing_ms: u64,

    pub retention_sweep_every_n_days: i64,

    /// `[start_hour, end_hour)` windows (operator-timezone local hours)
    /// during which `preferred_window_bonus` is added to the auto-entry
    /// `entry_score_min` comparison (§4.6, §A.9).
    pub preferred_windows: Vec<(u32, u32)>,
    pub preferred_window_bonus: Decimal,

    pub screen_timeframe: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exchange_base_url: "https://api.binance.us".to_string(),
            exchange_api_key: None,
            exchange_api_secret: None,
            database_url: "sqlite://./screener.db".to_string(),
            tsdb_url: "sqlite://./candles.db".to_string(),
            smtp_host: None,
            smtp_user: None,
            smtp_password: None,
            messaging_bot_token: None,
            update_interval_secs: 300,
            min_volume_usd: dec!(1_000_000),
            min_price_change_5m_pct: dec!(0.5),
            min_price_change_15m_pct: dec!(1),
            beta_threshold: dec!(30),
            log_level: "info".to_string(),
            operator_timezone: "Asia/Shanghai".to_string(),
            candle_retention_days: 15,
            snapshot_retention_days: 7,
            collector_batch_size: 20,
            collector_candles_per_fetch: 500,
            screener_worker_pool_size: 10,
            screener_pass_timeout_secs: 120,
            exchange_min_call_spacing_ms: 100,
            retention_sweep_every_n_days: 1,
            preferred_windows: vec![(9, 11), (20, 23)],
            preferred_window_bonus: dec!(5),
            screen_timeframe: "15m".to_string(),
        }
    }
}

impl Settings {
    /// Layers defaults → `config/default.toml` (if present) → `SCREENER_*`
    /// env vars, after loading `.env` via `dotenvy` if one exists.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("SCREENER").separator("__"));

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.update_interval_secs == 0 {
            errors.push("update_interval_secs must be > 0".to_string());
        }
        if self.min_volume_usd < Decimal::ZERO {
            errors.push("min_volume_usd must be >= 0".to_string());
        }
        if self.screener_worker_pool_size == 0 {
            errors.push("screener_worker_pool_size must be > 0".to_string());
        }
        if self.screener_pass_timeout_secs == 0 {
            errors.push("screener_pass_timeout_secs must be > 0".to_string());
        }
        if self.operator_timezone.parse::<chrono_tz::Tz>().is_err() {
            errors.push(format!("invalid operator_timezone: {}", self.operator_timezone));
        }
        if self.candle_retention_days <= 0 {
            errors.push("candle_retention_days must be > 0".to_string());
        }
        if self.snapshot_retention_days <= 0 {
            errors.push("snapshot_retention_days must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        self.operator_timezone.parse().unwrap_or(chrono_tz::Asia::Shanghai)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn bad_timezone_fails_validation() {
        let mut s = Settings::default();
        s.operator_timezone = "Not/AZone".to_string();
        assert!(s.validate().is_err());
    }
}
