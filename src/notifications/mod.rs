#![allow(dead_code)]
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::database::Database;
use crate::types::{NotificationSettings, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Alert payloads (§3 "Notification"). `ScreeningOpportunity` is the gated
/// broadcast kind (§4.8); the rest are trade-lifecycle events emitted
/// unconditionally by the paper-trading engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AlertType {
    ScreeningOpportunity {
        symbol: Symbol,
        total_score: String,
        technical_score: String,
        beta_score: String,
    },
    PositionOpened {
        account_id: String,
        symbol: Symbol,
        quantity: String,
        entry_price: String,
    },
    PositionClosed {
        account_id: String,
        symbol: Symbol,
        pnl: String,
        pnl_pct: String,
        reason: String,
    },
    AutoTradeSkipped {
        account_id: String,
        symbol: Symbol,
        reason: String,
    },
    AutoTradeError {
        account_id: String,
        symbol: Symbol,
        message: String,
    },
    NoMarketData,
}

impl AlertType {
    pub fn default_severity(&self) -> Severity {
        match self {
            AlertType::AutoTradeError { .. } | AlertType::NoMarketData => Severity::Critical,
            AlertType::PositionClosed { pnl, .. } if pnl.starts_with('-') => Severity::Warning,
            AlertType::AutoTradeSkipped { .. } => Severity::Info,
            _ => Severity::Info,
        }
    }

    pub fn title(&self) -> String {
        match self {
            AlertType::ScreeningOpportunity { symbol, total_score, .. } => format!("Opportunity: {symbol} (score {total_score})"),
            AlertType::PositionOpened { symbol, .. } => format!("Position Opened: {symbol}"),
            AlertType::PositionClosed { symbol, .. } => format!("Position Closed: {symbol}"),
            AlertType::AutoTradeSkipped { symbol, .. } => format!("Auto-Trade Skipped: {symbol}"),
            AlertType::AutoTradeError { symbol, .. } => format!("Auto-Trade Error: {symbol}"),
            AlertType::NoMarketData => "No Market Data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub alert_type: AlertType,
}

impl Notification {
    pub fn new(alert_type: AlertType) -> Self {
        let severity = alert_type.default_severity();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            severity,
            alert_type,
        }
    }
}

/// True if `hour` (0-23, local to the operator timezone) falls in the quiet
/// window, wrapping past midnight when `start > end` (§4.8 step 1).
pub fn quiet_hours_blocks(quiet_hours: Option<(u32, u32)>, hour: u32) -> bool {
    match quiet_hours {
        None => false,
        Some((start, end)) if start <= end => (start..end).contains(&hour),
        Some((start, end)) => hour >= start || hour < end,
    }
}

/// The gate's three-step decision order: quiet hours, then the tz-aware
/// daily cap (resetting it first if the local date has rolled over), then
/// the minimum-interval throttle (§4.8). Returns the rejection reason on
/// failure; `settings` is mutated in place when the daily counter resets,
/// regardless of whether the gate ultimately allows the send.
pub fn check_gate(settings: &mut NotificationSettings, now: DateTime<Utc>, tz: Tz) -> Result<(), String> {
    let local = now.with_timezone(&tz);

    if quiet_hours_blocks(settings.quiet_hours, local.hour()) {
        return Err("quiet hours active".to_string());
    }

    let today = local.date_naive();
    if settings.last_daily_reset != today {
        settings.daily_count = 0;
        settings.last_daily_reset = today;
    }
    if settings.daily_count >= settings.daily_limit {
        return Err(format!("daily limit of {} reached", settings.daily_limit));
    }

    if let Some(last) = settings.last_notification_time {
        let elapsed = now.signed_duration_since(last);
        if elapsed < chrono::Duration::minutes(settings.min_interval_minutes) {
            return Err(format!("min interval of {}m not yet elapsed", settings.min_interval_minutes));
        }
    }

    Ok(())
}

/// Logs, stores, and persists notifications, mirroring the donor's
/// in-memory-plus-database pattern. `notify_gated` is the only path that
/// consults [`check_gate`]; trade-lifecycle events go through `notify`
/// unconditionally.
pub struct NotificationManager {
    recent: Arc<RwLock<Vec<Notification>>>,
    db: Arc<Database>,
    max_recent: usize,
}

impl NotificationManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            recent: Arc::new(RwLock::new(Vec::new())),
            db,
            max_recent: 500,
        }
    }

    pub async fn notify(&self, alert_type: AlertType) {
        let notification = Notification::new(alert_type);
        self.log_and_store(&notification).await;
    }

    /// Consults the gate; on acceptance advances `daily_count` and
    /// `last_notification_time` and persists the settings before returning.
    /// Rejections never touch those counters (§4.8: non-idempotent only on
    /// transport success).
    pub async fn notify_gated(&self, alert_type: AlertType, settings: &mut NotificationSettings, tz: Tz) -> Result<(), String> {
        let now = Utc::now();
        check_gate(settings, now, tz)?;

        let notification = Notification::new(alert_type);
        self.log_and_store(&notification).await;

        settings.daily_count += 1;
        settings.last_notification_time = Some(now);
        if let Err(err) = self.db.save_notification_settings(settings).await {
            error!(error = %err, "failed to persist notification settings after send");
        }

        Ok(())
    }

    async fn log_and_store(&self, notification: &Notification) {
        let title = notification.alert_type.title();
        match notification.severity {
            Severity::Critical => error!(%title, "{:?}", notification.alert_type),
            Severity::Warning => warn!(%title, "{:?}", notification.alert_type),
            Severity::Info => info!(%title, "{:?}", notification.alert_type),
        }

        let mut recent = self.recent.write().await;
        recent.insert(0, notification.clone());
        if recent.len() > self.max_recent {
            recent.truncate(self.max_recent);
        }
    }

    pub async fn recent(&self, limit: usize) -> Vec<Notification> {
        self.recent.read().await.iter().take(limit).cloned().collect()
    }
}

pub fn position_opened(account_id: impl Into<String>, symbol: Symbol, quantity: Decimal, entry_price: Decimal) -> AlertType {
    AlertType::PositionOpened {
        account_id: account_id.into(),
        symbol,
        quantity: quantity.to_string(),
        entry_price: entry_price.to_string(),
    }
}

pub fn position_closed(account_id: impl Into<String>, symbol: Symbol, pnl: Decimal, pnl_pct: Decimal, reason: impl Into<String>) -> AlertType {
    AlertType::PositionClosed {
        account_id: account_id.into(),
        symbol,
        pnl: pnl.to_string(),
        pnl_pct: pnl_pct.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quiet_hours_wraps_past_midnight() {
        assert!(quiet_hours_blocks(Some((22, 6)), 23));
        assert!(quiet_hours_blocks(Some((22, 6)), 3));
        assert!(!quiet_hours_blocks(Some((22, 6)), 12));
    }

    #[test]
    fn quiet_hours_non_wrapping_range() {
        assert!(quiet_hours_blocks(Some((9, 17)), 12));
        assert!(!quiet_hours_blocks(Some((9, 17)), 20));
    }

    #[test]
    fn gate_rejects_during_quiet_hours_before_touching_daily_count() {
        let mut settings = NotificationSettings {
            quiet_hours: Some((0, 23)),
            ..NotificationSettings::default()
        };
        let before = settings.daily_count;
        let now = Utc::now();
        let result = check_gate(&mut settings, now, chrono_tz::UTC);
        assert!(result.is_err());
        assert_eq!(settings.daily_count, before);
    }

    #[test]
    fn gate_resets_daily_count_on_date_rollover() {
        let mut settings = NotificationSettings {
            daily_count: 10,
            daily_limit: 50,
            last_daily_reset: (Utc::now() - chrono::Duration::days(2)).date_naive(),
            quiet_hours: None,
            ..NotificationSettings::default()
        };
        let result = check_gate(&mut settings, Utc::now(), chrono_tz::UTC);
        assert!(result.is_ok());
        assert_eq!(settings.daily_count, 0);
    }

    #[test]
    fn gate_enforces_min_interval() {
        let mut settings = NotificationSettings {
            min_interval_minutes: 15,
            last_notification_time: Some(Utc::now()),
            quiet_hours: None,
            ..NotificationSettings::default()
        };
        let result = check_gate(&mut settings, Utc::now(), chrono_tz::UTC);
        assert!(result.is_err());
    }

    #[test]
    fn alert_helpers_round_trip_decimal_fields() {
        let alert = position_opened("acct-1", Symbol::usdt("SOL"), dec!(10), dec!(100));
        if let AlertType::PositionOpened { quantity, .. } = alert {
            assert_eq!(quantity, "10");
        } else {
            panic!("wrong variant");
        }
    }
}
