#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Singleton notification gate settings (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub email_enabled: bool,
    pub messaging_enabled: bool,
    pub min_interval_minutes: i64,
    pub daily_limit: u32,
    pub daily_count: u32,
    pub last_daily_reset: chrono::NaiveDate,
    pub last_notification_time: Option<DateTime<Utc>>,
    pub min_score_threshold: Decimal,
    pub notify_top_n: usize,
    /// `[start_hour, end_hour)`, wrap-around when `start > end` (§4.8).
    pub quiet_hours: Option<(u32, u32)>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_enabled: false,
            messaging_enabled: false,
            min_interval_minutes: 15,
            daily_limit: 50,
            daily_count: 0,
            last_daily_reset: Utc::now().date_naive(),
            last_notification_time: None,
            min_score_threshold: dec!(70),
            notify_top_n: 10,
            quiet_hours: None,
        }
    }
}
