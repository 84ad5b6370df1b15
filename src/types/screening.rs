#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Symbol, TimeFrame};

/// One row of a screening pass's output (§3 "Screening snapshot").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningSnapshot {
    pub symbol: Symbol,
    pub timeframe: TimeFrame,
    pub timestamp: DateTime<Utc>,

    pub beta_score: Decimal,
    pub volume_score: Decimal,
    pub technical_score: Decimal,
    pub total_score: Decimal,

    pub above_sma: bool,
    pub macd_golden_cross: bool,
    pub above_all_ema: bool,
    pub volume_surge: bool,
    pub price_anomaly: bool,

    pub price_btc_ratio: Decimal,
    pub price_eth_ratio: Decimal,
    pub btc_ratio_change_24h_pct: Decimal,
    pub eth_ratio_change_24h_pct: Decimal,

    pub price_change_5m_pct: Option<Decimal>,
    pub price_change_15m_pct: Option<Decimal>,
    pub price_change_1h_pct: Option<Decimal>,

    pub current_price: Decimal,
    pub volume_24h: Decimal,
}

impl ScreeningSnapshot {
    /// Early-rejection gate applied at the end of one worker's evaluation (§4.5g).
    pub fn survives_prefilter(&self) -> bool {
        self.beta_score >= Decimal::from(30) && self.total_score >= Decimal::from(40)
    }
}
