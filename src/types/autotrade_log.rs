#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoTradeAction {
    OpenPosition,
    ClosePosition,
    Skip,
    Error,
}

impl AutoTradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoTradeAction::OpenPosition => "OPEN_POSITION",
            AutoTradeAction::ClosePosition => "CLOSE_POSITION",
            AutoTradeAction::Skip => "SKIP",
            AutoTradeAction::Error => "ERROR",
        }
    }
}

/// Append-only record of every candidate the auto-trade evaluator considered,
/// not only the ones that resulted in a position (§3 "Auto-trading log").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTradeLogEntry {
    pub id: String,
    pub account_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: AutoTradeAction,
    pub symbol: Symbol,
    pub reason: String,
    pub score_snapshot: Decimal,
    pub success: bool,
}

impl AutoTradeLogEntry {
    pub fn new(
        account_id: impl Into<String>,
        action: AutoTradeAction,
        symbol: Symbol,
        reason: impl Into<String>,
        score_snapshot: Decimal,
        success: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            timestamp: Utc::now(),
            action,
            symbol,
            reason: reason.into(),
            score_snapshot,
            success,
        }
    }
}
