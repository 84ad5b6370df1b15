#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CloseReason, Side, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    Entry,
    PartialExit,
    FullExit,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Entry => "ENTRY",
            TradeType::PartialExit => "PARTIAL_EXIT",
            TradeType::FullExit => "FULL_EXIT",
        }
    }
}

/// Immutable ledger entry (§3 "Sim trade"). `pnl`/`pnl_pct` are `None` for
/// `ENTRY` trades — realized PnL is only ever recorded on exits (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimTrade {
    pub id: String,
    pub account_id: String,
    pub position_id: String,
    pub symbol: Symbol,
    pub trade_type: TradeType,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub value: Decimal,
    pub commission: Decimal,
    pub pnl: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
    pub exit_reason: Option<CloseReason>,
    pub trade_time: DateTime<Utc>,
}

impl SimTrade {
    pub fn entry(
        account_id: impl Into<String>,
        position_id: impl Into<String>,
        symbol: Symbol,
        price: Decimal,
        quantity: Decimal,
        commission: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            position_id: position_id.into(),
            symbol,
            trade_type: TradeType::Entry,
            side: Side::Buy,
            price,
            quantity,
            value: price * quantity,
            commission,
            pnl: None,
            pnl_pct: None,
            exit_reason: None,
            trade_time: Utc::now(),
        }
    }

    /// `pnl = value − quantity·entry_price` against the parent position's
    /// entry price; commission is tracked separately and is not netted into
    /// `pnl` (§3, §8 S1).
    pub fn exit(
        account_id: impl Into<String>,
        position_id: impl Into<String>,
        symbol: Symbol,
        entry_price: Decimal,
        price: Decimal,
        quantity: Decimal,
        commission: Decimal,
        reason: CloseReason,
        is_full: bool,
    ) -> Self {
        let value = price * quantity;
        let pnl = value - quantity * entry_price;
        let cost_basis = quantity * entry_price;
        let pnl_pct = if cost_basis.is_zero() {
            Decimal::ZERO
        } else {
            pnl / cost_basis * Decimal::from(100)
        };

        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            position_id: position_id.into(),
            symbol,
            trade_type: if is_full { TradeType::FullExit } else { TradeType::PartialExit },
            side: Side::Sell,
            price,
            quantity,
            value,
            commission,
            pnl: Some(pnl),
            pnl_pct: Some(pnl_pct),
            exit_reason: Some(reason),
            trade_time: Utc::now(),
        }
    }
}
