#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Symbol;

/// Position terminal states (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    /// `k` is the 1-based take-profit level index that triggered the exit.
    TakeProfit(u32),
    Manual,
    TimeStop,
}

impl CloseReason {
    pub fn as_str(&self) -> String {
        match self {
            CloseReason::StopLoss => "STOP_LOSS".to_string(),
            CloseReason::TakeProfit(k) => format!("TAKE_PROFIT_{k}"),
            CloseReason::Manual => "MANUAL".to_string(),
            CloseReason::TimeStop => "TIME_STOP".to_string(),
        }
    }
}

/// Epsilon below which `remaining_quantity` is treated as fully closed (§3 invariant 5).
pub fn close_epsilon() -> Decimal {
    Decimal::new(1, 4) // 1e-4
}

/// An append-only log entry for a partial or full exit (§3, §4.6 closing math).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialExit {
    pub timestamp: DateTime<Utc>,
    pub quantity: Decimal,
    pub price: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
    pub commission: Decimal,
    pub reason: CloseReason,
}

/// A single open-or-closed simulated position (§3 "Sim position").
///
/// `take_profit_prices` is mutated as levels trigger (consumed in ascending
/// order, §4.6), while `take_profit_count_initial` is fixed at open time and
/// used for the constant partial-exit fraction `100/N_initial` (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimPosition {
    pub id: String,
    pub account_id: String,
    pub symbol: Symbol,

    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub quantity: Decimal,
    pub entry_value: Decimal,
    pub entry_score: Decimal,

    pub stop_loss_price: Decimal,
    pub take_profit_prices: Vec<Decimal>,
    pub take_profit_count_initial: usize,

    pub remaining_quantity: Decimal,
    pub partial_exits: Vec<PartialExit>,

    pub current_price: Decimal,
    pub is_closed: bool,
    pub close_reason: Option<CloseReason>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl SimPosition {
    pub fn open(
        account_id: impl Into<String>,
        symbol: Symbol,
        entry_price: Decimal,
        quantity: Decimal,
        entry_score: Decimal,
        stop_loss_pct: Decimal,
        take_profit_pcts: &[Decimal],
    ) -> Self {
        let stop_loss_price = entry_price * (Decimal::ONE - stop_loss_pct / Decimal::from(100));
        let take_profit_prices: Vec<Decimal> = take_profit_pcts
            .iter()
            .map(|pct| entry_price * (Decimal::ONE + *pct / Decimal::from(100)))
            .collect();
        let count_initial = take_profit_prices.len();

        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            symbol,
            entry_price,
            entry_time: Utc::now(),
            quantity,
            entry_value: entry_price * quantity,
            entry_score,
            stop_loss_price,
            take_profit_prices,
            take_profit_count_initial: count_initial,
            remaining_quantity: quantity,
            partial_exits: Vec::new(),
            current_price: entry_price,
            is_closed: false,
            close_reason: None,
            closed_at: None,
        }
    }

    pub fn current_value(&self) -> Decimal {
        self.remaining_quantity * self.current_price
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.remaining_quantity * (self.current_price - self.entry_price)
    }

    pub fn unrealized_pnl_pct(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (self.current_price - self.entry_price) / self.entry_price * Decimal::from(100)
    }

    /// The constant fractional percentage each take-profit level closes,
    /// fixed at open time (§9 Open Question resolution: `100/N_initial`).
    pub fn partial_exit_pct(&self) -> Decimal {
        if self.take_profit_count_initial == 0 {
            return Decimal::from(100);
        }
        Decimal::from(100) / Decimal::from(self.take_profit_count_initial as u32)
    }

    /// `quantity = remaining_quantity + Σ(partial_exits.quantity)` (invariant 5).
    pub fn conserved_quantity(&self) -> Decimal {
        self.remaining_quantity + self.partial_exits.iter().map(|e| e.quantity).sum::<Decimal>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn open_computes_stop_and_tp_prices_per_s1() {
        let pos = SimPosition::open(
            "acct-1",
            Symbol::usdt("XYZ"),
            dec!(100),
            dec!(2),
            dec!(80),
            dec!(3),
            &[dec!(6), dec!(9), dec!(12)],
        );
        assert_eq!(pos.stop_loss_price, dec!(97));
        assert_eq!(pos.take_profit_prices, vec![dec!(106), dec!(109), dec!(112)]);
        assert_eq!(pos.entry_value, dec!(200));
        assert_eq!(pos.partial_exit_pct(), Decimal::from(100) / dec!(3));
    }
}
