#![allow(dead_code)]
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two auto-entry policies the source mixed across revisions (§9 Open
/// Question). Kept as a config choice rather than resolved one way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoEntryPolicy {
    /// total_score, technical_score, macd_golden_cross, above_all_ema,
    /// volume_score all required (§4.6).
    Strict,
    /// volume_surge ∧ total_score ≥ 60.
    VolumeBreakout,
}

impl Default for AutoEntryPolicy {
    fn default() -> Self {
        AutoEntryPolicy::Strict
    }
}

/// A paper-trading account: its own balance, risk knobs, and running
/// counters (§3 "Sim account"). Multiple accounts may exist concurrently,
/// each independently opted in or out of auto-trading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimAccount {
    pub id: String,
    pub name: String,

    pub initial_balance: Decimal,
    pub current_balance: Decimal,
    pub frozen_balance: Decimal,

    pub max_positions: usize,
    pub position_size_pct: Decimal,
    pub entry_score_min: Decimal,
    pub entry_technical_min: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_levels: Vec<Decimal>,
    pub commission_rate: Decimal,
    pub auto_trading_enabled: bool,
    pub auto_entry_policy: AutoEntryPolicy,

    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub total_pnl: Decimal,
    pub total_commission: Decimal,
}

impl SimAccount {
    pub fn new(name: impl Into<String>, initial_balance: Decimal) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            initial_balance,
            current_balance: initial_balance,
            frozen_balance: Decimal::ZERO,
            max_positions: 5,
            position_size_pct: dec!(2),
            entry_score_min: dec!(75),
            entry_technical_min: dec!(60),
            stop_loss_pct: dec!(3),
            take_profit_levels: vec![dec!(6), dec!(9), dec!(12)],
            commission_rate: dec!(0.001),
            auto_trading_enabled: false,
            auto_entry_policy: AutoEntryPolicy::Strict,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            total_pnl: Decimal::ZERO,
            total_commission: Decimal::ZERO,
        }
    }

    /// `total_equity = current_balance + Σ(open position current_value)` (§3).
    pub fn total_equity(&self, open_position_value: Decimal) -> Decimal {
        self.current_balance + open_position_value
    }

    pub fn win_rate(&self) -> Decimal {
        if self.total_trades == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.winning_trades) / Decimal::from(self.total_trades) * Decimal::from(100)
        }
    }
}
