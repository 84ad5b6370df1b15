use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::database::Database;
use crate::error::AppError;
use crate::types::{
    close_epsilon, AutoEntryPolicy, AutoTradeAction, AutoTradeLogEntry, CloseReason, PartialExit, ScreeningSnapshot,
    SimAccount, SimPosition, SimTrade, Symbol,
};

/// Drives the paper-trading state machine (§4.6). Holds only a handle to
/// the relational store — accounts and positions are loaded by the caller
/// (typically the monitor loop, §4.7) and passed in by `&mut` so one cycle's
/// worth of mutations round-trip through a single save.
pub struct PaperTradingEngine {
    db: Arc<Database>,
}

impl PaperTradingEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Opens a new position: no existing open position for `(account,
    /// symbol)`, `open_count < max_positions`, and `position_value ≤
    /// current_balance` (§4.6 opening criteria).
    pub async fn open_position(
        &self,
        account: &mut SimAccount,
        symbol: &Symbol,
        entry_price: Decimal,
        entry_score: Decimal,
    ) -> Result<(SimPosition, SimTrade), AppError> {
        if self.db.open_position_for_symbol(&account.id, symbol).await?.is_some() {
            return Err(AppError::Capacity(format!("{symbol} already has an open position")));
        }
        let open_positions = self.db.open_positions_for_account(&account.id).await?;
        if open_positions.len() >= account.max_positions {
            return Err(AppError::Capacity(format!(
                "account {} at max_positions ({})",
                account.id, account.max_positions
            )));
        }

        let open_value: Decimal = open_positions.iter().map(|p| p.current_value()).sum();
        let position_value = account.total_equity(open_value) * account.position_size_pct / Decimal::from(100);
        if position_value > account.current_balance {
            return Err(AppError::Capacity(format!(
                "position_value {position_value} exceeds current_balance {}",
                account.current_balance
            )));
        }

        let quantity = position_value / entry_price;
        let position = SimPosition::open(
            account.id.clone(),
            symbol.clone(),
            entry_price,
            quantity,
            entry_score,
            account.stop_loss_pct,
            &account.take_profit_levels,
        );
        let commission = position.entry_value * account.commission_rate;

        account.current_balance -= position.entry_value + commission;
        account.total_commission += commission;
        account.total_trades += 1;

        let trade = SimTrade::entry(account.id.clone(), position.id.clone(), symbol.clone(), entry_price, quantity, commission);

        self.db.upsert_position(&position).await?;
        self.db.insert_trade(&trade).await?;
        self.db.save_account(account).await?;

        info!(symbol = %symbol, price = %entry_price, value = %position.entry_value, "opened position");
        Ok((position, trade))
    }

    /// Checks one position's stop-loss and take-profit ladder against the
    /// latest price (§4.6 exit enforcement). Stop-loss fully closes; a
    /// take-profit crossing closes the first triggered level only — the
    /// caller re-invokes on the next price tick to catch further levels.
    pub async fn check_exits(
        &self,
        account: &mut SimAccount,
        position: &mut SimPosition,
        current_price: Decimal,
    ) -> Result<Option<SimTrade>, AppError> {
        position.current_price = current_price;

        if current_price <= position.stop_loss_price {
            return Ok(Some(
                self.close_position(account, position, current_price, Decimal::from(100), CloseReason::StopLoss).await?,
            ));
        }

        if let Some(level_index) = position.take_profit_prices.iter().position(|&tp| current_price >= tp) {
            let level = (level_index + 1) as u32;
            let pct = position.partial_exit_pct();
            position.take_profit_prices.remove(level_index);
            return Ok(Some(self.close_position(account, position, current_price, pct, CloseReason::TakeProfit(level)).await?));
        }

        self.db.upsert_position(position).await?;
        Ok(None)
    }

    /// `close_value = close_quantity·price`, `pnl = close_value −
    /// close_quantity·entry_price` (commission is accounted for separately
    /// in the balance update, not netted into `pnl` — §8 S1), `commission =
    /// close_value·commission_rate` (§4.6 closing math). Treats the position
    /// as fully closed once `remaining_quantity` drops below
    /// [`close_epsilon`] rather than requiring it to hit exactly zero.
    async fn close_position(
        &self,
        account: &mut SimAccount,
        position: &mut SimPosition,
        price: Decimal,
        pct: Decimal,
        reason: CloseReason,
    ) -> Result<SimTrade, AppError> {
        let close_quantity = position.remaining_quantity * pct / Decimal::from(100);
        let close_value = close_quantity * price;
        let commission = close_value * account.commission_rate;
        let pnl = close_value - close_quantity * position.entry_price;
        let cost_basis = close_quantity * position.entry_price;
        let pnl_pct = if cost_basis.is_zero() { Decimal::ZERO } else { pnl / cost_basis * Decimal::from(100) };

        position.remaining_quantity -= close_quantity;
        let fully_closed = position.remaining_quantity <= close_epsilon();
        if fully_closed {
            position.remaining_quantity = Decimal::ZERO;
            position.is_closed = true;
            position.close_reason = Some(reason);
            position.closed_at = Some(chrono::Utc::now());
        }

        let partial_exit = PartialExit {
            timestamp: chrono::Utc::now(),
            quantity: close_quantity,
            price,
            pnl,
            pnl_pct,
            commission,
            reason,
        };
        position.partial_exits.push(partial_exit.clone());

        account.current_balance += close_value - commission;
        account.total_pnl += pnl;
        account.total_commission += commission;
        account.total_trades += 1;
        if pnl >= Decimal::ZERO {
            account.winning_trades += 1;
        } else {
            account.losing_trades += 1;
        }

        let trade = SimTrade::exit(
            account.id.clone(),
            position.id.clone(),
            position.symbol.clone(),
            position.entry_price,
            price,
            close_quantity,
            commission,
            reason,
            fully_closed,
        );

        self.db.upsert_position(position).await?;
        self.db.insert_partial_exit(&position.id, &partial_exit).await?;
        self.db.insert_trade(&trade).await?;
        self.db.save_account(account).await?;

        info!(symbol = %position.symbol, reason = reason.as_str(), pnl = %pnl, "closed position (partial or full)");
        Ok(trade)
    }

    /// `total_equity = current_balance + Σ(current_value)`,
    /// `frozen_balance = Σ(remaining_quantity·entry_price)` (§4.6 equity
    /// reconciliation).
    pub fn reconcile_equity(account: &SimAccount, positions: &[SimPosition]) -> (Decimal, Decimal) {
        let open_value: Decimal = positions.iter().map(|p| p.current_value()).sum();
        let frozen: Decimal = positions.iter().map(|p| p.remaining_quantity * p.entry_price).sum();
        (account.total_equity(open_value), frozen)
    }

    /// `Strict`: total/technical score floors plus golden-cross, above-EMA,
    /// and volume-score conditions. `VolumeBreakout`: a volume surge plus a
    /// 60-point total-score floor. `score_bonus` (non-zero only inside a
    /// configured preferred window, §A.9) applies only to the
    /// `entry_score_min` comparison (§4.6 auto-entry evaluator).
    pub fn evaluate_auto_entry(account: &SimAccount, snapshot: &ScreeningSnapshot, score_bonus: Decimal) -> bool {
        match account.auto_entry_policy {
            AutoEntryPolicy::Strict => {
                let threshold = account.entry_score_min - score_bonus;
                snapshot.total_score >= threshold
                    && snapshot.technical_score >= account.entry_technical_min
                    && snapshot.macd_golden_cross
                    && snapshot.above_all_ema
                    && snapshot.volume_score >= Decimal::from(40)
            }
            AutoEntryPolicy::VolumeBreakout => snapshot.volume_surge && snapshot.total_score >= Decimal::from(60),
        }
    }

    pub async fn log_autotrade(
        &self,
        account_id: &str,
        action: AutoTradeAction,
        symbol: Symbol,
        reason: impl Into<String>,
        score: Decimal,
        success: bool,
    ) -> Result<(), AppError> {
        let entry = AutoTradeLogEntry::new(account_id, action, symbol, reason, score, success);
        self.db.insert_autotrade_log(&entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot_for(symbol: Symbol, total: Decimal, technical: Decimal, golden_cross: bool, above_ema: bool, volume_score: Decimal, surge: bool) -> ScreeningSnapshot {
        ScreeningSnapshot {
            symbol,
            timeframe: crate::types::TimeFrame::M15,
            timestamp: chrono::Utc::now(),
            beta_score: dec!(50),
            volume_score,
            technical_score: technical,
            total_score: total,
            above_sma: above_ema,
            macd_golden_cross: golden_cross,
            above_all_ema: above_ema,
            volume_surge: surge,
            price_anomaly: false,
            price_btc_ratio: dec!(1),
            price_eth_ratio: dec!(1),
            btc_ratio_change_24h_pct: dec!(0),
            eth_ratio_change_24h_pct: dec!(0),
            price_change_5m_pct: None,
            price_change_15m_pct: None,
            price_change_1h_pct: None,
            current_price: dec!(10),
            volume_24h: dec!(5_000_000),
        }
    }

    #[test]
    fn strict_policy_requires_all_five_conditions() {
        let mut account = SimAccount::new("acct", dec!(10_000));
        account.auto_entry_policy = AutoEntryPolicy::Strict;
        account.entry_score_min = dec!(75);
        account.entry_technical_min = dec!(60);

        let passing = snapshot_for(Symbol::usdt("SOL"), dec!(80), dec!(80), true, true, dec!(60), true);
        assert!(PaperTradingEngine::evaluate_auto_entry(&account, &passing, Decimal::ZERO));

        let missing_cross = snapshot_for(Symbol::usdt("SOL"), dec!(80), dec!(80), false, true, dec!(60), true);
        assert!(!PaperTradingEngine::evaluate_auto_entry(&account, &missing_cross, Decimal::ZERO));
    }

    #[test]
    fn preferred_window_bonus_only_shifts_total_score_threshold() {
        let mut account = SimAccount::new("acct", dec!(10_000));
        account.entry_score_min = dec!(75);
        account.entry_technical_min = dec!(60);

        let borderline = snapshot_for(Symbol::usdt("SOL"), dec!(71), dec!(80), true, true, dec!(60), true);
        assert!(!PaperTradingEngine::evaluate_auto_entry(&account, &borderline, Decimal::ZERO));
        assert!(PaperTradingEngine::evaluate_auto_entry(&account, &borderline, dec!(5)));
    }

    #[tokio::test]
    async fn ladder_take_profit_closes_one_level_per_price_tick() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let engine = PaperTradingEngine::new(Arc::clone(&db));

        let mut account = SimAccount::new("acct", dec!(10_000));
        account.take_profit_levels = vec![dec!(6), dec!(9), dec!(12)];
        db.create_account(&account).await.unwrap();

        let (mut position, _) = engine.open_position(&mut account, &Symbol::usdt("XYZ"), dec!(100), dec!(80)).await.unwrap();
        assert_eq!(position.take_profit_prices, vec![dec!(106), dec!(109), dec!(112)]);

        let trade = engine.check_exits(&mut account, &mut position, dec!(107)).await.unwrap().unwrap();
        assert_eq!(trade.exit_reason, Some(CloseReason::TakeProfit(1)));
        assert_eq!(position.take_profit_prices, vec![dec!(109), dec!(112)]);
        assert!(!position.is_closed);

        let trade = engine.check_exits(&mut account, &mut position, dec!(110)).await.unwrap().unwrap();
        assert_eq!(trade.exit_reason, Some(CloseReason::TakeProfit(2)));
        assert_eq!(position.take_profit_prices, vec![dec!(112)]);
        assert!(!position.is_closed);

        let trade = engine.check_exits(&mut account, &mut position, dec!(113)).await.unwrap().unwrap();
        assert_eq!(trade.exit_reason, Some(CloseReason::TakeProfit(3)));
        assert!(position.is_closed);
        assert!(position.remaining_quantity.is_zero());
    }

    #[test]
    fn volume_breakout_policy_ignores_technical_conditions() {
        let mut account = SimAccount::new("acct", dec!(10_000));
        account.auto_entry_policy = AutoEntryPolicy::VolumeBreakout;

        let passing = snapshot_for(Symbol::usdt("SOL"), dec!(65), dec!(10), false, false, dec!(10), true);
        assert!(PaperTradingEngine::evaluate_auto_entry(&account, &passing, Decimal::ZERO));

        let no_surge = snapshot_for(Symbol::usdt("SOL"), dec!(65), dec!(10), false, false, dec!(10), false);
        assert!(!PaperTradingEngine::evaluate_auto_entry(&account, &no_surge, Decimal::ZERO));
    }
}
