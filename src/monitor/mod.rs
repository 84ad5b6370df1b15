use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::database::Database;
use crate::engine::PaperTradingEngine;
use crate::error::AppError;
use crate::exchange::Exchange;
use crate::notifications::{self, AlertType, NotificationManager};
use crate::screener::Screener;
use crate::tsdb::TsDb;
use crate::types::{AutoTradeAction, TimeFrame};

/// The periodic driver (§4.7): screen, notify the top survivors past the
/// gate, enforce exits then evaluate auto-entries for every opted-in
/// account, and sweep retention every `retention_sweep_every_n_days`.
pub struct Monitor {
    db: Arc<Database>,
    tsdb: Arc<TsDb>,
    exchange: Arc<dyn Exchange>,
    screener: Arc<Screener>,
    engine: Arc<PaperTradingEngine>,
    notifications: Arc<NotificationManager>,
    timezone: Tz,
    update_interval_secs: u64,
    retention_sweep_every_n_days: i64,
    candle_retention_days: i64,
    snapshot_retention_days: i64,
    timeframe: TimeFrame,
    preferred_windows: Vec<(u32, u32)>,
    preferred_window_bonus: Decimal,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        tsdb: Arc<TsDb>,
        exchange: Arc<dyn Exchange>,
        screener: Arc<Screener>,
        engine: Arc<PaperTradingEngine>,
        notifications: Arc<NotificationManager>,
        timezone: Tz,
        update_interval_secs: u64,
        retention_sweep_every_n_days: i64,
        candle_retention_days: i64,
        snapshot_retention_days: i64,
        timeframe: TimeFrame,
        preferred_windows: Vec<(u32, u32)>,
        preferred_window_bonus: Decimal,
    ) -> Self {
        Self {
            db,
            tsdb,
            exchange,
            screener,
            engine,
            notifications,
            timezone,
            update_interval_secs,
            retention_sweep_every_n_days,
            candle_retention_days,
            snapshot_retention_days,
            timeframe,
            preferred_windows,
            preferred_window_bonus,
        }
    }

    /// Non-zero only while the operator-local hour falls in a configured
    /// `[start, end)` preferred window (§4.6, §A.9).
    fn preferred_window_bonus_now(&self) -> Decimal {
        let hour = Utc::now().with_timezone(&self.timezone).hour();
        let in_window = self.preferred_windows.iter().any(|&(start, end)| {
            if start <= end {
                (start..end).contains(&hour)
            } else {
                hour >= start || hour < end
            }
        });
        if in_window {
            self.preferred_window_bonus
        } else {
            Decimal::ZERO
        }
    }

    /// Runs cycles on `update_interval_secs` cadence until ctrl-c.
    pub async fn run(&self) {
        let mut ticker = interval(Duration::from_secs(self.update_interval_secs));
        let mut cycle: i64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_cycle(cycle).await {
                        error!(error = %err, "monitor cycle failed");
                    }
                    cycle += 1;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received, exiting monitor loop");
                    return;
                }
            }
        }
    }

    async fn run_cycle(&self, cycle: i64) -> Result<(), AppError> {
        let mut settings = self.db.notification_settings().await?;

        let survivors = match self.screener.run_pass(self.timeframe).await {
            Ok(survivors) => survivors,
            Err(AppError::NoMarketData) => {
                warn!("no market data available, skipping this cycle's screening");
                self.notifications.notify(AlertType::NoMarketData).await;
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let mut notable: Vec<_> = survivors.iter().filter(|s| s.total_score >= settings.min_score_threshold).collect();
        notable.sort_by(|a, b| b.total_score.cmp(&a.total_score));
        notable.truncate(settings.notify_top_n);

        for snapshot in &notable {
            let alert = AlertType::ScreeningOpportunity {
                symbol: snapshot.symbol.clone(),
                total_score: snapshot.total_score.to_string(),
                technical_score: snapshot.technical_score.to_string(),
                beta_score: snapshot.beta_score.to_string(),
            };
            if let Err(reason) = self.notifications.notify_gated(alert, &mut settings, self.timezone).await {
                info!(symbol = %snapshot.symbol, reason, "notification suppressed by gate");
            }
        }

        for account in self.db.auto_trading_accounts().await? {
            if let Err(err) = self.run_account_cycle(account, &survivors).await {
                error!(error = %err, "account auto-trading cycle failed");
            }
        }

        if self.retention_sweep_every_n_days > 0 && cycle % self.retention_sweep_every_n_days == 0 {
            self.sweep_retention().await?;
        }

        Ok(())
    }

    /// Exits before entries within one account's cycle (§5 ordering
    /// guarantee): every open position is checked against the latest price
    /// first, then auto-entry is evaluated against the fresh survivor list.
    /// A held position whose symbol no longer survives the screener's
    /// prefilter (plausible exactly when its price is falling) still gets
    /// its price fetched directly from the exchange — exit enforcement
    /// never depends on a symbol remaining in the post-filter survivor
    /// list (§4.6: "for each open position, obtain current price").
    async fn run_account_cycle(&self, mut account: crate::types::SimAccount, survivors: &[crate::types::ScreeningSnapshot]) -> Result<(), AppError> {
        let mut positions = self.db.open_positions_for_account(&account.id).await?;
        let prices: std::collections::HashMap<_, _> = survivors.iter().map(|s| (s.symbol.clone(), s.current_price)).collect();

        for position in &mut positions {
            let price = match prices.get(&position.symbol) {
                Some(&price) => price,
                None => match self.exchange.fetch_ticker(&position.symbol).await {
                    Ok(ticker) => ticker.price,
                    Err(err) => {
                        warn!(symbol = %position.symbol, error = %err, "could not fetch price for open position outside survivor list");
                        continue;
                    }
                },
            };
            if let Some(trade) = self.engine.check_exits(&mut account, position, price).await? {
                let alert = notifications::position_closed(
                    account.id.clone(),
                    position.symbol.clone(),
                    trade.pnl.unwrap_or(Decimal::ZERO),
                    trade.pnl_pct.unwrap_or(Decimal::ZERO),
                    trade.exit_reason.map(|r| r.as_str()).unwrap_or_default(),
                );
                self.notifications.notify(alert).await;
            }
        }

        let score_bonus = self.preferred_window_bonus_now();
        for snapshot in survivors {
            if PaperTradingEngine::evaluate_auto_entry(&account, snapshot, score_bonus) {
                match self.engine.open_position(&mut account, &snapshot.symbol, snapshot.current_price, snapshot.total_score).await {
                    Ok((_, _)) => {
                        self.engine
                            .log_autotrade(&account.id, AutoTradeAction::OpenPosition, snapshot.symbol.clone(), "auto-entry criteria met", snapshot.total_score, true)
                            .await?;
                        self.notifications.notify(notifications::position_opened(account.id.clone(), snapshot.symbol.clone(), Decimal::ZERO, snapshot.current_price)).await;
                    }
                    Err(AppError::Capacity(reason)) => {
                        self.engine
                            .log_autotrade(&account.id, AutoTradeAction::Skip, snapshot.symbol.clone(), reason, snapshot.total_score, false)
                            .await?;
                    }
                    Err(err) => {
                        self.engine
                            .log_autotrade(&account.id, AutoTradeAction::Error, snapshot.symbol.clone(), err.to_string(), snapshot.total_score, false)
                            .await?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn sweep_retention(&self) -> Result<(), AppError> {
        let snapshot_cutoff = chrono::Utc::now() - chrono::Duration::days(self.snapshot_retention_days);
        let candle_cutoff = chrono::Utc::now() - chrono::Duration::days(self.candle_retention_days);
        let snapshots_removed = self.db.prune_snapshots_older_than(snapshot_cutoff).await?;
        let candles_removed = self.tsdb.prune_older_than(candle_cutoff).await?;
        info!(snapshots_removed, candles_removed, "swept old data");
        Ok(())
    }
}
