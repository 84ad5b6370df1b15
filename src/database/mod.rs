use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use crate::error::AppError;
use crate::types::{
    AutoEntryPolicy, AutoTradeLogEntry, CloseReason, NotificationSettings, PartialExit, ScreeningSnapshot, Side,
    SimAccount, SimPosition, SimTrade, Symbol, TimeFrame, TradeType,
};

/// The relational store: accounts, positions, trades, screening snapshots,
/// notification settings, notifications, and the auto-trade log (§3, §6
/// "Persisted state layout"). Candles live in the separate [`crate::tsdb::TsDb`].
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self, AppError> {
        info!(url = %db_url, "opening relational database");
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sim_accounts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                initial_balance TEXT NOT NULL,
                current_balance TEXT NOT NULL,
                frozen_balance TEXT NOT NULL,
                max_positions INTEGER NOT NULL,
                position_size_pct TEXT NOT NULL,
                entry_score_min TEXT NOT NULL,
                entry_technical_min TEXT NOT NULL,
                stop_loss_pct TEXT NOT NULL,
                take_profit_levels TEXT NOT NULL,
                commission_rate TEXT NOT NULL,
                auto_trading_enabled INTEGER NOT NULL,
                auto_entry_policy TEXT NOT NULL,
                total_trades INTEGER NOT NULL,
                winning_trades INTEGER NOT NULL,
                losing_trades INTEGER NOT NULL,
                total_pnl TEXT NOT NULL,
                total_commission TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sim_positions (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                quantity TEXT NOT NULL,
                entry_value TEXT NOT NULL,
                entry_score TEXT NOT NULL,
                stop_loss_price TEXT NOT NULL,
                take_profit_prices TEXT NOT NULL,
                take_profit_count_initial INTEGER NOT NULL,
                remaining_quantity TEXT NOT NULL,
                current_price TEXT NOT NULL,
                is_closed INTEGER NOT NULL,
                close_reason TEXT,
                closed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sim_positions_account ON sim_positions(account_id, is_closed)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS partial_exits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                position_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                quantity TEXT NOT NULL,
                price TEXT NOT NULL,
                pnl TEXT NOT NULL,
                pnl_pct TEXT NOT NULL,
                commission TEXT NOT NULL,
                reason TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_partial_exits_position ON partial_exits(position_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sim_trades (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                position_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                trade_type TEXT NOT NULL,
                side TEXT NOT NULL,
                price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                value TEXT NOT NULL,
                commission TEXT NOT NULL,
                pnl TEXT,
                pnl_pct TEXT,
                exit_reason TEXT,
                trade_time TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sim_trades_account ON sim_trades(account_id, trade_time DESC)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS screening_snapshots (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                beta_score TEXT NOT NULL,
                volume_score TEXT NOT NULL,
                technical_score TEXT NOT NULL,
                total_score TEXT NOT NULL,
                above_sma INTEGER NOT NULL,
                macd_golden_cross INTEGER NOT NULL,
                above_all_ema INTEGER NOT NULL,
                volume_surge INTEGER NOT NULL,
                price_anomaly INTEGER NOT NULL,
                price_btc_ratio TEXT NOT NULL,
                price_eth_ratio TEXT NOT NULL,
                btc_ratio_change_24h_pct TEXT NOT NULL,
                eth_ratio_change_24h_pct TEXT NOT NULL,
                price_change_5m_pct TEXT,
                price_change_15m_pct TEXT,
                price_change_1h_pct TEXT,
                current_price TEXT NOT NULL,
                volume_24h TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_tf_time ON screening_snapshots(timeframe, timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notification_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                email_enabled INTEGER NOT NULL,
                messaging_enabled INTEGER NOT NULL,
                min_interval_minutes INTEGER NOT NULL,
                daily_limit INTEGER NOT NULL,
                daily_count INTEGER NOT NULL,
                last_daily_reset TEXT NOT NULL,
                last_notification_time TEXT,
                min_score_threshold TEXT NOT NULL,
                notify_top_n INTEGER NOT NULL,
                quiet_hours_start INTEGER,
                quiet_hours_end INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auto_trade_log (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                action TEXT NOT NULL,
                symbol TEXT NOT NULL,
                reason TEXT NOT NULL,
                score_snapshot TEXT NOT NULL,
                success INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_autotrade_account ON auto_trade_log(account_id, timestamp DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---- accounts ----

    pub async fn create_account(&self, account: &SimAccount) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sim_accounts (
                id, name, initial_balance, current_balance, frozen_balance, max_positions,
                position_size_pct, entry_score_min, entry_technical_min, stop_loss_pct,
                take_profit_levels, commission_rate, auto_trading_enabled, auto_entry_policy,
                total_trades, winning_trades, losing_trades, total_pnl, total_commission
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(account.initial_balance.to_string())
        .bind(account.current_balance.to_string())
        .bind(account.frozen_balance.to_string())
        .bind(account.max_positions as i64)
        .bind(account.position_size_pct.to_string())
        .bind(account.entry_score_min.to_string())
        .bind(account.entry_technical_min.to_string())
        .bind(account.stop_loss_pct.to_string())
        .bind(serde_json::to_string(&account.take_profit_levels)?)
        .bind(account.commission_rate.to_string())
        .bind(account.auto_trading_enabled as i64)
        .bind(format!("{:?}", account.auto_entry_policy))
        .bind(account.total_trades as i64)
        .bind(account.winning_trades as i64)
        .bind(account.losing_trades as i64)
        .bind(account.total_pnl.to_string())
        .bind(account.total_commission.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_account(&self, account: &SimAccount) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sim_accounts SET
                current_balance = ?, frozen_balance = ?, auto_trading_enabled = ?,
                total_trades = ?, winning_trades = ?, losing_trades = ?,
                total_pnl = ?, total_commission = ?
            WHERE id = ?
            "#,
        )
        .bind(account.current_balance.to_string())
        .bind(account.frozen_balance.to_string())
        .bind(account.auto_trading_enabled as i64)
        .bind(account.total_trades as i64)
        .bind(account.winning_trades as i64)
        .bind(account.losing_trades as i64)
        .bind(account.total_pnl.to_string())
        .bind(account.total_commission.to_string())
        .bind(&account.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_account(&self, id: &str) -> Result<Option<SimAccount>, AppError> {
        let row = sqlx::query("SELECT * FROM sim_accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(account_from_row).transpose()
    }

    pub async fn list_accounts(&self) -> Result<Vec<SimAccount>, AppError> {
        let rows = sqlx::query("SELECT * FROM sim_accounts ORDER BY name").fetch_all(&self.pool).await?;
        rows.into_iter().map(account_from_row).collect()
    }

    pub async fn auto_trading_accounts(&self) -> Result<Vec<SimAccount>, AppError> {
        let rows = sqlx::query("SELECT * FROM sim_accounts WHERE auto_trading_enabled = 1")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(account_from_row).collect()
    }

    // ---- positions ----

    pub async fn open_positions_for_account(&self, account_id: &str) -> Result<Vec<SimPosition>, AppError> {
        let rows = sqlx::query("SELECT * FROM sim_positions WHERE account_id = ? AND is_closed = 0")
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
        let mut positions = Vec::new();
        for row in rows {
            positions.push(self.hydrate_position(row).await?);
        }
        Ok(positions)
    }

    pub async fn open_position_for_symbol(&self, account_id: &str, symbol: &Symbol) -> Result<Option<SimPosition>, AppError> {
        let row = sqlx::query("SELECT * FROM sim_positions WHERE account_id = ? AND symbol = ? AND is_closed = 0")
            .bind(account_id)
            .bind(symbol.exchange_format())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate_position(row).await?)),
            None => Ok(None),
        }
    }

    async fn hydrate_position(&self, row: sqlx::sqlite::SqliteRow) -> Result<SimPosition, AppError> {
        let mut position = position_from_row(row)?;
        let exit_rows = sqlx::query("SELECT * FROM partial_exits WHERE position_id = ? ORDER BY timestamp ASC")
            .bind(&position.id)
            .fetch_all(&self.pool)
            .await?;
        position.partial_exits = exit_rows.into_iter().map(partial_exit_from_row).collect::<Result<_, _>>()?;
        Ok(position)
    }

    pub async fn upsert_position(&self, position: &SimPosition) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sim_positions (
                id, account_id, symbol, entry_price, entry_time, quantity, entry_value, entry_score,
                stop_loss_price, take_profit_prices, take_profit_count_initial, remaining_quantity,
                current_price, is_closed, close_reason, closed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                take_profit_prices = excluded.take_profit_prices,
                remaining_quantity = excluded.remaining_quantity,
                current_price = excluded.current_price,
                is_closed = excluded.is_closed,
                close_reason = excluded.close_reason,
                closed_at = excluded.closed_at
            "#,
        )
        .bind(&position.id)
        .bind(&position.account_id)
        .bind(position.symbol.exchange_format())
        .bind(position.entry_price.to_string())
        .bind(position.entry_time.to_rfc3339())
        .bind(position.quantity.to_string())
        .bind(position.entry_value.to_string())
        .bind(position.entry_score.to_string())
        .bind(position.stop_loss_price.to_string())
        .bind(serde_json::to_string(&position.take_profit_prices)?)
        .bind(position.take_profit_count_initial as i64)
        .bind(position.remaining_quantity.to_string())
        .bind(position.current_price.to_string())
        .bind(position.is_closed as i64)
        .bind(position.close_reason.map(|r| r.as_str()))
        .bind(position.closed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_partial_exit(&self, position_id: &str, exit: &PartialExit) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO partial_exits (position_id, timestamp, quantity, price, pnl, pnl_pct, commission, reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position_id)
        .bind(exit.timestamp.to_rfc3339())
        .bind(exit.quantity.to_string())
        .bind(exit.price.to_string())
        .bind(exit.pnl.to_string())
        .bind(exit.pnl_pct.to_string())
        .bind(exit.commission.to_string())
        .bind(exit.reason.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- trades ----

    pub async fn insert_trade(&self, trade: &SimTrade) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sim_trades (
                id, account_id, position_id, symbol, trade_type, side, price, quantity,
                value, commission, pnl, pnl_pct, exit_reason, trade_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.account_id)
        .bind(&trade.position_id)
        .bind(trade.symbol.exchange_format())
        .bind(trade.trade_type.as_str())
        .bind(trade.side.as_str())
        .bind(trade.price.to_string())
        .bind(trade.quantity.to_string())
        .bind(trade.value.to_string())
        .bind(trade.commission.to_string())
        .bind(trade.pnl.map(|p| p.to_string()))
        .bind(trade.pnl_pct.map(|p| p.to_string()))
        .bind(trade.exit_reason.map(|r| r.as_str()))
        .bind(trade.trade_time.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn trades_for_account(&self, account_id: &str, limit: i64) -> Result<Vec<SimTrade>, AppError> {
        let rows = sqlx::query("SELECT * FROM sim_trades WHERE account_id = ? ORDER BY trade_time DESC LIMIT ?")
            .bind(account_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(trade_from_row).collect()
    }

    // ---- screening snapshots ----

    /// Deletes any prior rows for `timeframe` within `[now-5min, now]`, then
    /// inserts the new batch, all within one transaction (§4.5 dedup, invariant 9).
    pub async fn persist_snapshot_batch(&self, timeframe: TimeFrame, rows: &[ScreeningSnapshot]) -> Result<(), AppError> {
        let now = Utc::now();
        let window_start = now - chrono::Duration::minutes(5);

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM screening_snapshots WHERE timeframe = ? AND timestamp >= ? AND timestamp <= ?")
            .bind(timeframe.as_str())
            .bind(window_start.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO screening_snapshots (
                    symbol, timeframe, timestamp, beta_score, volume_score, technical_score, total_score,
                    above_sma, macd_golden_cross, above_all_ema, volume_surge, price_anomaly,
                    price_btc_ratio, price_eth_ratio, btc_ratio_change_24h_pct, eth_ratio_change_24h_pct,
                    price_change_5m_pct, price_change_15m_pct, price_change_1h_pct, current_price, volume_24h
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.symbol.exchange_format())
            .bind(row.timeframe.as_str())
            .bind(row.timestamp.to_rfc3339())
            .bind(row.beta_score.to_string())
            .bind(row.volume_score.to_string())
            .bind(row.technical_score.to_string())
            .bind(row.total_score.to_string())
            .bind(row.above_sma as i64)
            .bind(row.macd_golden_cross as i64)
            .bind(row.above_all_ema as i64)
            .bind(row.volume_surge as i64)
            .bind(row.price_anomaly as i64)
            .bind(row.price_btc_ratio.to_string())
            .bind(row.price_eth_ratio.to_string())
            .bind(row.btc_ratio_change_24h_pct.to_string())
            .bind(row.eth_ratio_change_24h_pct.to_string())
            .bind(row.price_change_5m_pct.map(|v| v.to_string()))
            .bind(row.price_change_15m_pct.map(|v| v.to_string()))
            .bind(row.price_change_1h_pct.map(|v| v.to_string()))
            .bind(row.current_price.to_string())
            .bind(row.volume_24h.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn top_opportunities(&self, timeframe: TimeFrame, min_score: Option<Decimal>, limit: i64) -> Result<Vec<ScreeningSnapshot>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM screening_snapshots
            WHERE timeframe = ? AND total_score >= ?
            ORDER BY timestamp DESC, CAST(total_score AS REAL) DESC
            LIMIT ?
            "#,
        )
        .bind(timeframe.as_str())
        .bind(min_score.unwrap_or(Decimal::ZERO).to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(snapshot_from_row).collect()
    }

    pub async fn prune_snapshots_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM screening_snapshots WHERE timestamp < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ---- notification settings ----

    pub async fn notification_settings(&self) -> Result<NotificationSettings, AppError> {
        let row = sqlx::query("SELECT * FROM notification_settings WHERE id = 1").fetch_optional(&self.pool).await?;
        match row {
            Some(row) => notification_settings_from_row(row),
            None => {
                let defaults = NotificationSettings::default();
                self.save_notification_settings(&defaults).await?;
                Ok(defaults)
            }
        }
    }

    pub async fn save_notification_settings(&self, settings: &NotificationSettings) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notification_settings (
                id, email_enabled, messaging_enabled, min_interval_minutes, daily_limit, daily_count,
                last_daily_reset, last_notification_time, min_score_threshold, notify_top_n,
                quiet_hours_start, quiet_hours_end
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email_enabled = excluded.email_enabled,
                messaging_enabled = excluded.messaging_enabled,
                min_interval_minutes = excluded.min_interval_minutes,
                daily_limit = excluded.daily_limit,
                daily_count = excluded.daily_count,
                last_daily_reset = excluded.last_daily_reset,
                last_notification_time = excluded.last_notification_time,
                min_score_threshold = excluded.min_score_threshold,
                notify_top_n = excluded.notify_top_n,
                quiet_hours_start = excluded.quiet_hours_start,
                quiet_hours_end = excluded.quiet_hours_end
            "#,
        )
        .bind(settings.email_enabled as i64)
        .bind(settings.messaging_enabled as i64)
        .bind(settings.min_interval_minutes)
        .bind(settings.daily_limit as i64)
        .bind(settings.daily_count as i64)
        .bind(settings.last_daily_reset.to_string())
        .bind(settings.last_notification_time.map(|t| t.to_rfc3339()))
        .bind(settings.min_score_threshold.to_string())
        .bind(settings.notify_top_n as i64)
        .bind(settings.quiet_hours.map(|(s, _)| s as i64))
        .bind(settings.quiet_hours.map(|(_, e)| e as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- auto-trade log ----

    pub async fn insert_autotrade_log(&self, entry: &AutoTradeLogEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO auto_trade_log (id, account_id, timestamp, action, symbol, reason, score_snapshot, success)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.account_id)
        .bind(entry.timestamp.to_rfc3339())
        .bind(entry.action.as_str())
        .bind(entry.symbol.exchange_format())
        .bind(&entry.reason)
        .bind(entry.score_snapshot.to_string())
        .bind(entry.success as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn get_decimal(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<Decimal, AppError> {
    let s: String = row.try_get(col)?;
    Decimal::from_str(&s).map_err(|e| AppError::Validation(e.to_string()))
}

fn get_opt_decimal(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<Option<Decimal>, AppError> {
    let s: Option<String> = row.try_get(col)?;
    s.map(|s| Decimal::from_str(&s).map_err(|e| AppError::Validation(e.to_string()))).transpose()
}

fn get_symbol(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<Symbol, AppError> {
    let s: String = row.try_get(col)?;
    Symbol::parse(&s).ok_or_else(|| AppError::Validation(format!("invalid symbol: {s}")))
}

fn get_timestamp(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<DateTime<Utc>, AppError> {
    let s: String = row.try_get(col)?;
    Ok(DateTime::parse_from_rfc3339(&s).map_err(|e| AppError::Validation(e.to_string()))?.with_timezone(&Utc))
}

fn get_opt_timestamp(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    let s: Option<String> = row.try_get(col)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| AppError::Validation(e.to_string()))
    })
    .transpose()
}

fn close_reason_from_str(s: &str) -> Option<CloseReason> {
    if s == "STOP_LOSS" {
        Some(CloseReason::StopLoss)
    } else if s == "MANUAL" {
        Some(CloseReason::Manual)
    } else if s == "TIME_STOP" {
        Some(CloseReason::TimeStop)
    } else if let Some(k) = s.strip_prefix("TAKE_PROFIT_") {
        k.parse().ok().map(CloseReason::TakeProfit)
    } else {
        None
    }
}

fn account_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SimAccount, AppError> {
    let auto_entry_policy_str: String = row.try_get("auto_entry_policy")?;
    let tp_levels_json: String = row.try_get("take_profit_levels")?;
    Ok(SimAccount {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        initial_balance: get_decimal(&row, "initial_balance")?,
        current_balance: get_decimal(&row, "current_balance")?,
        frozen_balance: get_decimal(&row, "frozen_balance")?,
        max_positions: row.try_get::<i64, _>("max_positions")? as usize,
        position_size_pct: get_decimal(&row, "position_size_pct")?,
        entry_score_min: get_decimal(&row, "entry_score_min")?,
        entry_technical_min: get_decimal(&row, "entry_technical_min")?,
        stop_loss_pct: get_decimal(&row, "stop_loss_pct")?,
        take_profit_levels: serde_json::from_str(&tp_levels_json)?,
        commission_rate: get_decimal(&row, "commission_rate")?,
        auto_trading_enabled: row.try_get::<i64, _>("auto_trading_enabled")? != 0,
        auto_entry_policy: if auto_entry_policy_str == "VolumeBreakout" {
            AutoEntryPolicy::VolumeBreakout
        } else {
            AutoEntryPolicy::Strict
        },
        total_trades: row.try_get::<i64, _>("total_trades")? as u64,
        winning_trades: row.try_get::<i64, _>("winning_trades")? as u64,
        losing_trades: row.try_get::<i64, _>("losing_trades")? as u64,
        total_pnl: get_decimal(&row, "total_pnl")?,
        total_commission: get_decimal(&row, "total_commission")?,
    })
}

fn position_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SimPosition, AppError> {
    let tp_prices_json: String = row.try_get("take_profit_prices")?;
    let close_reason_str: Option<String> = row.try_get("close_reason")?;
    Ok(SimPosition {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        symbol: get_symbol(&row, "symbol")?,
        entry_price: get_decimal(&row, "entry_price")?,
        entry_time: get_timestamp(&row, "entry_time")?,
        quantity: get_decimal(&row, "quantity")?,
        entry_value: get_decimal(&row, "entry_value")?,
        entry_score: get_decimal(&row, "entry_score")?,
        stop_loss_price: get_decimal(&row, "stop_loss_price")?,
        take_profit_prices: serde_json::from_str(&tp_prices_json)?,
        take_profit_count_initial: row.try_get::<i64, _>("take_profit_count_initial")? as usize,
        remaining_quantity: get_decimal(&row, "remaining_quantity")?,
        partial_exits: Vec::new(),
        current_price: get_decimal(&row, "current_price")?,
        is_closed: row.try_get::<i64, _>("is_closed")? != 0,
        close_reason: close_reason_str.and_then(|s| close_reason_from_str(&s)),
        closed_at: get_opt_timestamp(&row, "closed_at")?,
    })
}

fn partial_exit_from_row(row: sqlx::sqlite::SqliteRow) -> Result<PartialExit, AppError> {
    let reason_str: String = row.try_get("reason")?;
    Ok(PartialExit {
        timestamp: get_timestamp(&row, "timestamp")?,
        quantity: get_decimal(&row, "quantity")?,
        price: get_decimal(&row, "price")?,
        pnl: get_decimal(&row, "pnl")?,
        pnl_pct: get_decimal(&row, "pnl_pct")?,
        commission: get_decimal(&row, "commission")?,
        reason: close_reason_from_str(&reason_str).unwrap_or(CloseReason::Manual),
    })
}

fn trade_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SimTrade, AppError> {
    let trade_type_str: String = row.try_get("trade_type")?;
    let side_str: String = row.try_get("side")?;
    let exit_reason_str: Option<String> = row.try_get("exit_reason")?;
    Ok(SimTrade {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        position_id: row.try_get("position_id")?,
        symbol: get_symbol(&row, "symbol")?,
        trade_type: match trade_type_str.as_str() {
            "ENTRY" => TradeType::Entry,
            "FULL_EXIT" => TradeType::FullExit,
            _ => TradeType::PartialExit,
        },
        side: if side_str == "BUY" { Side::Buy } else { Side::Sell },
        price: get_decimal(&row, "price")?,
        quantity: get_decimal(&row, "quantity")?,
        value: get_decimal(&row, "value")?,
        commission: get_decimal(&row, "commission")?,
        pnl: get_opt_decimal(&row, "pnl")?,
        pnl_pct: get_opt_decimal(&row, "pnl_pct")?,
        exit_reason: exit_reason_str.and_then(|s| close_reason_from_str(&s)),
        trade_time: get_timestamp(&row, "trade_time")?,
    })
}

fn snapshot_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ScreeningSnapshot, AppError> {
    let timeframe_str: String = row.try_get("timeframe")?;
    Ok(ScreeningSnapshot {
        symbol: get_symbol(&row, "symbol")?,
        timeframe: TimeFrame::from_str(&timeframe_str).ok_or_else(|| AppError::Validation("bad timeframe".into()))?,
        timestamp: get_timestamp(&row, "timestamp")?,
        beta_score: get_decimal(&row, "beta_score")?,
        volume_score: get_decimal(&row, "volume_score")?,
        technical_score: get_decimal(&row, "technical_score")?,
        total_score: get_decimal(&row, "total_score")?,
        above_sma: row.try_get::<i64, _>("above_sma")? != 0,
        macd_golden_cross: row.try_get::<i64, _>("macd_golden_cross")? != 0,
        above_all_ema: row.try_get::<i64, _>("above_all_ema")? != 0,
        volume_surge: row.try_get::<i64, _>("volume_surge")? != 0,
        price_anomaly: row.try_get::<i64, _>("price_anomaly")? != 0,
        price_btc_ratio: get_decimal(&row, "price_btc_ratio")?,
        price_eth_ratio: get_decimal(&row, "price_eth_ratio")?,
        btc_ratio_change_24h_pct: get_decimal(&row, "btc_ratio_change_24h_pct")?,
        eth_ratio_change_24h_pct: get_decimal(&row, "eth_ratio_change_24h_pct")?,
        price_change_5m_pct: get_opt_decimal(&row, "price_change_5m_pct")?,
        price_change_15m_pct: get_opt_decimal(&row, "price_change_15m_pct")?,
        price_change_1h_pct: get_opt_decimal(&row, "price_change_1h_pct")?,
        current_price: get_decimal(&row, "current_price")?,
        volume_24h: get_decimal(&row, "volume_24h")?,
    })
}

fn notification_settings_from_row(row: sqlx::sqlite::SqliteRow) -> Result<NotificationSettings, AppError> {
    let last_reset_str: String = row.try_get("last_daily_reset")?;
    let start: Option<i64> = row.try_get("quiet_hours_start")?;
    let end: Option<i64> = row.try_get("quiet_hours_end")?;
    Ok(NotificationSettings {
        email_enabled: row.try_get::<i64, _>("email_enabled")? != 0,
        messaging_enabled: row.try_get::<i64, _>("messaging_enabled")? != 0,
        min_interval_minutes: row.try_get("min_interval_minutes")?,
        daily_limit: row.try_get::<i64, _>("daily_limit")? as u32,
        daily_count: row.try_get::<i64, _>("daily_count")? as u32,
        last_daily_reset: NaiveDate::from_str(&last_reset_str).map_err(|e| AppError::Validation(e.to_string()))?,
        last_notification_time: get_opt_timestamp(&row, "last_notification_time")?,
        min_score_threshold: get_decimal(&row, "min_score_threshold")?,
        notify_top_n: row.try_get::<i64, _>("notify_top_n")? as usize,
        quiet_hours: match (start, end) {
            (Some(s), Some(e)) => Some((s as u32, e as u32)),
            _ => None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(symbol: Symbol, timestamp: DateTime<Utc>) -> ScreeningSnapshot {
        ScreeningSnapshot {
            symbol,
            timeframe: TimeFrame::M15,
            timestamp,
            beta_score: dec!(50),
            volume_score: dec!(60),
            technical_score: dec!(80),
            total_score: dec!(70),
            above_sma: true,
            macd_golden_cross: true,
            above_all_ema: true,
            volume_surge: false,
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

    #[tokio::test]
    async fn two_passes_within_five_minutes_leave_exactly_one_snapshot() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let t0 = Utc::now();
        let symbol = Symbol::usdt("AAA");

        db.persist_snapshot_batch(TimeFrame::M15, &[snapshot(symbol.clone(), t0)]).await.unwrap();
        let t1 = t0 + chrono::Duration::minutes(2);
        db.persist_snapshot_batch(TimeFrame::M15, &[snapshot(symbol.clone(), t1)]).await.unwrap();

        let rows = db.top_opportunities(TimeFrame::M15, None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].timestamp >= t1 - chrono::Duration::seconds(1));
    }
}
