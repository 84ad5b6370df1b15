use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::debug;

use crate::error::AppError;
use crate::types::{Candle, Symbol, TimeFrame};

/// Candle store, separate from the relational [`crate::database::Database`]
/// (§9: "global mutable caches" and the TSDB are independent stores). Only
/// the 5m base series is ever written; every other timeframe is derived by
/// aggregating that series on read, never persisted (§3).
pub struct TsDb {
    pool: SqlitePool,
}

impl TsDb {
    /// Stored 5m candles pulled back per rollup read; generous enough to
    /// cover a `1d` bucket's worth of history at typical `limit` values.
    const BASE_LOOKBACK: u32 = 10_000;

    pub async fn new(db_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                open_time TEXT NOT NULL,
                close_time TEXT NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                quote_volume TEXT NOT NULL,
                trades INTEGER NOT NULL,
                is_closed INTEGER NOT NULL,
                PRIMARY KEY (symbol, timeframe, open_time)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_candles_lookup ON candles(symbol, timeframe, open_time DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Upserts a batch of candles; a re-fetched, still-open candle overwrites
    /// the prior row for the same `(symbol, timeframe, open_time)` (§4.2, §4.4
    /// idempotent replay).
    pub async fn upsert_candles(&self, candles: &[Candle]) -> Result<(), AppError> {
        if candles.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for candle in candles {
            upsert_one(&mut tx, candle).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn latest_open_time(&self, symbol: &Symbol, timeframe: TimeFrame) -> Result<Option<DateTime<Utc>>, AppError> {
        let row = sqlx::query("SELECT MAX(open_time) as t FROM candles WHERE symbol = ? AND timeframe = ?")
            .bind(symbol.exchange_format())
            .bind(timeframe.as_str())
            .fetch_one(&self.pool)
            .await?;
        let t: Option<String> = row.try_get("t")?;
        t.map(|s| {
            DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)).map_err(|e| AppError::Validation(e.to_string()))
        })
        .transpose()
    }

    /// Most recent `limit` stored 5m candles, ascending by open time. The
    /// only timeframe ever persisted (§3).
    async fn load_base_candles(&self, symbol: &Symbol, limit: u32) -> Result<Vec<Candle>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM candles WHERE symbol = ? AND timeframe = ? ORDER BY open_time DESC LIMIT ?",
        )
        .bind(symbol.exchange_format())
        .bind(TimeFrame::M5.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candles: Vec<Candle> = rows.into_iter().map(candle_from_row).collect::<Result<_, _>>()?;
        candles.reverse();
        Ok(candles)
    }

    /// Most recent `limit` candles at `timeframe`, ascending by open time.
    /// `M5` reads the stored series directly; every other target is derived
    /// by aggregating the 5m series on read rather than from a persisted
    /// rollup row (§3: "Rollup to `{15m,1h,4h,1d}` is derived, never
    /// stored"; §4.2: `open=first, high=max, low=min, close=last,
    /// volume=Σ`).
    pub async fn load_candles(&self, symbol: &Symbol, timeframe: TimeFrame, limit: u32) -> Result<Vec<Candle>, AppError> {
        if timeframe == TimeFrame::M5 {
            return self.load_base_candles(symbol, limit).await;
        }

        let base = self.load_base_candles(symbol, Self::BASE_LOOKBACK).await?;
        let mut bucketed = bucket_candles(symbol, &base, timeframe);
        if bucketed.len() > limit as usize {
            bucketed.drain(..bucketed.len() - limit as usize);
        }
        Ok(bucketed)
    }

    /// Count of stored 5m base candles for `symbol`, the series the §4.2
    /// "insufficient history" fallback gates on regardless of the timeframe
    /// actually being requested.
    pub async fn base_candle_count(&self, symbol: &Symbol) -> Result<usize, AppError> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM candles WHERE symbol = ? AND timeframe = ?")
            .bind(symbol.exchange_format())
            .bind(TimeFrame::M5.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as usize)
    }

    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM candles WHERE open_time < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        debug!(rows = result.rows_affected(), "pruned old candles");
        Ok(result.rows_affected())
    }
}

async fn upsert_one(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, candle: &Candle) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO candles (
            symbol, timeframe, open_time, close_time, open, high, low, close, volume, quote_volume, trades, is_closed
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(symbol, timeframe, open_time) DO UPDATE SET
            close_time = excluded.close_time,
            high = excluded.high,
            low = excluded.low,
            close = excluded.close,
            volume = excluded.volume,
            quote_volume = excluded.quote_volume,
            trades = excluded.trades,
            is_closed = excluded.is_closed
        "#,
    )
    .bind(candle.symbol.exchange_format())
    .bind(candle.timeframe.as_str())
    .bind(candle.open_time.to_rfc3339())
    .bind(candle.close_time.to_rfc3339())
    .bind(candle.open.to_string())
    .bind(candle.high.to_string())
    .bind(candle.low.to_string())
    .bind(candle.close.to_string())
    .bind(candle.volume.to_string())
    .bind(candle.quote_volume.to_string())
    .bind(candle.trades as i64)
    .bind(candle.is_closed as i64)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Aggregates ascending 5m `base` candles into `target`-sized buckets,
/// aligned to the UNIX epoch so bucket boundaries are stable across runs.
fn bucket_candles(symbol: &Symbol, base: &[Candle], target: TimeFrame) -> Vec<Candle> {
    let bucket_ms = target.to_milliseconds();
    let mut buckets: Vec<Vec<&Candle>> = Vec::new();
    let mut current_key: Option<i64> = None;

    for candle in base {
        let key = candle.open_time.timestamp_millis().div_euclid(bucket_ms);
        if current_key != Some(key) {
            buckets.push(Vec::new());
            current_key = Some(key);
        }
        buckets.last_mut().unwrap().push(candle);
    }

    buckets
        .into_iter()
        .filter(|group| !group.is_empty())
        .map(|group| {
            let first = group.first().unwrap();
            let last = group.last().unwrap();
            let bucket_start = first.open_time.timestamp_millis().div_euclid(bucket_ms) * bucket_ms;

            Candle {
                symbol: symbol.clone(),
                timeframe: target,
                open_time: Utc.timestamp_millis_opt(bucket_start).single().unwrap_or(first.open_time),
                close_time: last.close_time,
                open: first.open,
                high: group.iter().map(|c| c.high).fold(first.high, Decimal::max),
                low: group.iter().map(|c| c.low).fold(first.low, Decimal::min),
                close: last.close,
                volume: group.iter().map(|c| c.volume).sum(),
                quote_volume: group.iter().map(|c| c.quote_volume).sum(),
                trades: group.iter().map(|c| c.trades).sum(),
                is_closed: group.iter().all(|c| c.is_closed),
            }
        })
        .collect()
}

fn candle_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Candle, AppError> {
    let symbol_str: String = row.try_get("symbol")?;
    let timeframe_str: String = row.try_get("timeframe")?;
    let open_time_str: String = row.try_get("open_time")?;
    let close_time_str: String = row.try_get("close_time")?;
    let parse_decimal = |s: String| Decimal::from_str(&s).map_err(|e| AppError::Validation(e.to_string()));

    Ok(Candle {
        symbol: Symbol::parse(&symbol_str).ok_or_else(|| AppError::Validation(format!("bad symbol: {symbol_str}")))?,
        timeframe: TimeFrame::from_str(&timeframe_str).ok_or_else(|| AppError::Validation("bad timeframe".into()))?,
        open_time: DateTime::parse_from_rfc3339(&open_time_str).map(|t| t.with_timezone(&Utc)).map_err(|e| AppError::Validation(e.to_string()))?,
        close_time: DateTime::parse_from_rfc3339(&close_time_str).map(|t| t.with_timezone(&Utc)).map_err(|e| AppError::Validation(e.to_string()))?,
        open: parse_decimal(row.try_get("open")?)?,
        high: parse_decimal(row.try_get("high")?)?,
        low: parse_decimal(row.try_get("low")?)?,
        close: parse_decimal(row.try_get("close")?)?,
        volume: parse_decimal(row.try_get("volume")?)?,
        quote_volume: parse_decimal(row.try_get("quote_volume")?)?,
        trades: row.try_get::<i64, _>("trades")? as u64,
        is_closed: row.try_get::<i64, _>("is_closed")? != 0,
    })
}

/// Returns stored candles (rolled up on read if `timeframe` isn't the 5m
/// base series) when the 5m base series itself has at least `min_candles`
/// rows, otherwise falls through to a direct exchange fetch (§4.2
/// "insufficient history" gates on the base series, not the requested
/// timeframe's row count).
pub async fn load_or_fetch(
    tsdb: &TsDb,
    exchange: &dyn crate::exchange::Exchange,
    symbol: &Symbol,
    timeframe: TimeFrame,
    limit: u32,
    min_candles: usize,
) -> Result<Vec<Candle>, AppError> {
    if tsdb.base_candle_count(symbol).await? >= min_candles {
        return tsdb.load_candles(symbol, timeframe, limit).await;
    }
    exchange.fetch_candles(symbol, timeframe, None, limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle_at(symbol: &Symbol, minute: i64, close: Decimal) -> Candle {
        let open_time = Utc.timestamp_millis_opt(minute * 60_000).single().unwrap();
        Candle {
            symbol: symbol.clone(),
            timeframe: TimeFrame::M5,
            open_time,
            close_time: open_time + chrono::Duration::minutes(5),
            open: close,
            high: close + Decimal::ONE,
            low: close - Decimal::ONE,
            close,
            volume: dec!(100),
            quote_volume: close * dec!(100),
            trades: 10,
            is_closed: true,
        }
    }

    #[test]
    fn bucket_candles_aggregates_ohlcv_over_15_minutes() {
        let symbol = Symbol::usdt("SOL");
        let base = vec![
            candle_at(&symbol, 0, dec!(10)),
            candle_at(&symbol, 5, dec!(12)),
            candle_at(&symbol, 10, dec!(11)),
            candle_at(&symbol, 15, dec!(13)),
        ];
        let bucketed = bucket_candles(&symbol, &base, TimeFrame::M15);
        assert_eq!(bucketed.len(), 2);
        assert_eq!(bucketed[0].open, dec!(10));
        assert_eq!(bucketed[0].close, dec!(11));
        assert_eq!(bucketed[0].high, dec!(13));
        assert_eq!(bucketed[0].volume, dec!(300));
    }

    #[tokio::test]
    async fn upsert_then_load_roundtrips() {
        let db = TsDb::new("sqlite::memory:").await.unwrap();
        let symbol = Symbol::usdt("SOL");
        let candles = vec![candle_at(&symbol, 0, dec!(10)), candle_at(&symbol, 5, dec!(11))];
        db.upsert_candles(&candles).await.unwrap();

        let loaded = db.load_candles(&symbol, TimeFrame::M5, 10).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].close, dec!(10));
        assert_eq!(loaded[1].close, dec!(11));
    }
}
