use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use crate::database::Database;
use crate::error::AppError;
use crate::exchange::Exchange;
use crate::indicators::composite;
use crate::tsdb::{self, TsDb};
use crate::types::{Candle, ScreeningSnapshot, Symbol, TimeFrame};

const CANDLE_FETCH_LIMIT: u32 = 500;
const MIN_HISTORY_FOR_TSDB: usize = 50;
const MAX_CANDLE_AGE_SECS: i64 = 3600;

pub struct Screener {
    exchange: Arc<dyn Exchange>,
    tsdb: Arc<TsDb>,
    db: Arc<Database>,
    worker_pool_size: usize,
    pass_timeout_secs: u64,
    min_volume_usd: Decimal,
}

impl Screener {
    pub fn new(exchange: Arc<dyn Exchange>, tsdb: Arc<TsDb>, db: Arc<Database>, worker_pool_size: usize, pass_timeout_secs: u64, min_volume_usd: Decimal) -> Self {
        Self {
            exchange,
            tsdb,
            db,
            worker_pool_size,
            pass_timeout_secs,
            min_volume_usd,
        }
    }

    /// Runs one screening pass (§4.5): market-data precondition, altcoin
    /// universe, 24h-volume prefilter, bounded-concurrency per-symbol
    /// evaluation under an overall pass timeout, survivor persistence.
    pub async fn run_pass(&self, timeframe: TimeFrame) -> Result<Vec<ScreeningSnapshot>, AppError> {
        let overview = self.exchange.fetch_market_overview().await?;
        if !overview.has_market_data() {
            return Err(AppError::NoMarketData);
        }

        let mut symbols = self.exchange.fetch_symbols().await?;
        symbols.retain(|s| s.is_altcoin());

        let tickers = self.exchange.fetch_tickers(&symbols).await?;
        let candidates: Vec<_> = tickers.into_iter().filter(|t| t.quote_volume_24h >= self.min_volume_usd).collect();

        let btc_candles = tsdb::load_or_fetch(&self.tsdb, self.exchange.as_ref(), &Symbol::btc_usdt(), timeframe, CANDLE_FETCH_LIMIT, MIN_HISTORY_FOR_TSDB).await?;
        let eth_candles = tsdb::load_or_fetch(&self.tsdb, self.exchange.as_ref(), &Symbol::eth_usdt(), timeframe, CANDLE_FETCH_LIMIT, MIN_HISTORY_FOR_TSDB).await?;
        let lookback = (1440 / timeframe.to_minutes().max(1)) as usize;

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size));
        let mut tasks = JoinSet::new();

        for ticker in candidates {
            let exchange = Arc::clone(&self.exchange);
            let tsdb = Arc::clone(&self.tsdb);
            let semaphore = Arc::clone(&semaphore);
            let btc_candles = btc_candles.clone();
            let eth_candles = eth_candles.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                evaluate_symbol(exchange.as_ref(), tsdb.as_ref(), ticker.symbol, ticker.quote_volume_24h, timeframe, &btc_candles, &eth_candles, lookback)
                    .await
                    .ok()
                    .flatten()
            });
        }

        let pass = async {
            let mut survivors = Vec::new();
            while let Some(result) = tasks.join_next().await {
                if let Ok(Some(snapshot)) = result {
                    survivors.push(snapshot);
                }
            }
            survivors
        };

        let mut survivors = match timeout(Duration::from_secs(self.pass_timeout_secs), pass).await {
            Ok(survivors) => survivors,
            Err(_) => {
                warn!(timeframe = %timeframe, "screening pass timed out, returning partial results");
                Vec::new()
            }
        };

        survivors.sort_by(|a, b| b.total_score.cmp(&a.total_score));
        self.db.persist_snapshot_batch(timeframe, &survivors).await?;
        info!(timeframe = %timeframe, survivors = survivors.len(), "screening pass complete");
        Ok(survivors)
    }
}

async fn evaluate_symbol(
    exchange: &dyn Exchange,
    tsdb: &TsDb,
    symbol: Symbol,
    volume_24h: Decimal,
    timeframe: TimeFrame,
    btc_candles: &[Candle],
    eth_candles: &[Candle],
    lookback: usize,
) -> Result<Option<ScreeningSnapshot>, AppError> {
    let candles = tsdb::load_or_fetch(tsdb, exchange, &symbol, timeframe, CANDLE_FETCH_LIMIT, MIN_HISTORY_FOR_TSDB).await?;
    let Some(latest) = candles.last() else {
        return Ok(None);
    };
    let age_secs = Utc::now().signed_duration_since(latest.close_time).num_seconds();
    if age_secs > MAX_CANDLE_AGE_SECS {
        return Err(AppError::StaleData { symbol: symbol.to_string(), age_secs });
    }

    let snapshot_indicators = composite::compute(&candles);
    let current_price = latest.close;

    let btc_ratio_series = ratio_series(&candles, btc_candles);
    let eth_ratio_series = ratio_series(&candles, eth_candles);
    let delta_btc = composite::ratio_change_pct(&btc_ratio_series, lookback).unwrap_or(Decimal::ZERO);
    let delta_eth = composite::ratio_change_pct(&eth_ratio_series, lookback).unwrap_or(Decimal::ZERO);

    let beta = composite::beta_score(delta_btc, delta_eth);
    let volume = composite::volume_score(volume_24h, snapshot_indicators.volume_surge);
    let technical = Decimal::from(snapshot_indicators.technical_score);
    let total = composite::total_score(beta, volume, technical);

    let snapshot = ScreeningSnapshot {
        symbol,
        timeframe,
        timestamp: Utc::now(),
        beta_score: beta,
        volume_score: volume,
        technical_score: technical,
        total_score: total,
        above_sma: snapshot_indicators.sma20.map(|sma| current_price > sma).unwrap_or(false),
        macd_golden_cross: snapshot_indicators.recent_golden_cross,
        above_all_ema: above_all_ema(&snapshot_indicators, current_price),
        volume_surge: snapshot_indicators.volume_surge,
        price_anomaly: snapshot_indicators.price_anomaly,
        price_btc_ratio: btc_ratio_series.last().copied().unwrap_or(Decimal::ZERO),
        price_eth_ratio: eth_ratio_series.last().copied().unwrap_or(Decimal::ZERO),
        btc_ratio_change_24h_pct: delta_btc,
        eth_ratio_change_24h_pct: delta_eth,
        price_change_5m_pct: percent_change_over(&candles, 1),
        price_change_15m_pct: percent_change_over(&candles, 3),
        price_change_1h_pct: percent_change_over(&candles, 12),
        current_price,
        volume_24h,
    };

    Ok(snapshot.survives_prefilter().then_some(snapshot))
}

fn above_all_ema(snapshot: &composite::IndicatorSnapshot, price: Decimal) -> bool {
    [snapshot.ema7, snapshot.ema14, snapshot.ema30, snapshot.ema52]
        .into_iter()
        .all(|ema| ema.map(|v| price > v).unwrap_or(false))
}

/// Elementwise `symbol_close / reference_close` over the overlapping tail
/// of both series.
fn ratio_series(symbol_candles: &[Candle], reference_candles: &[Candle]) -> Vec<Decimal> {
    let len = symbol_candles.len().min(reference_candles.len());
    let sym_tail = &symbol_candles[symbol_candles.len() - len..];
    let ref_tail = &reference_candles[reference_candles.len() - len..];
    sym_tail
        .iter()
        .zip(ref_tail.iter())
        .map(|(s, r)| if r.close.is_zero() { Decimal::ZERO } else { s.close / r.close })
        .collect()
}

fn percent_change_over(candles: &[Candle], steps_back: usize) -> Option<Decimal> {
    if candles.len() <= steps_back {
        return None;
    }
    let latest = candles.last()?.close;
    let past = candles[candles.len() - 1 - steps_back].close;
    if past.is_zero() {
        return None;
    }
    Some((latest - past) / past * Decimal::from(100))
}
