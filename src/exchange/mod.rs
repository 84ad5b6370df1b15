#![allow(dead_code)]
pub mod binance;
pub mod cache;

pub use binance::BinanceClient;

use crate::error::AppError;
use crate::types::{Candle, MarketOverview, Symbol, Ticker, TimeFrame};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// The public channel (no credentials, avoids IP-binding restrictions) plus
/// a thin authenticated balance read (§4.1). Order placement is out of
/// scope: the paper engine never touches a real order book.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Active USDT spot symbols (post leveraged/inactive filtering at the
    /// exchange-listing level; altcoin-universe filtering is layered on top
    /// by the caller via `Symbol::is_altcoin`).
    async fn fetch_symbols(&self) -> Result<Vec<Symbol>, AppError>;

    /// `since` fetches forward from that open time rather than the most
    /// recent `limit` candles (§4.4 step 3); `None` asks for the latest
    /// `limit` candles, as on a cold start.
    async fn fetch_candles(&self, symbol: &Symbol, timeframe: TimeFrame, since: Option<DateTime<Utc>>, limit: u32) -> Result<Vec<Candle>, AppError>;

    /// Single-symbol 24h ticker.
    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, AppError>;

    /// Batch 24h ticker snapshot, used by the screener's volume prefilter
    /// to avoid one call per symbol (§4.5 step 3).
    async fn fetch_tickers(&self, symbols: &[Symbol]) -> Result<Vec<Ticker>, AppError>;

    /// BTC/ETH last price and 24h change, the screener's market-data
    /// precondition (§4.5 step 1).
    async fn fetch_market_overview(&self) -> Result<MarketOverview, AppError>;

    /// Authenticated balance read. Returns `Decimal::ZERO` when the client
    /// holds no credentials (public-only mode).
    async fn fetch_balance(&self, asset: &str) -> Result<Decimal, AppError>;
}
