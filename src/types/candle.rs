#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Symbol, TimeFrame};

/// A single OHLCV bar. Identity is `(open_time, symbol, timeframe)` per the
/// TSDB's composite key (§3); two candles with that identity and identical
/// OHLCV are considered the same row for upsert purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: Symbol,
    pub timeframe: TimeFrame,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub trades: u64,
    pub is_closed: bool,
}

impl Candle {
    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }

    pub fn change_percentage(&self) -> Decimal {
        if self.open.is_zero() {
            return Decimal::ZERO;
        }
        ((self.close - self.open) / self.open) * Decimal::from(100)
    }
}

/// Bounded rolling window of closed candles for one `(symbol, timeframe)`,
/// the unit of scratch state a screener worker owns for the duration of one
/// symbol's evaluation (§4.5 concurrency contract).
#[derive(Debug, Clone, Default)]
pub struct CandleBuffer {
    pub candles: Vec<Candle>,
    pub max_size: usize,
}

impl CandleBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            candles: Vec::with_capacity(max_size),
            max_size,
        }
    }

    pub fn from_candles(candles: Vec<Candle>, max_size: usize) -> Self {
        let mut buf = Self::new(max_size);
        for c in candles {
            buf.push(c);
        }
        buf
    }

    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() >= self.max_size {
            self.candles.remove(0);
        }
        self.candles.push(candle);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn last_n(&self, n: usize) -> &[Candle] {
        let len = self.candles.len();
        if n >= len {
            &self.candles[..]
        } else {
            &self.candles[len - n..]
        }
    }

    pub fn closes(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.volume).collect()
    }
}

/// A lightweight ticker snapshot (24h window), as returned by a batch ticker
/// fetch and cached by the market-data cache (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: Symbol,
    pub price: Decimal,
    pub quote_volume_24h: Decimal,
    pub price_change_pct_24h: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// BTC/ETH last-price overview used as the screener's market-data precondition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketOverview {
    pub btc_price: Decimal,
    pub eth_price: Decimal,
    pub btc_change_pct_24h: Decimal,
    pub eth_change_pct_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl MarketOverview {
    pub fn has_market_data(&self) -> bool {
        !self.btc_price.is_zero() && !self.eth_price.is_zero()
    }
}
