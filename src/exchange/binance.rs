use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::warn;

use super::cache::TtlCache;
use super::Exchange;
use crate::error::AppError;
use crate::types::{Candle, MarketOverview, Symbol, Ticker, TimeFrame};

const PUBLIC_API: &str = "https://api.binance.us";

type HmacSha256 = Hmac<Sha256>;
type ClockLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Public-channel client plus an optional authenticated balance read,
/// backed by the three independent-TTL caches of §4.1.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    limiter: Arc<ClockLimiter>,
    symbol_cache: TtlCache<Vec<Symbol>>,
    ticker_cache: TtlCache<Vec<Ticker>>,
    overview_cache: TtlCache<MarketOverview>,
}

impl BinanceClient {
    pub fn new(base_url: String, api_key: Option<String>, api_secret: Option<String>, min_call_spacing_ms: u64) -> Self {
        let quota = Quota::with_period(Duration::from_millis(min_call_spacing_ms.max(1)))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(10).unwrap()));
        Self {
            client: Client::new(),
            base_url,
            api_key,
            api_secret,
            limiter: Arc::new(RateLimiter::direct(quota)),
            symbol_cache: TtlCache::new(Duration::from_secs(300)),
            ticker_cache: TtlCache::new(Duration::from_secs(60)),
            overview_cache: TtlCache::new(Duration::from_secs(30)),
        }
    }

    pub fn public_only(base_url: String, min_call_spacing_ms: u64) -> Self {
        Self::new(base_url, None, None, min_call_spacing_ms)
    }

    async fn throttle(&self) {
        self.limiter.until_ready().await;
    }

    fn sign(&self, query: &str) -> Option<String> {
        let secret = self.api_secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(query.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Classifies a non-2xx response per §4.1/§7: rate-limit or 5xx is
    /// `TRANSIENT` (caller sleeps ≥ 60s); everything else is `PERMANENT`.
    fn classify_status(status: StatusCode, message: String) -> AppError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            AppError::TransientFetch {
                message,
                retry_after_secs: 60,
            }
        } else {
            AppError::Validation(message)
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, AppError> {
        self.throttle().await;
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn fetch_symbols(&self) -> Result<Vec<Symbol>, AppError> {
        let base_url = self.base_url.clone();
        let this = self.clone();
        self.symbol_cache
            .get_or_refresh(|| async move {
                let url = format!("{}/api/v3/exchangeInfo", base_url);
                let resp: ExchangeInfoResponse = this.get_json(&url).await?;
                let symbols = resp
                    .symbols
                    .into_iter()
                    .filter(|s| s.status == "TRADING" && s.is_spot_trading_allowed && s.quote_asset == "USDT")
                    .filter_map(|s| Symbol::parse(&format!("{}USDT", s.base_asset)))
                    .filter(|s| !s.is_leveraged_product())
                    .collect();
                Ok(symbols)
            })
            .await
    }

    async fn fetch_candles(&self, symbol: &Symbol, timeframe: TimeFrame, since: Option<chrono::DateTime<Utc>>, limit: u32) -> Result<Vec<Candle>, AppError> {
        self.throttle().await;
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol.exchange_format(),
            timeframe.as_str(),
            limit
        );
        if let Some(since) = since {
            url.push_str(&format!("&startTime={}", since.timestamp_millis()));
        }
        let resp: Vec<Vec<serde_json::Value>> = {
            let r = self.client.get(&url).send().await?;
            let status = r.status();
            if !status.is_success() {
                let body = r.text().await.unwrap_or_default();
                return Err(Self::classify_status(status, body));
            }
            r.json().await?
        };

        resp.into_iter().map(|k| parse_kline(symbol, timeframe, &k)).collect()
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, AppError> {
        self.throttle().await;
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, symbol.exchange_format());
        let resp: TickerResponse = self.get_json(&url).await?;
        parse_ticker(symbol, &resp)
    }

    async fn fetch_tickers(&self, symbols: &[Symbol]) -> Result<Vec<Ticker>, AppError> {
        let base_url = self.base_url.clone();
        let this = self.clone();
        let all = self
            .ticker_cache
            .get_or_refresh(|| async move {
                let url = format!("{}/api/v3/ticker/24hr", base_url);
                let resp: Vec<TickerResponse> = this.get_json(&url).await?;
                resp.iter()
                    .filter_map(|t| Symbol::parse(&t.symbol).map(|sym| (sym, t)))
                    .map(|(sym, t)| parse_ticker(&sym, t))
                    .collect::<Result<Vec<_>, _>>()
            })
            .await?;

        Ok(all.into_iter().filter(|t| symbols.contains(&t.symbol)).collect())
    }

    async fn fetch_market_overview(&self) -> Result<MarketOverview, AppError> {
        let btc = Symbol::btc_usdt();
        let eth = Symbol::eth_usdt();
        let this = self.clone();
        self.overview_cache
            .get_or_refresh(|| async move {
                let btc_ticker = this.fetch_ticker(&btc).await;
                let eth_ticker = this.fetch_ticker(&eth).await;
                match (btc_ticker, eth_ticker) {
                    (Ok(b), Ok(e)) => Ok(MarketOverview {
                        btc_price: b.price,
                        eth_price: e.price,
                        btc_change_pct_24h: b.price_change_pct_24h,
                        eth_change_pct_24h: e.price_change_pct_24h,
                        timestamp: Utc::now(),
                    }),
                    (Err(err), _) | (_, Err(err)) => {
                        warn!(error = %err, "failed to refresh market overview");
                        Err(err)
                    }
                }
            })
            .await
    }

    async fn fetch_balance(&self, asset: &str) -> Result<Decimal, AppError> {
        let (Some(api_key), Some(_)) = (self.api_key.as_ref(), self.api_secret.as_ref()) else {
            return Ok(Decimal::ZERO);
        };

        self.throttle().await;
        let timestamp = Utc::now().timestamp_millis();
        let query = format!("timestamp={}&recvWindow=5000", timestamp);
        let signature = self.sign(&query).ok_or_else(|| AppError::Validation("missing api secret".into()))?;
        let url = format!("{}/api/v3/account?{}&signature={}", self.base_url, query, signature);

        let resp = self.client.get(&url).header("X-MBX-APIKEY", api_key).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        let account: AccountResponse = resp.json().await?;
        for balance in account.balances {
            if balance.asset == asset {
                return Ok(Decimal::from_str(&balance.free).unwrap_or(Decimal::ZERO));
            }
        }
        Ok(Decimal::ZERO)
    }
}

fn parse_kline(symbol: &Symbol, timeframe: TimeFrame, k: &[serde_json::Value]) -> Result<Candle, AppError> {
    let as_str = |v: Option<&serde_json::Value>| v.and_then(|v| v.as_str()).unwrap_or("0");
    let open_time = k.first().and_then(|v| v.as_i64()).unwrap_or(0);
    let close_time = k.get(6).and_then(|v| v.as_i64()).unwrap_or(0);
    let parse = |s: &str| Decimal::from_str(s).map_err(|e| AppError::Validation(e.to_string()));

    Ok(Candle {
        symbol: symbol.clone(),
        timeframe,
        open_time: Utc.timestamp_millis_opt(open_time).single().unwrap_or_else(Utc::now),
        close_time: Utc.timestamp_millis_opt(close_time).single().unwrap_or_else(Utc::now),
        open: parse(as_str(k.get(1)))?,
        high: parse(as_str(k.get(2)))?,
        low: parse(as_str(k.get(3)))?,
        close: parse(as_str(k.get(4)))?,
        volume: parse(as_str(k.get(5)))?,
        quote_volume: parse(as_str(k.get(7)))?,
        trades: k.get(8).and_then(|v| v.as_u64()).unwrap_or(0),
        is_closed: true,
    })
}

fn parse_ticker(symbol: &Symbol, resp: &TickerResponse) -> Result<Ticker, AppError> {
    let parse = |s: &str| Decimal::from_str(s).map_err(|e| AppError::Validation(e.to_string()));
    Ok(Ticker {
        symbol: symbol.clone(),
        price: parse(&resp.last_price)?,
        quote_volume_24h: parse(&resp.quote_volume)?,
        price_change_pct_24h: parse(&resp.price_change_percent)?,
        high_24h: parse(&resp.high_price)?,
        low_24h: parse(&resp.low_price)?,
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<ExchangeInfoSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoSymbol {
    status: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    #[serde(rename = "isSpotTradingAllowed", default)]
    is_spot_trading_allowed: bool,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "quoteVolume")]
    quote_volume: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
    #[serde(rename = "highPrice")]
    high_price: String,
    #[serde(rename = "lowPrice")]
    low_price: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceResponse>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    asset: String,
    free: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_and_server_errors_as_transient() {
        let err = BinanceClient::classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert!(matches!(err, AppError::TransientFetch { .. }));

        let err = BinanceClient::classify_status(StatusCode::INTERNAL_SERVER_ERROR, "oops".into());
        assert!(matches!(err, AppError::TransientFetch { .. }));
    }

    #[test]
    fn classifies_client_errors_as_permanent() {
        let err = BinanceClient::classify_status(StatusCode::BAD_REQUEST, "bad symbol".into());
        assert!(matches!(err, AppError::Validation(_)));
    }
}
