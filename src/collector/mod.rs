use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::exchange::Exchange;
use crate::tsdb::TsDb;
use crate::types::{Symbol, TimeFrame};

/// Periodic k-line collector (§4.4). Walks the active USDT universe plus
/// BTC/USDT and ETH/USDT, fetching each symbol's 5m series since its last
/// stored candle (or the last 24h on a cold start) and upserting into the
/// TSDB. Cooperative: checked at batch boundaries rather than pre-empted.
pub struct Collector {
    exchange: Arc<dyn Exchange>,
    tsdb: Arc<TsDb>,
    batch_size: usize,
    candles_per_fetch: u32,
    stop: Arc<AtomicBool>,
}

impl Collector {
    pub fn new(exchange: Arc<dyn Exchange>, tsdb: Arc<TsDb>, batch_size: usize, candles_per_fetch: u32) -> Self {
        Self {
            exchange,
            tsdb,
            batch_size,
            candles_per_fetch,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs collection cycles until `stop` is set. Each cycle: fetch the
    /// active symbol list, prepend BTC/ETH, fetch each symbol's candles in
    /// batches of `batch_size` with 0.5s between symbols and 5s between
    /// batches, sleep 60s on a rate-limit, and sleep 60s between cycles.
    pub async fn run(&self) {
        while !self.stop.load(Ordering::Relaxed) {
            if let Err(err) = self.run_cycle().await {
                warn!(error = %err, "collector cycle failed");
            }
            sleep(Duration::from_secs(60)).await;
        }
    }

    async fn run_cycle(&self) -> Result<(), crate::error::AppError> {
        let mut symbols = self.exchange.fetch_symbols().await?;
        symbols.retain(|s| s.is_altcoin());
        let mut universe = vec![Symbol::btc_usdt(), Symbol::eth_usdt()];
        universe.extend(symbols);

        for batch in universe.chunks(self.batch_size) {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }

            for symbol in batch {
                if let Err(err) = self.collect_symbol(symbol).await {
                    if let crate::error::AppError::TransientFetch { retry_after_secs, .. } = err {
                        warn!(symbol = %symbol, retry_after_secs, "rate limited, backing off");
                        sleep(Duration::from_secs(retry_after_secs)).await;
                        continue;
                    }
                    warn!(symbol = %symbol, error = %err, "collection failed for symbol");
                }
                sleep(Duration::from_millis(500)).await;
            }

            sleep(Duration::from_secs(5)).await;
        }

        Ok(())
    }

    async fn collect_symbol(&self, symbol: &Symbol) -> Result<(), crate::error::AppError> {
        let since = self.tsdb.latest_open_time(symbol, TimeFrame::M5).await?;
        let candles = self.exchange.fetch_candles(symbol, TimeFrame::M5, since, self.candles_per_fetch).await?;

        let fresh: Vec<_> = match since {
            Some(latest) => candles.into_iter().filter(|c| c.open_time > latest).collect(),
            None => candles,
        };

        if fresh.is_empty() {
            return Ok(());
        }

        self.tsdb.upsert_candles(&fresh).await?;
        info!(symbol = %symbol, count = fresh.len(), "collected candles");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::exchange::MockExchange;

    /// Three consecutive rate-limit errors on `fetch_symbols` should not
    /// panic the cycle: `run_cycle` surfaces the error to `run`, which backs
    /// off and retries on the next tick (§8 S4).
    #[tokio::test]
    async fn rate_limit_on_symbol_fetch_is_surfaced_not_swallowed() {
        let mut mock = MockExchange::new();
        mock.expect_fetch_symbols().times(1).returning(|| {
            Err(AppError::TransientFetch {
                message: "rate limited".to_string(),
                retry_after_secs: 60,
            })
        });

        let tsdb = Arc::new(TsDb::new("sqlite::memory:").await.unwrap());
        let collector = Collector::new(Arc::new(mock), tsdb, 20, 500);

        let result = collector.run_cycle().await;
        assert!(matches!(result, Err(AppError::TransientFetch { .. })));
    }
}
