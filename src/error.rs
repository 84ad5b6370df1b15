use thiserror::Error;

/// Error kinds used by the core (§7). Each maps to one caller strategy;
/// the variant itself carries what the caller needs to decide that strategy.
#[derive(Debug, Error)]
pub enum AppError {
    /// Rate-limit or 5xx from the exchange. Caller sleeps `retry_after_secs`
    /// (≥ 60 on a rate-limit), keeps cached values, skips the symbol.
    #[error("transient fetch failure: {message} (retry after {retry_after_secs}s)")]
    TransientFetch {
        message: String,
        retry_after_secs: u64,
    },

    /// Latest candle older than 1 hour. Skip symbol silently in screening.
    #[error("stale data for {symbol}: latest candle is {age_secs}s old")]
    StaleData { symbol: String, age_secs: i64 },

    /// BTC or ETH price unavailable. Abort the pass with an empty result.
    #[error("no market data available (BTC/ETH overview)")]
    NoMarketData,

    /// Invalid parameters.
    #[error("validation error: {0}")]
    Validation(String),

    /// Account at `max_positions` or insufficient balance.
    #[error("capacity error: {0}")]
    Capacity(String),

    /// Unique-key conflict on candle/snapshot insert.
    #[error("db conflict: {0}")]
    DbConflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
