use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Generic TTL cache for one exchange response shape. On a failing refresh,
/// the last good value is returned if present (§4.1: "last cached value is
/// returned if present; fresh failure without cache returns empty/zero").
#[derive(Clone)]
pub struct TtlCache<T: Clone + Send + 'static> {
    ttl: Duration,
    inner: Arc<Mutex<Option<(Instant, T)>>>,
}

impl<T: Clone + Send + 'static> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the cached value if still fresh; otherwise runs `refresh`.
    /// On a refresh error, falls back to the stale cached value if one
    /// exists, propagating the error only when the cache is empty.
    pub async fn get_or_refresh<F, Fut, E>(&self, refresh: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        {
            let guard = self.inner.lock().await;
            if let Some((fetched_at, value)) = guard.as_ref() {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(value.clone());
                }
            }
        }

        match refresh().await {
            Ok(fresh) => {
                let mut guard = self.inner.lock().await;
                *guard = Some((Instant::now(), fresh.clone()));
                Ok(fresh)
            }
            Err(err) => {
                let guard = self.inner.lock().await;
                match guard.as_ref() {
                    Some((_, stale)) => Ok(stale.clone()),
                    None => Err(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_stale_value_on_refresh_error() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(0));
        let first = cache.get_or_refresh(|| async { Ok::<u32, &str>(7) }).await.unwrap();
        assert_eq!(first, 7);

        let second = cache.get_or_refresh(|| async { Err::<u32, &str>("boom") }).await.unwrap();
        assert_eq!(second, 7);
    }

    #[tokio::test]
    async fn propagates_error_when_cache_is_empty() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        let result = cache.get_or_refresh(|| async { Err::<u32, &str>("boom") }).await;
        assert!(result.is_err());
    }
}
