use std::future::Future;

use serde_json::Value;
use tracing::{debug, trace};

use crate::cache::{QueryCache, QueryKey, QueryKind};
use crate::errors::AppResult;
use crate::limiter::RateLimiter;

/// Where a cache-backed lookup got its payload from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySource {
    Cache,
    Remote,
}

/// Wraps one kind of external query with cache-check, rate-limited fetch on
/// miss, and cache populate.
///
/// Concurrent misses for the same identifier are not coalesced: each one
/// reaches the remote API and writes an equivalent payload back.
#[derive(Clone)]
pub struct CachedQuery {
    kind: QueryKind,
    cache: QueryCache,
    limiter: RateLimiter,
}

impl CachedQuery {
    pub fn new(kind: QueryKind, cache: QueryCache, limiter: RateLimiter) -> Self {
        Self {
            kind,
            cache,
            limiter,
        }
    }

    pub async fn run<F, Fut>(&self, identifier: &str, fetch: F) -> AppResult<(Value, QuerySource)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Value>>,
    {
        let key = QueryKey::new(self.kind, identifier);
        if let Some(cached) = self.cache.get(&key)? {
            trace!(target: "query_cache", key = %key, "cache hit");
            return Ok((cached, QuerySource::Cache));
        }

        debug!(target: "query_cache", key = %key, "cache miss; querying remote");
        let response = self.limiter.schedule(fetch).await?;
        self.cache.put(&key, &response)?;
        Ok((response, QuerySource::Remote))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::errors::AppError;

    fn query() -> (CachedQuery, QueryCache) {
        let cache = QueryCache::in_memory().unwrap();
        let query = CachedQuery::new(QueryKind::TextSearch, cache.clone(), RateLimiter::new(4));
        (query, cache)
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let (query, cache) = query();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in [QuerySource::Remote, QuerySource::Cache] {
            let calls = Arc::clone(&calls);
            let (value, source) = query
                .run("Cafe", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"status": "OK", "results": []}))
                })
                .await
                .unwrap();
            assert_eq!(source, expected);
            assert_eq!(value["status"], "OK");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache
            .get(&QueryKey::new(QueryKind::TextSearch, "Cafe"))
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let (query, cache) = query();
        let err = query
            .run("Broken", || async {
                Err(AppError::ExternalCall {
                    service: "places",
                    status: 503,
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalCall { status: 503, .. }));
        assert!(cache.is_empty().unwrap());
    }
}
