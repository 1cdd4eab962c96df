use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::trace;

/// Caps the number of external calls in flight at once. Waiters are admitted
/// in the order they asked; a call that never finishes keeps its slot.
#[derive(Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn schedule<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // acquire only fails on a closed semaphore, and this one is never closed.
        let _permit = self.permits.acquire().await.ok();
        trace!(available = self.available(), "external call admitted");
        call().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::future::join_all;
    use parking_lot::Mutex;

    use super::*;

    #[tokio::test]
    async fn bounds_concurrency_and_admits_in_order() {
        let limiter = RateLimiter::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let admitted = Arc::new(Mutex::new(Vec::new()));

        let calls = (0..5).map(|idx| {
            let limiter = limiter.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let admitted = Arc::clone(&admitted);
            async move {
                limiter
                    .schedule(|| async move {
                        admitted.lock().push(idx);
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(15)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        idx * 10
                    })
                    .await
            }
        });

        let results = join_all(calls).await;
        assert_eq!(results, vec![0, 10, 20, 30, 40]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(*admitted.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(limiter.available(), 2);
    }

    #[test]
    fn clamps_capacity_to_one() {
        let limiter = RateLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
        assert_eq!(limiter.available(), 1);
    }

    #[test]
    fn clamps_capacity_to_semaphore_limit() {
        let limiter = RateLimiter::new(usize::MAX);
        assert_eq!(limiter.capacity(), Semaphore::MAX_PERMITS);
        assert_eq!(limiter.available(), Semaphore::MAX_PERMITS);
    }
}
