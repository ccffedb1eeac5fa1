use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

/// Time-boxed keyed cache over the mirror API. TTL is constructor-injected;
/// there is no process-global cache state. A per-key async lock keeps a
/// single fetch in flight per key, so concurrent callers for the same key
/// trigger exactly one upstream request.
pub struct ReadModelCache<V> {
    default_ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    fetch_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<V: Clone> ReadModelCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: Mutex::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value if fresh, otherwise fetch, store and return.
    pub async fn get<F, Fut>(&self, key: &str, fetcher: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        self.get_with_ttl(key, self.default_ttl, fetcher).await
    }

    pub async fn get_with_ttl<F, Fut>(&self, key: &str, ttl: Duration, fetcher: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.fresh(key).await {
            return Ok(value);
        }

        let lock = self.lock_for(key).await;
        let result = {
            let _guard = lock.lock().await;

            // A concurrent caller may have completed the fetch while we waited.
            match self.fresh(key).await {
                Some(value) => Ok(value),
                None => match fetcher().await {
                    Ok(value) => {
                        self.store_with_ttl(key, value.clone(), ttl).await;
                        Ok(value)
                    }
                    Err(err) => Err(err),
                },
            }
        };
        self.release_lock(key, lock).await;
        result
    }

    /// Last-known-good value regardless of freshness. Explicit stale-read
    /// callers only; everything else goes through `get`.
    pub async fn stale(&self, key: &str) -> Option<V> {
        self.entries.lock().await.get(key).map(|e| e.value.clone())
    }

    /// Overwrite an entry directly, bypassing the fetch path. Used by the
    /// polling wrapper which always hits upstream.
    pub async fn store(&self, key: &str, value: V) {
        self.store_with_ttl(key, value, self.default_ttl).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
        tracing::debug!(key, "cache entry invalidated");
    }

    async fn fresh(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.is_fresh())
            .map(|e| e.value.clone())
    }

    async fn store_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        self.entries.lock().await.insert(
            key.to_string(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
                ttl,
            },
        );
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.fetch_locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drop the per-key lock once the last holder is done, so the lock map
    /// does not grow without bound across an open-ended key space.
    async fn release_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.fetch_locks.lock().await;
        // Holding the map lock means no new clone can be handed out; once
        // ours is dropped, a strong count of 1 is only the map's copy.
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_get_within_ttl_skips_fetcher() {
        let cache = ReadModelCache::new(Duration::from_secs(60));
        let fetches = AtomicU32::new(0);

        for _ in 0..2 {
            let value = cache
                .get("token/0.0.555", || {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    async { Ok(42u64) }
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = ReadModelCache::new(Duration::from_secs(60));
        let fetches = AtomicU32::new(0);

        let fetch = || {
            fetches.fetch_add(1, Ordering::SeqCst);
            async { Ok(1u64) }
        };
        cache.get("k", fetch).await.unwrap();
        cache.invalidate("k").await;
        cache.get("k", fetch).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_refetched_but_stale_readable() {
        let cache = ReadModelCache::new(Duration::from_millis(100));
        cache.store("k", 7u64).await;

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(cache.stale("k").await, Some(7));

        let value = cache.get("k", || async { Ok(8u64) }).await.unwrap();
        assert_eq!(value, 8);
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_fetch() {
        let cache = Arc::new(ReadModelCache::new(Duration::from_secs(60)));
        let fetches = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let fetches = Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                cache
                    .get("k", move || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(9u64)
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 9);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(cache.fetch_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn lock_map_does_not_retain_settled_keys() {
        let cache = Arc::new(ReadModelCache::new(Duration::from_secs(60)));

        let mut handles = Vec::new();
        for page in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache
                    .get(&format!("topic/0.0.777/messages?page={page}"), || async {
                        Ok(1u64)
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(cache.fetch_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_caches_nothing() {
        let cache: ReadModelCache<u64> = ReadModelCache::new(Duration::from_secs(60));
        let result = cache
            .get("k", || async { Err(anyhow::anyhow!("mirror 429")) })
            .await;
        assert!(result.is_err());
        assert_eq!(cache.stale("k").await, None);
    }
}
