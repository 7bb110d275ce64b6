use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use futures::FutureExt;
use tracing::debug;

use crate::entry::Entry;
use crate::errors::CacheError;
use crate::metrics::CacheStats;
use crate::policy::CachePolicy;
use crate::projection::ProjectedCache;
use crate::r#trait::{EntryLoader, Invalidation};

use super::local_lru::LocalLru;
use super::singleflight::{Flight, Joined};

type LoadResult<V> = Result<Entry<V>, CacheError>;

/// Loading cache of tri-state entries.
///
/// Misses are resolved through the [`EntryLoader`]; concurrent misses for one
/// key share a single load. Transient loader failures reach every waiter and
/// are not stored.
pub struct EntryCache<K: Hash + Eq, V> {
    name: &'static str,
    local: LocalLru<K, V>,
    flight: Flight<K, LoadResult<V>>,
    loader: Arc<dyn EntryLoader<K, V>>,
    policy: CachePolicy,
    stats: CacheStats,
}

impl<K, V> Clone for EntryCache<K, V>
where
    K: Hash + Eq,
{
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            local: self.local.clone(),
            flight: self.flight.clone(),
            loader: self.loader.clone(),
            policy: self.policy.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<K, V> EntryCache<K, V>
where
    K: Hash + Eq + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        policy: CachePolicy,
        loader: Arc<dyn EntryLoader<K, V>>,
    ) -> Self {
        Self {
            name,
            local: LocalLru::new(policy.max_entries),
            flight: Flight::default(),
            loader,
            policy,
            stats: CacheStats::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    pub async fn get(&self, key: &K) -> Result<Entry<V>, CacheError> {
        let local = self.local.clone();
        let (joined, started) = self.flight.join_or_start(
            key,
            || local.get_fresh(key).map(Ok),
            |ticket| self.start_load(key.clone(), ticket),
        );
        match joined {
            Joined::Ready(entry) => {
                self.stats.record_hit();
                entry
            }
            Joined::Pending(load) => {
                self.stats.record_miss();
                if started {
                    debug!(cache = self.name, key = %key, "cache miss, loading");
                }
                load.await
            }
        }
    }

    /// Cached entry only; never triggers a load.
    pub fn get_if_present(&self, key: &K) -> Option<Entry<V>> {
        self.local.get_fresh(key)
    }

    /// Stores an entry directly, discarding any load in flight for `key`.
    pub fn put(&self, key: K, entry: Entry<V>) {
        let local = self.local.clone();
        let ttl = self.policy.ttl;
        let stats = self.stats.clone();
        self.flight.detach(&key.clone(), move || {
            if local.put(key, entry, ttl) {
                stats.record_eviction();
            }
        });
    }

    pub fn project<W>(
        &self,
        project: impl Fn(&V) -> W + Send + Sync + 'static,
    ) -> ProjectedCache<K, V, W> {
        ProjectedCache::new(self.clone(), project)
    }

    fn start_load(&self, key: K, ticket: u64) -> futures::future::BoxFuture<'static, LoadResult<V>> {
        let name = self.name;
        let loader = self.loader.clone();
        let local = self.local.clone();
        let flight = self.flight.clone();
        let stats = self.stats.clone();
        let ttl = self.policy.ttl;

        let task_key = key.clone();
        let task_flight = flight.clone();
        let task = tokio::spawn(async move {
            let result = loader.load(&task_key).await;
            match &result {
                Ok(entry) => {
                    stats.record_load();
                    let stored = task_flight.complete(&task_key, ticket, || {
                        if local.put(task_key.clone(), entry.clone(), ttl) {
                            stats.record_eviction();
                        }
                    });
                    if !stored {
                        debug!(cache = name, key = %task_key, "discarding load invalidated in flight");
                    }
                }
                Err(err) => {
                    stats.record_error();
                    task_flight.complete(&task_key, ticket, || {});
                    debug!(cache = name, key = %task_key, error = %err, "cache load failed");
                }
            }
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => {
                    flight.complete(&key, ticket, || {});
                    Err(CacheError::load_failed(&format!(
                        "loader for {key} aborted: {join_err}"
                    )))
                }
            }
        }
        .boxed()
    }
}

impl<K, V> Invalidation<K> for EntryCache<K, V>
where
    K: Hash + Eq + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn invalidate(&self, key: &K) -> bool {
        let local = self.local.clone();
        let mut removed = false;
        let detached = self.flight.detach(key, || removed = local.remove(key));
        self.stats.record_invalidation();
        debug!(cache = self.name, key = %key, removed, detached, "invalidated");
        removed || detached
    }

    fn invalidate_all(&self) {
        let local = self.local.clone();
        self.flight.detach_all(|| local.clear());
        self.stats.record_invalidation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct Gate {
        calls: AtomicUsize,
        release: Notify,
        value: parking_lot::Mutex<Entry<u32>>,
    }

    #[async_trait]
    impl EntryLoader<String, u32> for Gate {
        async fn load(&self, _key: &String) -> Result<Entry<u32>, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(self.value.lock().clone())
        }
    }

    fn gate(value: Entry<u32>) -> Arc<Gate> {
        Arc::new(Gate {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
            value: parking_lot::Mutex::new(value),
        })
    }

    #[tokio::test]
    async fn invalidation_during_load_keeps_the_stale_value_out() {
        let loader = gate(Entry::Present(1));
        let cache = EntryCache::new("test", CachePolicy::default(), loader.clone());
        let key = "thing:org.example:a".to_string();

        let waiter = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get(&key).await })
        };
        while loader.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(cache.invalidate(&key));
        loader.release.notify_one();

        assert_eq!(waiter.await.unwrap().unwrap(), Entry::Present(1));
        assert_eq!(cache.get_if_present(&key), None);

        *loader.value.lock() = Entry::Present(2);
        let reload = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get(&key).await })
        };
        while loader.calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        loader.release.notify_one();
        assert_eq!(reload.await.unwrap().unwrap(), Entry::Present(2));
        assert_eq!(cache.get_if_present(&key), Some(Entry::Present(2)));
    }

    #[tokio::test]
    async fn fresh_entries_are_served_without_loading() {
        let loader = gate(Entry::Nonexistent);
        let cache = EntryCache::new("test", CachePolicy::default(), loader.clone());
        let copy = cache.clone();
        let key = "policy:org.example:p".to_string();

        cache.put(key.clone(), Entry::Present(4));
        assert_eq!(copy.get(&key).await.unwrap(), Entry::Present(4));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().snapshot().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_reload_after_ttl() {
        let loader = gate(Entry::Nonexistent);
        let policy = CachePolicy::new(Duration::from_secs(5), 10);
        let cache = EntryCache::new("test", policy, loader.clone());
        let key = "policy:org.example:p".to_string();

        cache.put(key.clone(), Entry::Present(9));
        assert_eq!(cache.get(&key).await.unwrap(), Entry::Present(9));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get_if_present(&key), None);

        let pending = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get(&key).await })
        };
        while loader.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        loader.release.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), Entry::Nonexistent);
        assert_eq!(cache.stats().snapshot().hits, 1);
    }
}
