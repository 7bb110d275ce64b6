use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::entry::Entry;

pub struct LocalLru<K: Hash + Eq, V> {
    inner: Arc<Mutex<LruCache<K, CacheEntry<V>>>>,
}

impl<K: Hash + Eq, V> Clone for LocalLru<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub entry: Entry<V>,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(entry: Entry<V>, ttl: Duration) -> Self {
        Self {
            entry,
            stored_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

impl<K: Hash + Eq + Clone, V: Clone> LocalLru<K, V> {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    /// Returns the entry if it is still fresh; expired entries are dropped.
    pub fn get_fresh(&self, key: &K) -> Option<Entry<V>> {
        let mut guard = self.inner.lock();
        let fresh = guard.get(key).map(|stored| stored.is_fresh(Instant::now()))?;
        if fresh {
            guard.get(key).map(|stored| stored.entry.clone())
        } else {
            guard.pop(key);
            None
        }
    }

    /// Inserts an entry and reports whether another key was evicted to make room.
    pub fn put(&self, key: K, entry: Entry<V>, ttl: Duration) -> bool {
        let mut guard = self.inner.lock();
        match guard.push(key.clone(), CacheEntry::new(entry, ttl)) {
            Some((evicted, _)) => evicted != key,
            None => false,
        }
    }

    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().pop(key).is_some()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_dropped_on_read() {
        let lru = LocalLru::new(4);
        lru.put("a", Entry::Present(1), Duration::from_secs(1));
        assert_eq!(lru.get_fresh(&"a"), Some(Entry::Present(1)));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(lru.get_fresh(&"a"), None);
        assert!(lru.is_empty());
    }

    #[tokio::test]
    async fn least_recently_used_key_is_evicted() {
        let lru = LocalLru::new(2);
        let ttl = Duration::from_secs(60);
        assert!(!lru.put("a", Entry::Present(1), ttl));
        assert!(!lru.put("b", Entry::<i32>::Nonexistent, ttl));
        lru.get_fresh(&"a");
        assert!(lru.put("c", Entry::Present(3), ttl));
        assert_eq!(lru.get_fresh(&"b"), None);
        assert_eq!(lru.get_fresh(&"a"), Some(Entry::Present(1)));
    }
}
