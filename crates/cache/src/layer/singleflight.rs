use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

pub type SharedLoad<T> = Shared<BoxFuture<'static, T>>;

/// Registry of in-flight loads; concurrent callers for one key join a single
/// shared future.
///
/// Each registration carries a ticket. A load may only publish its result
/// while its ticket is still registered, so `detach` (used on invalidation)
/// keeps a stale load from repopulating the cache.
pub struct Flight<K, T> {
    inner: Arc<Mutex<HashMap<K, InFlight<T>>>>,
    tickets: Arc<AtomicU64>,
}

struct InFlight<T> {
    ticket: u64,
    load: SharedLoad<T>,
}

pub enum Joined<T> {
    Ready(T),
    Pending(SharedLoad<T>),
}

impl<K, T> Clone for Flight<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            tickets: self.tickets.clone(),
        }
    }
}

impl<K, T> Default for Flight<K, T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            tickets: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl<K, T> Flight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone + Send + Sync + 'static,
{
    /// Joins the load registered for `key`, or registers `start(ticket)`.
    ///
    /// `ready` is consulted under the registry lock first, so a caller can
    /// never miss both a just-published value and the load that produced it.
    pub fn join_or_start(
        &self,
        key: &K,
        ready: impl FnOnce() -> Option<T>,
        start: impl FnOnce(u64) -> BoxFuture<'static, T>,
    ) -> (Joined<T>, bool) {
        let mut map = self.inner.lock();
        if let Some(value) = ready() {
            return (Joined::Ready(value), false);
        }
        if let Some(existing) = map.get(key) {
            return (Joined::Pending(existing.load.clone()), false);
        }
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let load = start(ticket).shared();
        map.insert(
            key.clone(),
            InFlight {
                ticket,
                load: load.clone(),
            },
        );
        (Joined::Pending(load), true)
    }

    /// Unregisters the load holding `ticket` and runs `publish` under the
    /// registry lock. Returns `false` without publishing if the ticket was
    /// detached or replaced.
    pub fn complete(&self, key: &K, ticket: u64, publish: impl FnOnce()) -> bool {
        let mut map = self.inner.lock();
        match map.get(key) {
            Some(current) if current.ticket == ticket => {
                map.remove(key);
                publish();
                true
            }
            _ => false,
        }
    }

    /// Forgets any load for `key` and runs `then` under the registry lock.
    pub fn detach(&self, key: &K, then: impl FnOnce()) -> bool {
        let mut map = self.inner.lock();
        let detached = map.remove(key).is_some();
        then();
        detached
    }

    pub fn detach_all(&self, then: impl FnOnce()) {
        let mut map = self.inner.lock();
        map.clear();
        then();
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().len()
    }
}
