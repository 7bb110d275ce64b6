use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};
use warden_core_types::AuthorizationContext;

use crate::errors::CacheError;

struct Pending<R> {
    reply_to: R,
    context: AuthorizationContext,
    expires_at: Instant,
}

/// Longest time an entry is kept, whatever the requested timeout.
const MAX_TTL: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// A waiter removed by [`CorrelationCache::put`] before any response arrived.
#[derive(Debug)]
pub struct Displaced<R> {
    pub correlation_id: String,
    pub reply_to: R,
}

impl<R> Displaced<R> {
    fn new(correlation_id: String, pending: Pending<R>) -> Self {
        Self {
            correlation_id,
            reply_to: pending.reply_to,
        }
    }
}

/// Remembers who is waiting for the response to a correlated request.
///
/// Every entry carries its own expiry. An entry is handed out at most once:
/// the first successful `get` removes it.
pub struct CorrelationCache<R> {
    entries: Mutex<HashMap<String, Pending<R>>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<R: Clone + Send + 'static> CorrelationCache<R> {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Registers a waiter. `timeout` overrides the default expiry for this entry only.
    ///
    /// Waiters pushed out to stay within capacity are handed back, so whoever
    /// owns them can still answer.
    pub fn put(
        &self,
        correlation_id: &str,
        reply_to: R,
        context: AuthorizationContext,
        timeout: Option<Duration>,
    ) -> Result<Vec<Displaced<R>>, CacheError> {
        if correlation_id.trim().is_empty() {
            return Err(CacheError::precondition("correlation id must not be blank"));
        }
        let now = Instant::now();
        let ttl = timeout.unwrap_or(self.default_ttl).min(MAX_TTL);
        let expires_at = now.checked_add(ttl).unwrap_or(now);
        let mut entries = self.entries.lock();
        entries.insert(
            correlation_id.to_string(),
            Pending {
                reply_to,
                context,
                expires_at,
            },
        );
        let mut displaced = Vec::new();
        if entries.len() > self.max_entries {
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, pending)| pending.expires_at <= now)
                .map(|(id, _)| id.clone())
                .collect();
            for id in expired {
                if let Some(pending) = entries.remove(&id) {
                    displaced.push(Displaced::new(id, pending));
                }
            }
            while entries.len() > self.max_entries {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, pending)| pending.expires_at)
                    .map(|(id, _)| id.clone());
                let Some(id) = soonest else { break };
                debug!(correlation_id = %id, "dropping correlation entry over capacity");
                if let Some(pending) = entries.remove(&id) {
                    displaced.push(Displaced::new(id, pending));
                }
            }
        }
        trace!(correlation_id, "correlation registered");
        Ok(displaced)
    }

    /// Takes the entry for `correlation_id` unless it is missing or expired.
    pub async fn get(
        &self,
        correlation_id: &str,
    ) -> Result<Option<(R, AuthorizationContext)>, CacheError> {
        if correlation_id.trim().is_empty() {
            return Err(CacheError::precondition("correlation id must not be blank"));
        }
        let mut entries = self.entries.lock();
        match entries.remove(correlation_id) {
            Some(pending) if pending.expires_at > Instant::now() => {
                Ok(Some((pending.reply_to, pending.context)))
            }
            Some(_) => {
                trace!(correlation_id, "correlation entry expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Takes the entry regardless of its expiry. Whoever owns the timeout uses
    /// this to claim the waiter before reporting the timeout.
    pub fn take(&self, correlation_id: &str) -> Option<(R, AuthorizationContext)> {
        self.entries
            .lock()
            .remove(correlation_id)
            .map(|pending| (pending.reply_to, pending.context))
    }

    pub fn remove(&self, correlation_id: &str) -> bool {
        self.entries.lock().remove(correlation_id).is_some()
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, pending| pending.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()>
    where
        R: Sync,
    {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "swept expired correlation entries");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core_types::AuthorizationContextKind;

    fn ctx(subject: &str) -> AuthorizationContext {
        AuthorizationContext::new(AuthorizationContextKind::Jwt, [subject])
    }

    #[tokio::test]
    async fn blank_ids_are_rejected() {
        let cache: CorrelationCache<u8> = CorrelationCache::new(Duration::from_secs(60), 10);
        assert!(cache.put("  ", 1, ctx("google:a"), None).is_err());
        assert!(cache.get("").await.is_err());
    }

    #[tokio::test]
    async fn entries_are_taken_once() {
        let cache = CorrelationCache::new(Duration::from_secs(60), 10);
        cache.put("c-1", 7u8, ctx("google:a"), None).unwrap();
        let (reply_to, context) = cache.get("c-1").await.unwrap().unwrap();
        assert_eq!(reply_to, 7);
        assert_eq!(context.first_subject().unwrap().as_str(), "google:a");
        assert!(cache.get("c-1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_overflow_hands_back_the_soonest_expiring_entry() {
        let cache = CorrelationCache::new(Duration::from_secs(60), 2);
        cache.put("a", 1u8, ctx("s:a"), Some(Duration::from_secs(5))).unwrap();
        assert!(cache.put("b", 2u8, ctx("s:b"), None).unwrap().is_empty());
        let displaced = cache.put("c", 3u8, ctx("s:c"), None).unwrap();
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].correlation_id, "a");
        assert_eq!(displaced[0].reply_to, 1);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("c").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_timeouts_do_not_overflow() {
        let cache = CorrelationCache::new(Duration::from_secs(60), 10);
        cache.put("a", 1u8, ctx("s:a"), Some(Duration::MAX)).unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(cache.get("a").await.unwrap().map(|(reply_to, _)| reply_to), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn take_claims_expired_entries_too() {
        let cache = CorrelationCache::new(Duration::from_secs(1), 10);
        cache.put("a", 1u8, ctx("s:a"), None).unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.take("a").map(|(reply_to, _)| reply_to), Some(1));
        assert!(cache.take("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_expired_entries() {
        let cache = Arc::new(CorrelationCache::new(Duration::from_secs(1), 10));
        cache.put("a", 1u8, ctx("s:a"), None).unwrap();
        let sweeper = cache.spawn_sweeper(Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(cache.is_empty());
        sweeper.abort();
    }
}
