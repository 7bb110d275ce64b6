use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use warden_cache::prelude::*;
use warden_core_types::{AuthorizationContext, AuthorizationContextKind, EntityKey};

struct CountingLoader {
    calls: AtomicUsize,
    delay: Duration,
    answer: Option<u64>,
    fail: bool,
}

impl CountingLoader {
    fn new(answer: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            answer,
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(10),
            answer: None,
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntryLoader<EntityKey, u64> for CountingLoader {
    async fn load(&self, _key: &EntityKey) -> Result<Entry<u64>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(CacheError::load_failed("store unreachable"));
        }
        Ok(self.answer.into())
    }
}

fn cache(loader: Arc<CountingLoader>) -> EntryCache<EntityKey, u64> {
    EntryCache::new("policy_enforcer", CachePolicy::default(), loader)
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_load() {
    let loader = CountingLoader::new(Some(42));
    let cache = cache(loader.clone());
    let key = EntityKey::policy("org.example:p1");

    let mut waiters = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let key = key.clone();
        waiters.push(tokio::spawn(async move { cache.get(&key).await }));
    }
    for waiter in waiters {
        assert_eq!(waiter.await.unwrap().unwrap(), Entry::Present(42));
    }
    assert_eq!(loader.calls(), 1);
    assert_eq!(cache.get(&key).await.unwrap(), Entry::Present(42));
    assert_eq!(loader.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn nonexistence_is_cached_until_invalidated() {
    let loader = CountingLoader::new(None);
    let cache = cache(loader.clone());
    let key = EntityKey::thing("org.example:gone");

    assert_eq!(cache.get(&key).await.unwrap(), Entry::Nonexistent);
    assert_eq!(cache.get(&key).await.unwrap(), Entry::Nonexistent);
    assert_eq!(loader.calls(), 1);

    assert!(cache.invalidate(&key));
    assert_eq!(cache.get(&key).await.unwrap(), Entry::Nonexistent);
    assert_eq!(loader.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_not_cached() {
    let loader = CountingLoader::failing();
    let cache = cache(loader.clone());
    let key = EntityKey::policy("org.example:flaky");

    let first = cache.get(&key).await.unwrap_err();
    assert!(first.0.is(warden_errors::prelude::codes::CACHE_LOAD_FAILED));
    assert!(cache.get_if_present(&key).is_none());
    assert!(cache.get(&key).await.is_err());
    assert_eq!(loader.calls(), 2);
    assert_eq!(cache.stats().snapshot().errors, 2);
}

#[tokio::test(start_paused = true)]
async fn projection_follows_the_base_entry() {
    let loader = CountingLoader::new(Some(21));
    let base = cache(loader.clone());
    let doubled = base.project(|value| value * 2);
    let key = EntityKey::policy("org.example:p2");

    assert_eq!(doubled.get(&key).await.unwrap(), Entry::Present(42));
    assert_eq!(base.get_if_present(&key), Some(Entry::Present(21)));
    doubled.invalidate(&key);
    assert!(base.get_if_present(&key).is_none());
    assert_eq!(loader.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn correlation_entries_expire_independently() {
    let cache: CorrelationCache<&'static str> =
        CorrelationCache::new(Duration::from_secs(60), 100);
    let context = AuthorizationContext::new(AuthorizationContextKind::Jwt, ["google:alice"]);
    let expiries = [60, 1, 60, 1];
    let replies = ["r0", "r1", "r2", "r3"];
    for (i, (secs, reply)) in expiries.iter().zip(replies).enumerate() {
        cache
            .put(
                &format!("c-{i}"),
                reply,
                context.clone(),
                Some(Duration::from_secs(*secs)),
            )
            .unwrap();
    }

    tokio::time::advance(Duration::from_millis(1250)).await;

    for (i, (secs, reply)) in expiries.iter().zip(replies).enumerate() {
        let found = cache.get(&format!("c-{i}")).await.unwrap();
        if *secs == 60 {
            let (reply_to, ctx) = found.expect("long-lived entry");
            assert_eq!(reply_to, reply);
            assert_eq!(ctx, context);
        } else {
            assert!(found.is_none());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn full_correlation_cache_hands_back_expired_waiters_first() {
    let cache: CorrelationCache<&'static str> = CorrelationCache::new(Duration::from_secs(60), 2);
    let context = AuthorizationContext::new(AuthorizationContextKind::Jwt, ["google:alice"]);
    cache
        .put("short", "r-short", context.clone(), Some(Duration::from_secs(1)))
        .unwrap();
    cache.put("long", "r-long", context.clone(), None).unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    let displaced = cache.put("next", "r-next", context, None).unwrap();

    let ids: Vec<&str> = displaced.iter().map(|d| d.correlation_id.as_str()).collect();
    assert_eq!(ids, vec!["short"]);
    assert_eq!(displaced[0].reply_to, "r-short");
    assert_eq!(cache.len(), 2);
    assert!(cache.get("long").await.unwrap().is_some());
}
