use async_trait::async_trait;

use crate::entry::Entry;
use crate::errors::CacheError;

/// Resolves a value on a cache miss.
///
/// `Ok(Entry::Nonexistent)` is cached; `Err` is a transient failure and is not.
#[async_trait]
pub trait EntryLoader<K, V>: Send + Sync {
    async fn load(&self, key: &K) -> Result<Entry<V>, CacheError>;
}

pub trait Invalidation<K>: Send + Sync {
    fn invalidate(&self, key: &K) -> bool;
    fn invalidate_all(&self);
}
