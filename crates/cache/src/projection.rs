use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use crate::entry::Entry;
use crate::errors::CacheError;
use crate::layer::entry_cache::EntryCache;
use crate::r#trait::Invalidation;

/// A view of an [`EntryCache`] that applies a pure function to every present
/// value. It holds no state of its own, so invalidating either side affects both.
pub struct ProjectedCache<K: Hash + Eq, V, W> {
    base: EntryCache<K, V>,
    project: Arc<dyn Fn(&V) -> W + Send + Sync>,
}

impl<K: Hash + Eq, V, W> Clone for ProjectedCache<K, V, W> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            project: self.project.clone(),
        }
    }
}

impl<K, V, W> ProjectedCache<K, V, W>
where
    K: Hash + Eq + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(base: EntryCache<K, V>, project: impl Fn(&V) -> W + Send + Sync + 'static) -> Self {
        Self {
            base,
            project: Arc::new(project),
        }
    }

    pub fn base(&self) -> &EntryCache<K, V> {
        &self.base
    }

    pub async fn get(&self, key: &K) -> Result<Entry<W>, CacheError> {
        let entry = self.base.get(key).await?;
        Ok(entry.map(|value| (self.project)(&value)))
    }

    pub fn get_if_present(&self, key: &K) -> Option<Entry<W>> {
        self.base
            .get_if_present(key)
            .map(|entry| entry.map(|value| (self.project)(&value)))
    }
}

impl<K, V, W> Invalidation<K> for ProjectedCache<K, V, W>
where
    K: Hash + Eq + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn invalidate(&self, key: &K) -> bool {
        self.base.invalidate(key)
    }

    fn invalidate_all(&self) {
        self.base.invalidate_all()
    }
}
