use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CachePolicy {
    /// Maximum age of an entry, measured from insertion.
    pub ttl: Duration,
    pub max_entries: usize,
}

impl CachePolicy {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(120),
            max_entries: 20_000,
        }
    }
}
