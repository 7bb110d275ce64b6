pub mod correlation;
pub mod entry;
pub mod errors;
pub mod layer;
pub mod metrics;
pub mod policy;
pub mod prelude;
pub mod projection;
pub mod r#trait;

pub use correlation::{CorrelationCache, Displaced};
pub use entry::Entry;
pub use errors::CacheError;
pub use layer::entry_cache::EntryCache;
pub use layer::local_lru::LocalLru;
pub use layer::singleflight::Flight;
pub use metrics::{CacheStats, StatsSnapshot};
pub use policy::CachePolicy;
pub use projection::ProjectedCache;
pub use r#trait::{EntryLoader, Invalidation};
