pub use crate::correlation::{CorrelationCache, Displaced};
pub use crate::entry::Entry;
pub use crate::errors::CacheError;
pub use crate::layer::entry_cache::EntryCache;
pub use crate::metrics::{CacheStats, StatsSnapshot};
pub use crate::policy::CachePolicy;
pub use crate::projection::ProjectedCache;
pub use crate::r#trait::{EntryLoader, Invalidation};
