pub mod entry_cache;
pub mod local_lru;
pub mod singleflight;
