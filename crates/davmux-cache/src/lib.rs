//! davmux Cache - metadata caching
//!
//! This crate caches serialized PROPFIND results per `(path, depth)` with
//! a fixed time-to-live and explicit invalidation.

pub mod stat_cache;
pub mod stats;
pub mod ttl;

pub use stat_cache::StatCache;
pub use stats::CacheStats;
pub use ttl::TtlCache;
