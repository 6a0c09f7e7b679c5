//! In-memory caching primitives
//!
//! - [`TtlCache`]: capacity-bounded TTL store with recency eviction
//! - [`CacheKeys`]: namespaced key generation

mod keys;
mod store;

pub use keys::{CacheKeys, DEFAULT_PREFIX};
pub use store::{CacheStats, TtlCache};
