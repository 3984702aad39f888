//! Dividend cache with stampede protection.
//!
//! Reads go through [`ReadThroughCache`], which serves live entries from a
//! [`CacheStore`] and coalesces concurrent misses for the same key into one
//! upstream fetch. Every read returns a [`CacheRead`] that says whether the
//! value came from the cache and when it was collected.
//!
//! # Example
//!
//! ```ignore
//! let cache = ReadThroughCache::new(
//!     Arc::new(InMemoryCacheStore::new()),
//!     gateway,
//!     ReadThroughConfig::default(),
//! );
//!
//! let read = cache.get(&QueryKey::account(18, "5F...")).await?;
//! if read.was_cache_hit() {
//!     tracing::debug!(age = ?read.staleness(), "served from cache");
//! }
//! ```

pub mod freshness;
pub mod memory;
pub mod read_through;
pub mod traits;

pub use freshness::CacheRead;
pub use memory::InMemoryCacheStore;
pub use read_through::{ReadThroughCache, ReadThroughConfig};
pub use traits::{CacheEntry, CacheStats, CacheStore};
