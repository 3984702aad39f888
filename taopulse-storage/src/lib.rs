//! TaoPulse Storage - Cache and Record Persistence
//!
//! The dividend cache (with request coalescing) and the batching record
//! sink with its LMDB and in-memory backends.

pub mod cache;
pub mod sink;

pub use cache::{
    CacheEntry, CacheRead, CacheStats, CacheStore, InMemoryCacheStore, ReadThroughCache,
    ReadThroughConfig,
};
pub use sink::{
    BatchSink, BatchSinkConfig, InMemoryRecordStore, LmdbRecordStore, LmdbStoreError,
    RecordStore,
};
