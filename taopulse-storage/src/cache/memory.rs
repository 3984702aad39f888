//! In-process cache store backed by a concurrent hash map.

use async_trait::async_trait;
use dashmap::DashMap;
use taopulse_core::{QueryKey, Timestamp};

use super::traits::{CacheEntry, CacheStore};

/// Concurrent in-memory [`CacheStore`].
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<QueryKey, CacheEntry>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    async fn set(&self, key: QueryKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    async fn remove(&self, key: &QueryKey) -> bool {
        self.entries.remove(key).is_some()
    }

    async fn remove_if_expired(&self, key: &QueryKey, now: Timestamp) -> bool {
        self.entries
            .remove_if(key, |_, entry| !entry.is_live(now))
            .is_some()
    }

    async fn purge_expired(&self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    async fn len(&self) -> usize {
        self.entries.len()
    }
}
