//! Cache read results carrying provenance.

use chrono::Utc;
use std::time::Duration;
use taopulse_core::{DividendValue, Timestamp};

use super::traits::CacheEntry;

/// Result of a read-through lookup.
///
/// `cached` tells whether the value was served from a live entry, and
/// `collected_at` is when the value was originally fetched upstream. For a
/// fresh fetch it is the fetch completion instant.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead {
    value: DividendValue,
    cached: bool,
    collected_at: Timestamp,
}

impl CacheRead {
    /// A read served from a cache entry.
    pub fn from_cache(entry: CacheEntry) -> Self {
        let collected_at = entry.collected_at();
        Self {
            value: entry.into_value(),
            cached: true,
            collected_at,
        }
    }

    /// A read served by an upstream fetch that completed at `collected_at`.
    pub fn from_fetch(value: DividendValue, collected_at: Timestamp) -> Self {
        Self {
            value,
            cached: false,
            collected_at,
        }
    }

    pub fn value(&self) -> &DividendValue {
        &self.value
    }

    pub fn into_value(self) -> DividendValue {
        self.value
    }

    pub fn was_cache_hit(&self) -> bool {
        self.cached
    }

    pub fn collected_at(&self) -> Timestamp {
        self.collected_at
    }

    /// Age of the value relative to now.
    pub fn staleness(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.collected_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
