//! Cache store trait, cache entries and statistics.

use async_trait::async_trait;
use chrono::TimeDelta;
use taopulse_core::{DividendValue, QueryKey, Timestamp};

/// A cached dividend value with its collection and expiry instants.
///
/// Entries are immutable: a refresh replaces the whole entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    value: DividendValue,
    collected_at: Timestamp,
    expires_at: Timestamp,
}

impl CacheEntry {
    /// Create an entry expiring `ttl` after `collected_at`.
    pub fn new(value: DividendValue, collected_at: Timestamp, ttl: TimeDelta) -> Self {
        let expires_at = collected_at
            .checked_add_signed(ttl)
            .unwrap_or(collected_at);
        Self {
            value,
            collected_at,
            expires_at,
        }
    }

    pub fn value(&self) -> &DividendValue {
        &self.value
    }

    pub fn into_value(self) -> DividendValue {
        self.value
    }

    pub fn collected_at(&self) -> Timestamp {
        self.collected_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// An entry is live strictly before its expiry instant.
    pub fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

/// Key/value store for dividend entries.
///
/// Stores keep whatever they are given; expiry is decided by the caller
/// through [`CacheEntry::is_live`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the entry for a key, live or not.
    async fn get(&self, key: &QueryKey) -> Option<CacheEntry>;

    /// Insert or replace the entry for a key.
    async fn set(&self, key: QueryKey, entry: CacheEntry);

    /// Remove the entry for a key. Returns true if one was present.
    async fn remove(&self, key: &QueryKey) -> bool;

    /// Remove the entry for a key only if it is expired at `now`.
    async fn remove_if_expired(&self, key: &QueryKey, now: Timestamp) -> bool;

    /// Remove every expired entry. Returns how many were removed.
    async fn purge_expired(&self, now: Timestamp) -> usize;

    /// Number of entries currently held.
    async fn len(&self) -> usize;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Reads served from a live entry.
    pub hits: u64,
    /// Reads that needed an upstream result.
    pub misses: u64,
    /// Misses that joined an in-flight fetch instead of starting one.
    pub coalesced: u64,
    /// Upstream fetches started.
    pub fetches: u64,
    /// Upstream fetches that failed.
    pub fetch_failures: u64,
    /// Entries currently held by the store.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_entry_expires_at_collected_plus_ttl() {
        let now = Utc::now();
        let entry = CacheEntry::new(DividendValue::new(), now, TimeDelta::seconds(120));
        assert_eq!(entry.expires_at(), now + TimeDelta::seconds(120));
        assert!(entry.is_live(now));
        assert!(entry.is_live(now + TimeDelta::seconds(119)));
        assert!(!entry.is_live(now + TimeDelta::seconds(120)));
    }

    #[test]
    fn test_non_positive_ttl_is_never_live() {
        let now = Utc::now();
        let zero = CacheEntry::new(DividendValue::new(), now, TimeDelta::zero());
        let negative = CacheEntry::new(DividendValue::new(), now, TimeDelta::seconds(-5));
        assert!(!zero.is_live(now));
        assert!(!negative.is_live(now));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// An entry is returned as live exactly when now < collected_at + ttl.
        #[test]
        fn prop_entry_liveness_matches_expiry(
            ttl_ms in -10_000i64..10_000i64,
            offset_ms in -20_000i64..20_000i64,
        ) {
            let collected = Utc::now();
            let entry = CacheEntry::new(DividendValue::new(), collected, TimeDelta::milliseconds(ttl_ms));
            let now = collected + TimeDelta::milliseconds(offset_ms);
            prop_assert_eq!(entry.is_live(now), offset_ms < ttl_ms);
        }
    }
}
