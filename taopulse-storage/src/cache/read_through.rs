//! Coalescing read-through cache over the upstream ledger.
//!
//! Live entries are served directly. On a miss, at most one upstream fetch
//! per key is in flight at any instant: the first caller starts it and every
//! concurrent caller for the same key subscribes to its outcome. The fetch
//! runs on its own task, so dropping the caller that started it does not
//! cancel it for the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use taopulse_core::{LedgerGateway, QueryKey, UpstreamError};
use tokio::sync::broadcast;
use tracing::{debug, warn, Instrument};

use super::freshness::CacheRead;
use super::traits::{CacheEntry, CacheStats, CacheStore};

type FetchOutcome = Result<CacheRead, UpstreamError>;
type InFlightMap = HashMap<QueryKey, broadcast::Sender<FetchOutcome>>;
type InFlightTable = Mutex<InFlightMap>;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the read-through cache.
#[derive(Debug, Clone)]
pub struct ReadThroughConfig {
    /// Lifetime of a cache entry. Zero or negative disables cache reads and
    /// writes; coalescing still applies.
    pub entry_ttl: TimeDelta,
    /// Budget for one upstream fetch.
    pub fetch_timeout: Duration,
}

impl Default for ReadThroughConfig {
    fn default() -> Self {
        Self {
            entry_ttl: TimeDelta::seconds(120),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl ReadThroughConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the upstream fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Whether entries are read from and written to the store.
    pub fn caches_reads(&self) -> bool {
        self.entry_ttl > TimeDelta::zero()
    }
}

// ============================================================================
// COUNTERS
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// READ-THROUGH CACHE
// ============================================================================

enum Role {
    Leader(broadcast::Sender<FetchOutcome>),
    Follower(broadcast::Receiver<FetchOutcome>),
}

/// Read-through cache with request coalescing.
///
/// Owns the cache store and the in-flight table. Clones share both.
pub struct ReadThroughCache<S: CacheStore> {
    store: Arc<S>,
    gateway: Arc<dyn LedgerGateway>,
    inflight: Arc<InFlightTable>,
    counters: Arc<Counters>,
    config: ReadThroughConfig,
}

impl<S: CacheStore + 'static> ReadThroughCache<S> {
    pub fn new(store: Arc<S>, gateway: Arc<dyn LedgerGateway>, config: ReadThroughConfig) -> Self {
        Self {
            store,
            gateway,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
            config,
        }
    }

    pub fn config(&self) -> &ReadThroughConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve the dividend value for a key.
    ///
    /// Upstream errors are returned as-is to every caller that waited on the
    /// failed fetch. Nothing is retried and failures are never cached.
    pub async fn get(&self, key: &QueryKey) -> Result<CacheRead, UpstreamError> {
        if self.config.caches_reads() {
            if let Some(read) = lookup_live(self.store.as_ref(), key).await {
                Counters::bump(&self.counters.hits);
                debug!(key = %key, "cache hit");
                return Ok(read);
            }
        }
        Counters::bump(&self.counters.misses);

        let mut receiver = match self.join_or_lead(key) {
            Role::Follower(receiver) => {
                Counters::bump(&self.counters.coalesced);
                debug!(key = %key, "joined in-flight fetch");
                receiver
            }
            Role::Leader(sender) => {
                let receiver = sender.subscribe();
                self.spawn_fetch(key.clone(), sender);
                receiver
            }
        };

        match receiver.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(UpstreamError::unavailable(
                "in-flight fetch ended without a result",
            )),
        }
    }

    /// Drop the entry for a key. Returns true if one was present.
    pub async fn invalidate(&self, key: &QueryKey) -> bool {
        self.store.remove(key).await
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired(Utc::now()).await
    }

    /// Number of keys with a fetch in flight.
    pub fn inflight_count(&self) -> usize {
        lock_table(&self.inflight).len()
    }

    pub async fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            fetch_failures: c.fetch_failures.load(Ordering::Relaxed),
            entry_count: self.store.len().await as u64,
        }
    }

    /// Attach to the in-flight fetch for `key`, or register a new one.
    ///
    /// Both branches run under one lock acquisition.
    fn join_or_lead(&self, key: &QueryKey) -> Role {
        let mut table = lock_table(&self.inflight);
        if let Some(sender) = table.get(key) {
            return Role::Follower(sender.subscribe());
        }
        let (sender, _) = broadcast::channel(1);
        table.insert(key.clone(), sender.clone());
        Role::Leader(sender)
    }

    fn spawn_fetch(&self, key: QueryKey, sender: broadcast::Sender<FetchOutcome>) {
        let store = Arc::clone(&self.store);
        let gateway = Arc::clone(&self.gateway);
        let inflight = Arc::clone(&self.inflight);
        let counters = Arc::clone(&self.counters);
        let config = self.config.clone();
        let span = tracing::info_span!("upstream_fetch", key = %key);

        tokio::spawn(
            async move {
                let guard = InFlightGuard::new(key.clone(), inflight);
                let outcome =
                    fetch_and_store(store.as_ref(), gateway.as_ref(), &counters, &config, &key)
                        .await;
                guard.release();
                // No receivers left is fine: every caller went away.
                let _ = sender.send(outcome);
            }
            .instrument(span),
        );
    }
}

impl<S: CacheStore> Clone for ReadThroughCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            gateway: Arc::clone(&self.gateway),
            inflight: Arc::clone(&self.inflight),
            counters: Arc::clone(&self.counters),
            config: self.config.clone(),
        }
    }
}

// ============================================================================
// FETCH TASK
// ============================================================================

/// Removes the in-flight entry when the fetch task ends, including by panic.
struct InFlightGuard {
    key: QueryKey,
    table: Arc<InFlightTable>,
    armed: bool,
}

impl InFlightGuard {
    fn new(key: QueryKey, table: Arc<InFlightTable>) -> Self {
        Self {
            key,
            table,
            armed: true,
        }
    }

    fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.armed {
            lock_table(&self.table).remove(&self.key);
            self.armed = false;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

fn lock_table(table: &InFlightTable) -> MutexGuard<'_, InFlightMap> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn lookup_live<S: CacheStore + ?Sized>(store: &S, key: &QueryKey) -> Option<CacheRead> {
    let now = Utc::now();
    match store.get(key).await {
        Some(entry) if entry.is_live(now) => Some(CacheRead::from_cache(entry)),
        Some(_) => {
            store.remove_if_expired(key, now).await;
            None
        }
        None => None,
    }
}

async fn fetch_and_store<S: CacheStore + ?Sized>(
    store: &S,
    gateway: &dyn LedgerGateway,
    counters: &Counters,
    config: &ReadThroughConfig,
    key: &QueryKey,
) -> FetchOutcome {
    // A fetch that finished just before this one registered may have filled
    // the entry already.
    if config.caches_reads() {
        if let Some(read) = lookup_live(store, key).await {
            return Ok(read);
        }
    }

    Counters::bump(&counters.fetches);
    let started = Instant::now();
    let result = match tokio::time::timeout(config.fetch_timeout, gateway.fetch_value(key)).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout {
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }),
    };

    match result {
        Ok(value) => {
            let collected_at = Utc::now();
            if config.caches_reads() {
                let entry = CacheEntry::new(value.clone(), collected_at, config.entry_ttl);
                store.set(key.clone(), entry).await;
            }
            debug!(elapsed_ms = started.elapsed().as_millis() as u64, "upstream fetch completed");
            Ok(CacheRead::from_fetch(value, collected_at))
        }
        Err(e) => {
            Counters::bump(&counters.fetch_failures);
            warn!(error = %e, "upstream fetch failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCacheStore;
    use futures_util::future::join_all;
    use taopulse_core::DividendValue;
    use taopulse_test_utils::ScriptedGateway;

    fn cache_with(
        gateway: Arc<ScriptedGateway>,
        config: ReadThroughConfig,
    ) -> ReadThroughCache<InMemoryCacheStore> {
        ReadThroughCache::new(Arc::new(InMemoryCacheStore::new()), gateway, config)
    }

    fn key_a() -> QueryKey {
        QueryKey::account(18, "A")
    }

    #[tokio::test]
    async fn test_miss_then_hit_within_ttl() -> Result<(), UpstreamError> {
        let gateway = Arc::new(ScriptedGateway::returning(DividendValue::single(18, "A", 1000)));
        let cache = cache_with(gateway.clone(), ReadThroughConfig::default());

        let first = cache.get(&key_a()).await?;
        assert!(!first.was_cache_hit());
        assert_eq!(first.value(), &DividendValue::single(18, "A", 1000));

        let second = cache.get(&key_a()).await?;
        assert!(second.was_cache_hit());
        assert_eq!(second.value(), first.value());
        assert_eq!(second.collected_at(), first.collected_at());
        assert_eq!(gateway.calls(), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.entry_count, 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_fetch() {
        let gateway = Arc::new(
            ScriptedGateway::returning(DividendValue::single(18, "A", 1000))
                .with_delay(Duration::from_millis(100)),
        );
        let cache = cache_with(gateway.clone(), ReadThroughConfig::default());

        let handles = (0..16).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&key_a()).await })
        });
        let results = join_all(handles).await;

        assert_eq!(gateway.calls(), 1);
        for result in results {
            let read = result.expect("task panicked").expect("fetch failed");
            assert!(!read.was_cache_hit());
            assert_eq!(read.value().amount(18, "A"), Some(1000));
        }
        assert_eq!(cache.stats().await.coalesced, 15);
        assert_eq!(cache.inflight_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failure_fans_out_same_error() {
        let gateway = Arc::new(
            ScriptedGateway::failing(UpstreamError::unavailable("node down"))
                .with_delay(Duration::from_millis(50)),
        );
        let cache = cache_with(gateway.clone(), ReadThroughConfig::default());

        let handles = (0..8).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&key_a()).await })
        });
        for result in join_all(handles).await {
            assert_eq!(
                result.expect("task panicked"),
                Err(UpstreamError::unavailable("node down"))
            );
        }
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let gateway = Arc::new(ScriptedGateway::returning(DividendValue::single(18, "A", 7)));
        gateway.push_failure(UpstreamError::unavailable("blip"));
        let cache = cache_with(gateway.clone(), ReadThroughConfig::default());

        assert!(cache.get(&key_a()).await.is_err());
        assert_eq!(cache.stats().await.entry_count, 0);

        let retry = cache.get(&key_a()).await.expect("second fetch should succeed");
        assert!(!retry.was_cache_hit());
        assert_eq!(retry.value().amount(18, "A"), Some(7));
        assert_eq!(gateway.calls(), 2);
        assert_eq!(cache.stats().await.fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() -> Result<(), UpstreamError> {
        let gateway = Arc::new(ScriptedGateway::returning(DividendValue::single(18, "A", 1)));
        let config = ReadThroughConfig::new().with_ttl(TimeDelta::milliseconds(50));
        let cache = cache_with(gateway.clone(), config);

        cache.get(&key_a()).await?;
        tokio::time::sleep(Duration::from_millis(80)).await;
        let read = cache.get(&key_a()).await?;

        assert!(!read.was_cache_hit());
        assert_eq!(gateway.calls(), 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_zero_ttl_bypasses_cache_but_coalesces() {
        let gateway = Arc::new(
            ScriptedGateway::returning(DividendValue::single(18, "A", 3))
                .with_delay(Duration::from_millis(80)),
        );
        let config = ReadThroughConfig::new().with_ttl(TimeDelta::zero());
        let cache = cache_with(gateway.clone(), config);

        let handles = (0..4).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&key_a()).await })
        });
        for result in join_all(handles).await {
            let read = result.expect("task panicked").expect("fetch failed");
            assert!(!read.was_cache_hit());
        }
        assert_eq!(gateway.calls(), 1);
        assert_eq!(cache.stats().await.entry_count, 0);

        let again = cache.get(&key_a()).await.expect("fetch failed");
        assert!(!again.was_cache_hit());
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_timeout_surfaces_as_timeout() {
        let gateway = Arc::new(
            ScriptedGateway::returning(DividendValue::new()).with_delay(Duration::from_millis(300)),
        );
        let config = ReadThroughConfig::new().with_fetch_timeout(Duration::from_millis(30));
        let cache = cache_with(gateway, config);

        let err = cache.get(&key_a()).await.expect_err("fetch should time out");
        assert!(err.is_timeout());
        assert_eq!(cache.stats().await.entry_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_keys_fetch_independently() {
        let gateway = Arc::new(
            ScriptedGateway::returning(DividendValue::new()).with_delay(Duration::from_millis(40)),
        );
        let cache = cache_with(gateway.clone(), ReadThroughConfig::default());

        let keys = [
            QueryKey::account(18, "A"),
            QueryKey::account(18, "B"),
            QueryKey::subnet(18),
        ];
        let handles = keys.iter().cloned().map(|key| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&key).await })
        });
        for result in join_all(handles).await {
            assert!(result.expect("task panicked").is_ok());
        }
        assert_eq!(gateway.calls(), 3);
        for key in &keys {
            assert_eq!(gateway.calls_for(key), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_leader_does_not_cancel_fetch() {
        let gateway = Arc::new(
            ScriptedGateway::returning(DividendValue::single(18, "A", 9))
                .with_delay(Duration::from_millis(150)),
        );
        let cache = cache_with(gateway.clone(), ReadThroughConfig::default());

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&key_a()).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let follower = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&key_a()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        let read = follower
            .await
            .expect("task panicked")
            .expect("fetch failed");
        assert_eq!(read.value().amount(18, "A"), Some(9));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() -> Result<(), UpstreamError> {
        let gateway = Arc::new(ScriptedGateway::returning(DividendValue::single(18, "A", 1)));
        let cache = cache_with(gateway.clone(), ReadThroughConfig::default());

        cache.get(&key_a()).await?;
        assert!(cache.invalidate(&key_a()).await);
        assert!(!cache.invalidate(&key_a()).await);

        let read = cache.get(&key_a()).await?;
        assert!(!read.was_cache_hit());
        assert_eq!(gateway.calls(), 2);
        Ok(())
    }

    #[test]
    fn test_config_builder() {
        let config = ReadThroughConfig::new()
            .with_ttl(TimeDelta::seconds(-1))
            .with_fetch_timeout(Duration::from_secs(3));
        assert!(!config.caches_reads());
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
        assert!(ReadThroughConfig::default().caches_reads());
    }
}
