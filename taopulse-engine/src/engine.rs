//! Query orchestration.
//!
//! Resolves an inbound dividend query through the read-through cache,
//! records fresh fetches, and runs the action pipeline when asked. Only an
//! upstream failure fails the query; the pipeline's outcome is attached to
//! the response without touching the dividend fields.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use taopulse_core::{
    DividendQuery, DividendValue, PersistenceSink, QueryKey, Record, RecordKind, RequestId,
    ResponseEnvelope, SubnetId, UpstreamError,
};
use taopulse_storage::{CacheStats, CacheStore, ReadThroughCache};
use tracing::{info, info_span, warn, Instrument};

use crate::persist::{elapsed_ms, spawn_append};
use crate::pipeline::ActionPipeline;

/// Defaults applied to inbound queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Subnet used when a query names none.
    pub default_subnet: SubnetId,
    /// Account adjusted by the pipeline when a query names none.
    pub default_account: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_subnet: 18,
            default_account: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_subnet(mut self, subnet_id: SubnetId) -> Self {
        self.default_subnet = subnet_id;
        self
    }

    pub fn with_default_account(mut self, account: impl Into<String>) -> Self {
        self.default_account = Some(account.into());
        self
    }
}

/// Coordinates the cache, the action pipeline, and persistence for queries.
pub struct OrchestrationEngine<S: CacheStore> {
    cache: ReadThroughCache<S>,
    pipeline: ActionPipeline,
    sink: Arc<dyn PersistenceSink>,
    config: EngineConfig,
}

impl<S: CacheStore + 'static> OrchestrationEngine<S> {
    pub fn new(
        cache: ReadThroughCache<S>,
        pipeline: ActionPipeline,
        sink: Arc<dyn PersistenceSink>,
        config: EngineConfig,
    ) -> Self {
        let pipeline = match &config.default_account {
            Some(account) => pipeline.with_default_account(account.clone()),
            None => pipeline,
        };
        Self {
            cache,
            pipeline,
            sink,
            config,
        }
    }

    pub fn cache(&self) -> &ReadThroughCache<S> {
        &self.cache
    }

    pub fn pipeline(&self) -> &ActionPipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Cache key for a query. The subnet falls back to the default; the
    /// account is used as given, so an absent account reads the whole subnet.
    pub fn resolve(&self, query: &DividendQuery) -> QueryKey {
        QueryKey::new(
            query.subnet_id.unwrap_or(self.config.default_subnet),
            query.account.clone(),
        )
    }

    /// Serve a query under a fresh request id.
    pub async fn query(&self, query: DividendQuery) -> Result<ResponseEnvelope, UpstreamError> {
        self.query_as(RequestId::generate(), query).await
    }

    /// Serve a query on behalf of `request_id`.
    pub async fn query_as(
        &self,
        request_id: RequestId,
        query: DividendQuery,
    ) -> Result<ResponseEnvelope, UpstreamError> {
        let key = self.resolve(&query);
        let span = info_span!(
            "dividend_query",
            request_id = %request_id,
            key = %key,
            trade = query.trigger_action,
        );

        async move {
            let started = Instant::now();
            let read = match self.cache.get(&key).await {
                Ok(read) => read,
                Err(error) => {
                    warn!(error = %error, elapsed_ms = elapsed_ms(started), "dividend read failed");
                    return Err(error);
                }
            };
            let cached = read.was_cache_hit();
            let collected_at = read.collected_at();

            if !cached {
                self.record_fetch(
                    &request_id,
                    &key,
                    read.value(),
                    query.trigger_action,
                    elapsed_ms(started),
                );
            }

            let trade = if query.trigger_action {
                Some(
                    self.pipeline
                        .run_for(request_id.clone(), &key, read.value().clone())
                        .await,
                )
            } else {
                None
            };

            info!(
                cached,
                trade = trade.as_ref().map(|t| t.status()),
                elapsed_ms = elapsed_ms(started),
                "dividend query served"
            );

            Ok(ResponseEnvelope {
                dividends: read.into_value(),
                cached,
                collected_at,
                trade,
            })
        }
        .instrument(span)
        .await
    }

    fn record_fetch(
        &self,
        request_id: &RequestId,
        key: &QueryKey,
        dividends: &DividendValue,
        trade_requested: bool,
        duration_ms: i64,
    ) {
        let payload = json!({
            "netuid": key.subnet_id,
            "hotkey": key.account,
            "dividends": dividends,
            "trade_requested": trade_requested,
        });
        let record = Record::new(request_id.clone(), RecordKind::Dividends, payload, duration_ms);
        spawn_append(Arc::clone(&self.sink), record);
    }
}

impl<S: CacheStore> std::fmt::Debug for OrchestrationEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationEngine")
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use futures_util::future::join_all;
    use std::time::Duration;
    use taopulse_core::{ActionStage, Direction, SignalError, SignedScore};
    use taopulse_storage::{InMemoryCacheStore, ReadThroughConfig};
    use taopulse_test_utils::assertions::{assert_completed_with, assert_failed_at};
    use taopulse_test_utils::fixtures::{self, ACCOUNT, SUBNET};
    use taopulse_test_utils::{
        RecordingSink, ScriptedGateway, ScriptedMutator, ScriptedScorer, ScriptedSignalSource,
    };

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        gateway: Arc<ScriptedGateway>,
        mutator: Arc<ScriptedMutator>,
        sink: Arc<RecordingSink>,
        engine: OrchestrationEngine<InMemoryCacheStore>,
    }

    fn harness(
        gateway: ScriptedGateway,
        signals: ScriptedSignalSource,
        ttl: TimeDelta,
        config: EngineConfig,
    ) -> Harness {
        let gateway = Arc::new(gateway);
        let mutator = Arc::new(ScriptedMutator::accepting());
        let sink = Arc::new(RecordingSink::new());
        let cache = ReadThroughCache::new(
            Arc::new(InMemoryCacheStore::new()),
            gateway.clone(),
            ReadThroughConfig::new().with_ttl(ttl),
        );
        let pipeline = ActionPipeline::new(
            Arc::new(signals),
            Arc::new(ScriptedScorer::returning(SignedScore::new(-5.0))),
            mutator.clone(),
            sink.clone(),
        );
        Harness {
            gateway,
            mutator,
            sink: sink.clone(),
            engine: OrchestrationEngine::new(cache, pipeline, sink, config),
        }
    }

    fn default_harness() -> Harness {
        harness(
            ScriptedGateway::returning(fixtures::dividend()),
            ScriptedSignalSource::returning(fixtures::signal_items(3)),
            TimeDelta::seconds(120),
            EngineConfig::default(),
        )
    }

    fn account_query(trigger_action: bool) -> DividendQuery {
        DividendQuery {
            subnet_id: Some(SUBNET),
            account: Some(ACCOUNT.to_string()),
            trigger_action,
        }
    }

    #[tokio::test]
    async fn test_second_query_within_ttl_is_cached() {
        let h = default_harness();

        let first = h.engine.query(account_query(false)).await.expect("first query");
        assert!(!first.cached);
        assert_eq!(first.dividends, fixtures::dividend());
        assert!(first.trade.is_none());

        let second = h.engine.query(account_query(false)).await.expect("second query");
        assert!(second.cached);
        assert_eq!(second.dividends, first.dividends);
        assert_eq!(second.collected_at, first.collected_at);
        assert_eq!(h.gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_fresh_fetch_is_recorded_once() {
        let h = default_harness();
        h.engine.query(account_query(false)).await.expect("query");
        h.engine.query(account_query(false)).await.expect("query");

        let records = h.sink.wait_for(RecordKind::Dividends, 1, WAIT).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.sink.records_of(RecordKind::Dividends).len(), 1);

        let payload = &records[0].payload;
        assert_eq!(payload["netuid"], SUBNET);
        assert_eq!(payload["hotkey"], ACCOUNT);
        assert_eq!(payload["dividends"][SUBNET.to_string()][ACCOUNT], 1000);
        assert_eq!(payload["trade_requested"], false);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_queries_share_one_fetch() {
        let h = harness(
            ScriptedGateway::returning(fixtures::dividend()).with_delay(Duration::from_millis(100)),
            ScriptedSignalSource::returning(fixtures::signal_items(1)),
            TimeDelta::seconds(120),
            EngineConfig::default(),
        );

        let responses = join_all((0..2).map(|_| h.engine.query(account_query(false)))).await;
        for response in &responses {
            let response = response.as_ref().expect("query succeeds");
            assert_eq!(response.dividends, fixtures::dividend());
            assert!(!response.cached);
        }
        assert_eq!(h.gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_triggered_trade_is_attached() {
        let h = default_harness();
        let response = h.engine.query(account_query(true)).await.expect("query");

        let trade = response.trade.expect("trade requested");
        assert_completed_with(&trade, Direction::Decrease);
        assert!((h.mutator.adjustments()[0].amount - 0.05).abs() < 1e-12);
        assert_eq!(h.sink.wait_for(RecordKind::Action, 1, WAIT).await.len(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_failure_keeps_dividends() {
        let h = harness(
            ScriptedGateway::returning(fixtures::dividend()),
            ScriptedSignalSource::failing(SignalError::Timeout { elapsed_ms: 15_000 }),
            TimeDelta::seconds(120),
            EngineConfig::default(),
        );

        let plain = h.engine.query(account_query(false)).await.expect("query");
        let with_trade = h.engine.query(account_query(true)).await.expect("query");

        assert_eq!(with_trade.dividends, plain.dividends);
        assert!(with_trade.cached);
        assert_eq!(with_trade.collected_at, plain.collected_at);
        let trade = with_trade.trade.expect("trade requested");
        assert_failed_at(&trade, ActionStage::Signal);
        assert_eq!(h.mutator.calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_fails_query() {
        let h = harness(
            ScriptedGateway::failing(UpstreamError::unavailable("connection refused")),
            ScriptedSignalSource::returning(fixtures::signal_items(1)),
            TimeDelta::seconds(120),
            EngineConfig::default(),
        );

        let result = h.engine.query(account_query(true)).await;
        assert_eq!(result, Err(UpstreamError::unavailable("connection refused")));
        assert_eq!(h.mutator.calls(), 0);
        assert_eq!(h.sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_defaults_applied_to_query() {
        let h = harness(
            ScriptedGateway::returning(DividendValue::empty_subnet(7)),
            ScriptedSignalSource::returning(fixtures::signal_items(1)),
            TimeDelta::seconds(120),
            EngineConfig::new()
                .with_default_subnet(7)
                .with_default_account("fallback"),
        );

        let query = DividendQuery {
            trigger_action: true,
            ..DividendQuery::default()
        };
        assert_eq!(h.engine.resolve(&query), QueryKey::subnet(7));

        let response = h.engine.query(query).await.expect("query");
        assert_eq!(h.gateway.calls_for(&QueryKey::subnet(7)), 1);
        assert_completed_with(&response.trade.expect("trade requested"), Direction::Decrease);

        let adjustment = &h.mutator.adjustments()[0];
        assert_eq!(adjustment.subnet_id, 7);
        assert_eq!(adjustment.account, "fallback");
    }

    #[tokio::test]
    async fn test_zero_ttl_never_serves_cached() {
        let h = harness(
            ScriptedGateway::returning(fixtures::dividend()),
            ScriptedSignalSource::returning(fixtures::signal_items(1)),
            TimeDelta::zero(),
            EngineConfig::default(),
        );

        for _ in 0..3 {
            let response = h.engine.query(account_query(false)).await.expect("query");
            assert!(!response.cached);
        }
        assert_eq!(h.gateway.calls(), 3);
        assert_eq!(h.engine.cache_stats().await.hits, 0);
    }

    #[tokio::test]
    async fn test_aborted_query_still_records_action() {
        let mutator = Arc::new(ScriptedMutator::accepting().with_delay(Duration::from_millis(200)));
        let sink = Arc::new(RecordingSink::new());
        let cache = ReadThroughCache::new(
            Arc::new(InMemoryCacheStore::new()),
            Arc::new(ScriptedGateway::returning(fixtures::dividend())),
            ReadThroughConfig::new(),
        );
        let pipeline = ActionPipeline::new(
            Arc::new(ScriptedSignalSource::returning(fixtures::signal_items(2))),
            Arc::new(ScriptedScorer::returning(SignedScore::new(-5.0))),
            mutator.clone(),
            sink.clone(),
        );
        let engine = Arc::new(OrchestrationEngine::new(
            cache,
            pipeline,
            sink.clone(),
            EngineConfig::default(),
        ));

        let query = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.query(account_query(true)).await }
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        query.abort();
        assert!(query.await.is_err_and(|e| e.is_cancelled()));
        assert_eq!(mutator.calls(), 1);

        let actions = sink.wait_for(RecordKind::Action, 1, WAIT).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.records_of(RecordKind::Action).len(), 1);
        assert_eq!(actions[0].payload["outcome"]["status"], "completed");
        assert_eq!(actions[0].payload["context"]["mutation"]["direction"], "decrease");
    }
}
