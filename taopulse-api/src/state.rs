//! Shared application state and collaborator wiring.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use taopulse_core::{
    ConfigError, LedgerGateway, LedgerMutator, PersistenceError, PersistenceSink, Record,
    RecordKind, Scorer, SignalSource,
};
use taopulse_engine::{ActionPipeline, OrchestrationEngine};
use taopulse_providers::{
    ChutesClient, ChutesScorer, DaturaConfig, DaturaSignalSource, HttpLedgerGateway,
    HttpLedgerMutator, MockLedger, MockScorer, MockSignalSource,
};
use taopulse_storage::{
    BatchSink, InMemoryCacheStore, InMemoryRecordStore, LmdbRecordStore, ReadThroughCache,
    RecordStore,
};

use crate::config::AppConfig;
use crate::error::StartupError;

/// Engine type served by the API.
pub type Engine = OrchestrationEngine<InMemoryCacheStore>;

// ============================================================================
// RECORD BACKEND
// ============================================================================

/// Record store chosen at startup.
pub enum RecordBackend {
    Lmdb(LmdbRecordStore),
    Memory(InMemoryRecordStore),
}

impl RecordBackend {
    pub fn name(&self) -> &'static str {
        match self {
            RecordBackend::Lmdb(_) => "lmdb",
            RecordBackend::Memory(_) => "memory",
        }
    }
}

impl std::fmt::Debug for RecordBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RecordBackend").field(&self.name()).finish()
    }
}

#[async_trait]
impl RecordStore for RecordBackend {
    async fn write_batch(
        &self,
        kind: RecordKind,
        records: &[Record],
    ) -> Result<(), PersistenceError> {
        match self {
            RecordBackend::Lmdb(store) => store.write_batch(kind, records).await,
            RecordBackend::Memory(store) => store.write_batch(kind, records).await,
        }
    }

    async fn count(&self, kind: RecordKind) -> Result<u64, PersistenceError> {
        match self {
            RecordBackend::Lmdb(store) => store.count(kind).await,
            RecordBackend::Memory(store) => store.count(kind).await,
        }
    }

    async fn recent(&self, kind: RecordKind, limit: usize) -> Result<Vec<Record>, PersistenceError> {
        match self {
            RecordBackend::Lmdb(store) => store.recent(kind, limit).await,
            RecordBackend::Memory(store) => store.recent(kind, limit).await,
        }
    }
}

// ============================================================================
// APP STATE
// ============================================================================

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub sink: Arc<BatchSink<RecordBackend>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, sink: Arc<BatchSink<RecordBackend>>) -> Self {
        Self {
            engine,
            sink,
            started_at: Instant::now(),
        }
    }

    /// Wire every collaborator from configuration.
    ///
    /// Starts the record sink's flush task, so it must run inside a tokio
    /// runtime.
    pub fn build(config: &AppConfig) -> Result<Self, StartupError> {
        let (gateway, mutator) = ledger(config)?;

        let backend = match &config.records_path {
            Some(path) => {
                RecordBackend::Lmdb(LmdbRecordStore::open(path, config.records_max_size_mb)?)
            }
            None => RecordBackend::Memory(InMemoryRecordStore::new()),
        };
        tracing::info!(backend = backend.name(), "Record store ready");
        let sink = Arc::new(BatchSink::start(Arc::new(backend), config.sink_config()));
        let sink_handle: Arc<dyn PersistenceSink> = sink.clone();

        let cache = ReadThroughCache::new(
            Arc::new(InMemoryCacheStore::new()),
            gateway,
            config.read_through_config(),
        );
        let pipeline = ActionPipeline::new(
            signal_source(config),
            scorer(config),
            mutator,
            sink_handle.clone(),
        )
        .with_policy(config.trade_policy())
        .with_timeouts(config.stage_timeouts());

        let engine = OrchestrationEngine::new(cache, pipeline, sink_handle, config.engine_config());
        Ok(Self::new(Arc::new(engine), sink))
    }
}

fn ledger(
    config: &AppConfig,
) -> Result<(Arc<dyn LedgerGateway>, Arc<dyn LedgerMutator>), StartupError> {
    if config.mock_ledger {
        tracing::warn!("Using mock ledger, stake adjustments are not submitted");
        let ledger = Arc::new(MockLedger::default());
        let gateway: Arc<dyn LedgerGateway> = ledger.clone();
        let mutator: Arc<dyn LedgerMutator> = ledger;
        return Ok((gateway, mutator));
    }

    let url = config
        .ledger_url
        .as_deref()
        .ok_or_else(|| ConfigError::MissingRequired {
            field: "TAOPULSE_LEDGER_URL".to_string(),
        })?;
    let timeout = Duration::from_millis(config.ledger_timeout_ms);
    let gateway: Arc<dyn LedgerGateway> = Arc::new(HttpLedgerGateway::new(url, timeout));
    let mutator: Arc<dyn LedgerMutator> = Arc::new(HttpLedgerMutator::new(url, timeout));
    Ok((gateway, mutator))
}

fn signal_source(config: &AppConfig) -> Arc<dyn SignalSource> {
    match (&config.datura_token, config.mock_signals) {
        (Some(token), false) => Arc::new(DaturaSignalSource::new(
            DaturaConfig::new(token.clone())
                .with_base_url(config.datura_url.clone())
                .with_timeout(Duration::from_millis(config.signal_timeout_ms)),
        )),
        _ => {
            tracing::warn!("Using mock signal source");
            Arc::new(MockSignalSource::default())
        }
    }
}

fn scorer(config: &AppConfig) -> Arc<dyn Scorer> {
    match &config.chutes_token {
        Some(token) => {
            let client = ChutesClient::new(
                token.clone(),
                config.chutes_requests_per_minute,
                Duration::from_millis(config.score_timeout_ms),
            )
            .with_base_url(config.chutes_url.clone());
            Arc::new(ChutesScorer::new(client, config.chutes_model.clone()))
        }
        None => {
            tracing::warn!("TAOPULSE_CHUTES_TOKEN not set, scoring with keyword polarity");
            Arc::new(MockScorer::Keywords)
        }
    }
}
