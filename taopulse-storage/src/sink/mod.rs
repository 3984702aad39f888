//! Batching persistence sink.
//!
//! [`BatchSink`] implements [`PersistenceSink`] by queueing records per
//! [`RecordKind`] and writing them to a [`RecordStore`] in batches, either
//! on a fixed interval or as soon as a queue reaches its size limit. A batch
//! that fails to write goes back to the front of its queue.
//!
//! Each kind's backlog is capped at `max_backlog`; past it the oldest records
//! are dropped and counted. At most one size-triggered flush per kind is
//! outstanding, and after one fails only the interval flush retries until a
//! write succeeds again.

pub mod lmdb;
pub mod memory;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use taopulse_core::{HealthCheck, PersistenceError, PersistenceSink, Record, RecordKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use lmdb::{LmdbRecordStore, LmdbStoreError};
pub use memory::InMemoryRecordStore;

// ============================================================================
// RECORD STORE
// ============================================================================

/// Backend that durably writes batches of records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write a batch of records of one kind. All or nothing.
    async fn write_batch(&self, kind: RecordKind, records: &[Record])
        -> Result<(), PersistenceError>;

    /// Number of stored records of a kind.
    async fn count(&self, kind: RecordKind) -> Result<u64, PersistenceError>;

    /// Up to `limit` most recent records of a kind, newest first.
    async fn recent(&self, kind: RecordKind, limit: usize) -> Result<Vec<Record>, PersistenceError>;
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the batch sink.
#[derive(Debug, Clone)]
pub struct BatchSinkConfig {
    /// Interval between background flushes.
    pub flush_interval: Duration,
    /// Queue length per kind that triggers an immediate flush.
    pub max_queue_size: usize,
    /// Records kept per kind while the store is failing.
    pub max_backlog: usize,
}

impl Default for BatchSinkConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(1),
            max_queue_size: 1000,
            max_backlog: 10_000,
        }
    }
}

impl BatchSinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size.max(1);
        self
    }

    pub fn with_max_backlog(mut self, size: usize) -> Self {
        self.max_backlog = size.max(1);
        self
    }
}

// ============================================================================
// BATCH SINK
// ============================================================================

struct SinkInner<R: RecordStore> {
    store: Arc<R>,
    queues: Mutex<HashMap<RecordKind, Vec<Record>>>,
    /// Serializes flushes so re-queued batches keep their order.
    flush_lock: tokio::sync::Mutex<()>,
    /// Set while a size-triggered flush is pending or its last attempt failed.
    size_flush: HashMap<RecordKind, AtomicBool>,
    dropped: AtomicU64,
    closed: AtomicBool,
    config: BatchSinkConfig,
}

impl<R: RecordStore> SinkInner<R> {
    fn queues(&self) -> MutexGuard<'_, HashMap<RecordKind, Vec<Record>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the oldest records of `queue` beyond the backlog cap.
    fn trim(&self, kind: RecordKind, queue: &mut Vec<Record>) {
        let cap = self.config.max_backlog;
        if queue.len() <= cap {
            return;
        }
        let excess = queue.len() - cap;
        queue.drain(..excess);
        let total = self.dropped.fetch_add(excess as u64, Ordering::Relaxed) + excess as u64;
        warn!(kind = %kind, dropped = excess, total_dropped = total, "record backlog full, dropped oldest");
    }

    /// True if the caller should start a size-triggered flush for `kind`.
    fn claim_size_flush(&self, kind: RecordKind) -> bool {
        self.size_flush.get(&kind).is_some_and(|flag| {
            flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    fn release_size_flush(&self, kind: RecordKind) {
        if let Some(flag) = self.size_flush.get(&kind) {
            flag.store(false, Ordering::Release);
        }
    }

    async fn flush_kind(&self, kind: RecordKind) -> Result<usize, PersistenceError> {
        let _flushing = self.flush_lock.lock().await;

        let batch = match self.queues().get_mut(&kind) {
            Some(queue) if !queue.is_empty() => std::mem::take(queue),
            _ => {
                self.release_size_flush(kind);
                return Ok(0);
            }
        };

        match self.store.write_batch(kind, &batch).await {
            Ok(()) => {
                debug!(kind = %kind, count = batch.len(), "flushed records");
                self.release_size_flush(kind);
                Ok(batch.len())
            }
            Err(e) => {
                warn!(kind = %kind, count = batch.len(), error = %e, "record flush failed, re-queued");
                let mut queues = self.queues();
                let queue = queues.entry(kind).or_default();
                let newer = std::mem::replace(queue, batch);
                queue.extend(newer);
                self.trim(kind, queue);
                Err(e)
            }
        }
    }

    async fn flush_all(&self) -> Result<usize, PersistenceError> {
        let mut flushed = 0;
        let mut first_error = None;
        for kind in RecordKind::ALL {
            match self.flush_kind(kind).await {
                Ok(n) => flushed += n,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(flushed),
        }
    }
}

/// Queueing [`PersistenceSink`] that writes to a [`RecordStore`] in batches.
///
/// Must be started inside a tokio runtime. Call [`BatchSink::shutdown`]
/// before exit to flush whatever is still queued.
pub struct BatchSink<R: RecordStore + 'static> {
    inner: Arc<SinkInner<R>>,
    shutdown_tx: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl<R: RecordStore + 'static> BatchSink<R> {
    /// Create the sink and start its background flush task.
    pub fn start(store: Arc<R>, config: BatchSinkConfig) -> Self {
        let inner = Arc::new(SinkInner {
            store,
            queues: Mutex::new(HashMap::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            size_flush: RecordKind::ALL
                .into_iter()
                .map(|kind| (kind, AtomicBool::new(false)))
                .collect(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            config,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = tokio::spawn(run_ticker(Arc::clone(&inner), shutdown_rx));

        Self {
            inner,
            shutdown_tx,
            ticker: Mutex::new(Some(ticker)),
        }
    }

    pub fn config(&self) -> &BatchSinkConfig {
        &self.inner.config
    }

    /// Backend the sink writes to.
    pub fn store(&self) -> &R {
        &self.inner.store
    }

    /// Records waiting to be written, across all kinds.
    pub fn queued(&self) -> usize {
        self.inner.queues().values().map(Vec::len).sum()
    }

    /// Records of one kind waiting to be written.
    pub fn queued_for(&self, kind: RecordKind) -> usize {
        self.inner.queues().get(&kind).map_or(0, Vec::len)
    }

    /// Records discarded because a backlog was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Write everything queued now.
    pub async fn flush(&self) -> Result<usize, PersistenceError> {
        self.inner.flush_all().await
    }

    /// Stop the background task, then flush what is left.
    ///
    /// Appends after shutdown fail with [`PersistenceError::SinkClosed`].
    pub async fn shutdown(&self) -> Result<usize, PersistenceError> {
        self.inner.closed.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = ticker {
            if let Err(e) = handle.await {
                warn!(error = %e, "record sink ticker ended abnormally");
            }
        }

        let flushed = self.inner.flush_all().await?;
        info!(flushed, "record sink shut down");
        Ok(flushed)
    }

    pub fn health_check(&self) -> HealthCheck {
        let queued = self.queued();
        let check = if self.is_closed() {
            HealthCheck::unhealthy("record_sink", "sink is closed")
        } else if queued >= self.inner.config.max_queue_size * RecordKind::ALL.len() {
            HealthCheck::degraded("record_sink", "record queues are full")
        } else {
            HealthCheck::healthy("record_sink")
        };
        check
            .with_metadata("queued", serde_json::json!(queued))
            .with_metadata("dropped", serde_json::json!(self.dropped()))
    }
}

#[async_trait]
impl<R: RecordStore + 'static> PersistenceSink for BatchSink<R> {
    async fn append(&self, record: Record) -> Result<(), PersistenceError> {
        if self.is_closed() {
            return Err(PersistenceError::SinkClosed);
        }

        let kind = record.kind;
        let full = {
            let mut queues = self.inner.queues();
            let queue = queues.entry(kind).or_default();
            queue.push(record);
            self.inner.trim(kind, queue);
            queue.len() >= self.inner.config.max_queue_size
        };

        if full && self.inner.claim_size_flush(kind) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                if let Err(e) = inner.flush_kind(kind).await {
                    warn!(kind = %kind, error = %e, "size-triggered flush failed, leaving backlog to the interval flush");
                }
            });
        }
        Ok(())
    }
}

async fn run_ticker<R: RecordStore>(inner: Arc<SinkInner<R>>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(inner.config.flush_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = inner.flush_all().await {
                    warn!(error = %e, "periodic record flush failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
