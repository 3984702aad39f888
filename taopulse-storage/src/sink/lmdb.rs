//! LMDB-backed record store.
//!
//! One named database per [`RecordKind`]. Keys are the record ids (UUIDv7,
//! so byte order is creation order) and values are JSON-encoded records.
//! LMDB calls are blocking and run on the blocking thread pool.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use taopulse_core::{PersistenceError, Record, RecordKind};

use super::RecordStore;

/// Error type for LMDB record store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Blocking task failed: {0}")]
    Join(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LmdbStoreError {
    fn into_persistence(self, kind: RecordKind, count: usize) -> PersistenceError {
        match self {
            Self::Serialization(reason) => PersistenceError::Serialization { reason },
            other => PersistenceError::WriteFailed {
                kind: kind.to_string(),
                count,
                reason: other.to_string(),
            },
        }
    }
}

type RecordDb = Database<Bytes, Bytes>;

/// Durable append-only record store on LMDB.
pub struct LmdbRecordStore {
    env: Env,
    dbs: HashMap<RecordKind, RecordDb>,
}

impl LmdbRecordStore {
    /// Open (or create) a store under `path` with a map size of `max_size_mb`.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(RecordKind::ALL.len() as u32)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let mut dbs = HashMap::new();
        for kind in RecordKind::ALL {
            let db: RecordDb = env
                .create_database(&mut wtxn, Some(kind.as_str()))
                .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
            dbs.insert(kind, db);
        }
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, dbs })
    }

    fn db(&self, kind: RecordKind) -> Result<RecordDb, LmdbStoreError> {
        self.dbs
            .get(&kind)
            .copied()
            .ok_or_else(|| LmdbStoreError::DbOpen(format!("no database for {kind}")))
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, LmdbStoreError>
    where
        T: Send + 'static,
        F: FnOnce(Env) -> Result<T, LmdbStoreError> + Send + 'static,
    {
        let env = self.env.clone();
        tokio::task::spawn_blocking(move || op(env))
            .await
            .map_err(|e| LmdbStoreError::Join(e.to_string()))?
    }

    async fn write_encoded(
        &self,
        kind: RecordKind,
        records: &[Record],
    ) -> Result<(), LmdbStoreError> {
        let encoded = records
            .iter()
            .map(|r| serde_json::to_vec(r).map(|bytes| (*r.id.as_bytes(), bytes)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
        let db = self.db(kind)?;

        self.blocking(move |env| {
            let mut wtxn = env
                .write_txn()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            for (key, value) in &encoded {
                db.put(&mut wtxn, &key[..], &value[..])
                    .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            }
            wtxn.commit()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
        })
        .await
    }
}

#[async_trait]
impl RecordStore for LmdbRecordStore {
    async fn write_batch(
        &self,
        kind: RecordKind,
        records: &[Record],
    ) -> Result<(), PersistenceError> {
        self.write_encoded(kind, records)
            .await
            .map_err(|e| e.into_persistence(kind, records.len()))
    }

    async fn count(&self, kind: RecordKind) -> Result<u64, PersistenceError> {
        let db = self.db(kind).map_err(|e| e.into_persistence(kind, 0))?;
        self.blocking(move |env| {
            let rtxn = env
                .read_txn()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            db.len(&rtxn)
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
        })
        .await
        .map_err(|e| e.into_persistence(kind, 0))
    }

    async fn recent(&self, kind: RecordKind, limit: usize) -> Result<Vec<Record>, PersistenceError> {
        let db = self.db(kind).map_err(|e| e.into_persistence(kind, 0))?;
        self.blocking(move |env| {
            let rtxn = env
                .read_txn()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            let iter = db
                .rev_iter(&rtxn)
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

            let mut records = Vec::new();
            for item in iter.take(limit) {
                let (_, value) = item.map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
                let record: Record = serde_json::from_slice(value)
                    .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
                records.push(record);
            }
            Ok(records)
        })
        .await
        .map_err(|e| e.into_persistence(kind, 0))
    }
}
