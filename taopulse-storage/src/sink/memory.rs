//! In-memory record store.

use async_trait::async_trait;
use dashmap::DashMap;
use taopulse_core::{PersistenceError, Record, RecordKind};

use super::RecordStore;

/// Keeps every written record in memory, grouped by kind.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: DashMap<RecordKind, Vec<Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record of a kind, oldest first.
    pub fn all(&self, kind: RecordKind) -> Vec<Record> {
        self.records
            .get(&kind)
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn write_batch(
        &self,
        kind: RecordKind,
        records: &[Record],
    ) -> Result<(), PersistenceError> {
        self.records
            .entry(kind)
            .or_default()
            .extend_from_slice(records);
        Ok(())
    }

    async fn count(&self, kind: RecordKind) -> Result<u64, PersistenceError> {
        Ok(self.records.get(&kind).map_or(0, |r| r.len() as u64))
    }

    async fn recent(&self, kind: RecordKind, limit: usize) -> Result<Vec<Record>, PersistenceError> {
        Ok(self
            .records
            .get(&kind)
            .map(|r| r.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
