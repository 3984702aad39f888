//! Collaborator traits.
//!
//! The orchestration engine only talks to the outside world through these.
//! Concrete clients live in `taopulse-providers`; storage-backed sinks live
//! in `taopulse-storage`.

use async_trait::async_trait;

use crate::action::{MutationResult, SignalItem, SignedScore, StakeAdjustment};
use crate::dividend::{DividendValue, QueryKey};
use crate::error::{MutationError, PersistenceError, ScoreError, SignalError, UpstreamError};
use crate::identity::SubnetId;
use crate::record::Record;

/// Upstream ledger read access.
///
/// An unknown account is a valid result (zero or empty map), never an error.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn fetch_value(&self, key: &QueryKey) -> Result<DividendValue, UpstreamError>;
}

/// External signal search (social posts about a subnet).
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn search(&self, subnet_id: SubnetId) -> Result<Vec<SignalItem>, SignalError>;
}

/// Turns signal items into a signed score.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, items: &[SignalItem]) -> Result<SignedScore, ScoreError>;
}

/// Ledger-mutating stake operations.
#[async_trait]
pub trait LedgerMutator: Send + Sync {
    async fn adjust_stake(
        &self,
        adjustment: &StakeAdjustment,
    ) -> Result<MutationResult, MutationError>;
}

/// Append-only record sink. Callers treat failures as non-fatal.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn append(&self, record: Record) -> Result<(), PersistenceError>;
}
