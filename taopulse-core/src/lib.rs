//! TaoPulse Core - Shared Types
//!
//! Data structures, collaborator traits, and the error taxonomy shared by
//! every other crate. No I/O lives here.

pub mod action;
pub mod dividend;
pub mod error;
pub mod health;
pub mod identity;
pub mod providers;
pub mod record;

pub use action::{
    ActionContext, ActionOutcome, ActionStage, Direction, MutationResult, SignalItem,
    SignedScore, SkipReason, StakeAdjustment,
};
pub use dividend::{DividendQuery, DividendValue, QueryKey, ResponseEnvelope};
pub use error::{
    ConfigError, MutationError, PersistenceError, PulseResult, ScoreError, SignalError,
    TaoPulseError, UpstreamError,
};
pub use health::{HealthCheck, HealthStatus};
pub use identity::{
    new_record_id, DurationMs, RecordId, RequestId, SubnetId, Timestamp, REQUEST_ID_LEN,
};
pub use providers::{LedgerGateway, LedgerMutator, PersistenceSink, Scorer, SignalSource};
pub use record::{Record, RecordKind};
