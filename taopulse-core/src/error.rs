//! Error types for TaoPulse operations

use thiserror::Error;

/// Upstream ledger errors. These fail the whole query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Upstream ledger unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Upstream ledger timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl UpstreamError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Signal source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Signal search timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Scorer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("No tweets to analyze")]
    NoItems,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Could not extract a score: {reason}")]
    Unparseable { reason: String },

    #[error("Scoring timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Ledger mutation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("No account available for stake adjustment")]
    MissingAccount,

    #[error("Stake adjustment rejected: {reason}")]
    Rejected { reason: String },

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Stake adjustment timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Persistence errors. Logged, never surfaced to callers of a query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Write of {count} {kind} records failed: {reason}")]
    WriteFailed {
        kind: String,
        count: usize,
        reason: String,
    },

    #[error("Record serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Persistence sink is closed")]
    SinkClosed,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all TaoPulse errors.
#[derive(Debug, Clone, Error)]
pub enum TaoPulseError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("Score error: {0}")]
    Score(#[from] ScoreError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for TaoPulse operations.
pub type PulseResult<T> = Result<T, TaoPulseError>;

// =============================================================================
// TESTS
// =============================================================================
