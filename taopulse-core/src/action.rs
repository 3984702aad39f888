//! Action pipeline types: signals, scores, stake mutations, outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dividend::{DividendValue, QueryKey};
use crate::identity::{SubnetId, Timestamp};

// ============================================================================
// SIGNALS AND SCORES
// ============================================================================

/// One scorable item returned by a signal source (a tweet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalItem {
    pub text: String,
    pub created_at: Option<Timestamp>,
}

impl SignalItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Signed sentiment scalar. Only sign and magnitude carry meaning.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedScore(f64);

impl SignedScore {
    pub const NEUTRAL: SignedScore = SignedScore(0.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Direction implied by the sign. Zero and NaN imply no mutation.
    pub fn direction(&self) -> Option<Direction> {
        if self.0 > 0.0 {
            Some(Direction::Increase)
        } else if self.0 < 0.0 {
            Some(Direction::Decrease)
        } else {
            None
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.direction().is_none()
    }
}

impl From<i64> for SignedScore {
    fn from(value: i64) -> Self {
        Self(value as f64)
    }
}

impl fmt::Display for SignedScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// STAKE MUTATION
// ============================================================================

/// Direction of a stake adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stake adjustment request handed to the ledger mutator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeAdjustment {
    pub subnet_id: SubnetId,
    pub account: String,
    pub direction: Direction,
    pub amount: f64,
}

/// Result of an executed stake adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResult {
    pub subnet_id: SubnetId,
    pub account: String,
    pub direction: Direction,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    pub executed_at: Timestamp,
}

// ============================================================================
// STAGES AND OUTCOMES
// ============================================================================

/// Stages of the action pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStage {
    Signal,
    Score,
    Mutation,
    Persist,
}

impl ActionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::Score => "score",
            Self::Mutation => "mutation",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for ActionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// The score was exactly zero.
    Neutral,
}

/// Final status of one pipeline run, attached to the response as `trade`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ActionOutcome {
    Completed {
        score: SignedScore,
        mutation: MutationResult,
    },
    Skipped {
        stage: ActionStage,
        reason: SkipReason,
        score: SignedScore,
    },
    Failed {
        stage: ActionStage,
        error: String,
    },
}

impl ActionOutcome {
    pub fn failed(stage: ActionStage, error: impl fmt::Display) -> Self {
        Self::Failed {
            stage,
            error: error.to_string(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    /// Stage that failed, if any.
    pub fn failed_stage(&self) -> Option<ActionStage> {
        match self {
            Self::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

// ============================================================================
// ACTION CONTEXT
// ============================================================================

/// Working state of one pipeline run, filled in stage by stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    pub key: QueryKey,
    pub dividend: DividendValue,
    pub signals: Vec<SignalItem>,
    pub score: Option<SignedScore>,
    pub mutation: Option<MutationResult>,
}

impl ActionContext {
    pub fn new(key: QueryKey, dividend: DividendValue) -> Self {
        Self {
            key,
            dividend,
            signals: Vec::new(),
            score: None,
            mutation: None,
        }
    }
}
