//! Sentiment-driven action pipeline.
//!
//! One run walks the stages in order: signal retrieval, scoring, stake
//! mutation. Each stage either hands over to the next or halts the run with
//! an outcome. Whatever the exit path, the context reached so far and the
//! outcome are persisted as one `action` record, off the caller's path.
//!
//! A run executes on its own task. Dropping the caller's future does not
//! cancel it, so a submitted stake adjustment is always recorded.
//!
//! The pipeline never returns an error. Collaborator failures and stage
//! timeouts become `ActionOutcome::Failed` tagged with the stage.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use taopulse_core::{
    ActionContext, ActionOutcome, ActionStage, DividendValue, LedgerMutator, MutationError,
    PersistenceSink, QueryKey, Record, RecordKind, RequestId, ScoreError, Scorer, SignalError,
    SignalSource, SignedScore, SkipReason,
};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::persist::{elapsed_ms, spawn_append};
use crate::policy::TradePolicy;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Per-stage time budgets. Exceeding one fails that stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTimeouts {
    pub signal: Duration,
    pub score: Duration,
    pub mutation: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            signal: Duration::from_secs(15),
            score: Duration::from_secs(30),
            mutation: Duration::from_secs(30),
        }
    }
}

impl StageTimeouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(mut self, timeout: Duration) -> Self {
        self.signal = timeout;
        self
    }

    pub fn with_score(mut self, timeout: Duration) -> Self {
        self.score = timeout;
        self
    }

    pub fn with_mutation(mut self, timeout: Duration) -> Self {
        self.mutation = timeout;
        self
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Result of one stage.
enum StageResult {
    /// Hand over to the next stage.
    Continue,
    /// Stop here with this outcome.
    Halt(ActionOutcome),
}

/// Payload of the `action` record written at the end of every run.
#[derive(Serialize)]
struct ActionSnapshot<'a> {
    context: &'a ActionContext,
    outcome: &'a ActionOutcome,
}

/// Runs the signal, score, and mutation stages for one dividend read.
#[derive(Clone)]
pub struct ActionPipeline {
    signals: Arc<dyn SignalSource>,
    scorer: Arc<dyn Scorer>,
    mutator: Arc<dyn LedgerMutator>,
    sink: Arc<dyn PersistenceSink>,
    policy: TradePolicy,
    timeouts: StageTimeouts,
    default_account: Option<String>,
}

impl ActionPipeline {
    pub fn new(
        signals: Arc<dyn SignalSource>,
        scorer: Arc<dyn Scorer>,
        mutator: Arc<dyn LedgerMutator>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            signals,
            scorer,
            mutator,
            sink,
            policy: TradePolicy::default(),
            timeouts: StageTimeouts::default(),
            default_account: None,
        }
    }

    pub fn with_policy(mut self, policy: TradePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Account adjusted when the query key names none.
    pub fn with_default_account(mut self, account: impl Into<String>) -> Self {
        self.default_account = Some(account.into());
        self
    }

    pub fn policy(&self) -> &TradePolicy {
        &self.policy
    }

    pub fn timeouts(&self) -> &StageTimeouts {
        &self.timeouts
    }

    pub fn default_account(&self) -> Option<&str> {
        self.default_account.as_deref()
    }

    /// Run the pipeline under a fresh request id.
    pub async fn run(&self, key: &QueryKey, dividend: DividendValue) -> ActionOutcome {
        self.run_for(RequestId::generate(), key, dividend).await
    }

    /// Run the pipeline on behalf of `request_id`.
    pub async fn run_for(
        &self,
        request_id: RequestId,
        key: &QueryKey,
        dividend: DividendValue,
    ) -> ActionOutcome {
        let span = info_span!(
            "action_pipeline",
            request_id = %request_id,
            subnet_id = key.subnet_id,
            account = ?key.account,
        );

        let pipeline = self.clone();
        let key = key.clone();
        let task = tokio::spawn(
            async move { pipeline.run_detached(request_id, key, dividend).await }.instrument(span),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(error = %error, "action pipeline task ended abnormally");
                ActionOutcome::failed(
                    ActionStage::Persist,
                    format!("action task ended abnormally: {error}"),
                )
            }
        }
    }

    async fn run_detached(
        &self,
        request_id: RequestId,
        key: QueryKey,
        dividend: DividendValue,
    ) -> ActionOutcome {
        let started = Instant::now();
        let mut context = ActionContext::new(key, dividend);
        let outcome = self.execute(&mut context).await;
        let duration_ms = elapsed_ms(started);

        match &outcome {
            ActionOutcome::Failed { stage, error } => {
                warn!(stage = %stage, error = %error, duration_ms, "action pipeline failed");
            }
            other => {
                info!(status = other.status(), duration_ms, "action pipeline finished");
            }
        }

        self.persist(request_id, &context, &outcome, duration_ms);
        outcome
    }

    /// Signal, score, and mutation in order; the first halt ends the run.
    async fn execute(&self, context: &mut ActionContext) -> ActionOutcome {
        if let StageResult::Halt(outcome) = self.retrieve_signals(context).await {
            return outcome;
        }
        if let StageResult::Halt(outcome) = self.score_signals(context).await {
            return outcome;
        }
        if let StageResult::Halt(outcome) = self.adjust_stake(context).await {
            return outcome;
        }

        match (context.score, context.mutation.clone()) {
            (Some(score), Some(mutation)) => ActionOutcome::Completed { score, mutation },
            _ => ActionOutcome::failed(ActionStage::Mutation, "no mutation was recorded"),
        }
    }

    async fn retrieve_signals(&self, context: &mut ActionContext) -> StageResult {
        let started = Instant::now();
        let searched = tokio::time::timeout(
            self.timeouts.signal,
            self.signals.search(context.key.subnet_id),
        )
        .await
        .unwrap_or_else(|_| {
            Err(SignalError::Timeout {
                elapsed_ms: elapsed_ms(started) as u64,
            })
        });

        match searched {
            Ok(items) => {
                debug!(count = items.len(), elapsed_ms = elapsed_ms(started), "signals retrieved");
                context.signals = items;
                StageResult::Continue
            }
            Err(error) => StageResult::Halt(ActionOutcome::failed(ActionStage::Signal, error)),
        }
    }

    async fn score_signals(&self, context: &mut ActionContext) -> StageResult {
        let started = Instant::now();
        let scored = tokio::time::timeout(self.timeouts.score, self.scorer.score(&context.signals))
            .await
            .unwrap_or_else(|_| {
                Err(ScoreError::Timeout {
                    elapsed_ms: elapsed_ms(started) as u64,
                })
            });

        match scored {
            Ok(score) => {
                // NaN carries no direction.
                let score = if score.value().is_nan() {
                    SignedScore::NEUTRAL
                } else {
                    score
                };
                debug!(score = score.value(), elapsed_ms = elapsed_ms(started), "signals scored");
                context.score = Some(score);
                StageResult::Continue
            }
            Err(error) => StageResult::Halt(ActionOutcome::failed(ActionStage::Score, error)),
        }
    }

    async fn adjust_stake(&self, context: &mut ActionContext) -> StageResult {
        let score = context.score.unwrap_or(SignedScore::NEUTRAL);
        if score.is_neutral() {
            return StageResult::Halt(ActionOutcome::Skipped {
                stage: ActionStage::Mutation,
                reason: SkipReason::Neutral,
                score,
            });
        }

        let Some(account) = context
            .key
            .account
            .clone()
            .or_else(|| self.default_account.clone())
        else {
            return StageResult::Halt(ActionOutcome::failed(
                ActionStage::Mutation,
                MutationError::MissingAccount,
            ));
        };

        let Some(adjustment) = self.policy.decide(context.key.subnet_id, &account, score) else {
            return StageResult::Halt(ActionOutcome::Skipped {
                stage: ActionStage::Mutation,
                reason: SkipReason::Neutral,
                score,
            });
        };

        let started = Instant::now();
        let adjusted = tokio::time::timeout(
            self.timeouts.mutation,
            self.mutator.adjust_stake(&adjustment),
        )
        .await
        .unwrap_or_else(|_| {
            Err(MutationError::Timeout {
                elapsed_ms: elapsed_ms(started) as u64,
            })
        });

        match adjusted {
            Ok(result) => {
                info!(
                    direction = %result.direction,
                    amount = result.amount,
                    tx_ref = ?result.tx_ref,
                    elapsed_ms = elapsed_ms(started),
                    "stake adjusted"
                );
                context.mutation = Some(result);
                StageResult::Continue
            }
            Err(error) => StageResult::Halt(ActionOutcome::failed(ActionStage::Mutation, error)),
        }
    }

    fn persist(
        &self,
        request_id: RequestId,
        context: &ActionContext,
        outcome: &ActionOutcome,
        duration_ms: i64,
    ) {
        let snapshot = ActionSnapshot { context, outcome };
        match Record::from_payload(request_id, RecordKind::Action, &snapshot, duration_ms) {
            Ok(record) => spawn_append(Arc::clone(&self.sink), record),
            Err(error) => warn!(error = %error, "could not build action record"),
        }
    }
}

impl std::fmt::Debug for ActionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionPipeline")
            .field("policy", &self.policy)
            .field("timeouts", &self.timeouts)
            .field("default_account", &self.default_account)
            .finish_non_exhaustive()
    }
}
