//! TaoPulse Test Utilities
//!
//! Shared test infrastructure for the TaoPulse workspace:
//! - Scripted collaborators that count calls, delay, and fail on demand
//! - A recording persistence sink
//! - Proptest generators for core types
//! - Fixtures and assertions for common scenarios

pub use taopulse_core::{
    ActionOutcome, ActionStage, Direction, DividendValue, LedgerGateway, LedgerMutator,
    MutationError, MutationResult, PersistenceError, PersistenceSink, QueryKey, Record,
    RecordKind, RequestId, ScoreError, Scorer, SignalError, SignalItem, SignalSource,
    SignedScore, StakeAdjustment, SubnetId, Timestamp, UpstreamError,
};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

// ============================================================================
// SCRIPTED LEDGER GATEWAY
// ============================================================================

/// Ledger gateway double.
///
/// Returns a fixed value unless a failure is scripted. Queued failures are
/// consumed one per call before the standing behaviour applies.
#[derive(Debug)]
pub struct ScriptedGateway {
    value: Mutex<DividendValue>,
    standing_failure: Option<UpstreamError>,
    queued_failures: Mutex<VecDeque<UpstreamError>>,
    delay: Duration,
    calls: AtomicUsize,
    calls_by_key: Mutex<HashMap<QueryKey, usize>>,
}

impl ScriptedGateway {
    pub fn returning(value: DividendValue) -> Self {
        Self {
            value: Mutex::new(value),
            standing_failure: None,
            queued_failures: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            calls_by_key: Mutex::new(HashMap::new()),
        }
    }

    pub fn failing(error: UpstreamError) -> Self {
        Self {
            standing_failure: Some(error),
            ..Self::returning(DividendValue::new())
        }
    }

    /// Delay every call by `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next call with `error`.
    pub fn push_failure(&self, error: UpstreamError) {
        locked(&self.queued_failures).push_back(error);
    }

    pub fn set_value(&self, value: DividendValue) {
        *locked(&self.value) = value;
    }

    /// Total calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls observed for one key.
    pub fn calls_for(&self, key: &QueryKey) -> usize {
        locked(&self.calls_by_key).get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LedgerGateway for ScriptedGateway {
    async fn fetch_value(&self, key: &QueryKey) -> Result<DividendValue, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *locked(&self.calls_by_key).entry(key.clone()).or_insert(0) += 1;
        pause(self.delay).await;

        if let Some(error) = locked(&self.queued_failures).pop_front() {
            return Err(error);
        }
        if let Some(error) = &self.standing_failure {
            return Err(error.clone());
        }
        Ok(locked(&self.value).clone())
    }
}

// ============================================================================
// SCRIPTED ACTION COLLABORATORS
// ============================================================================

/// Signal source double.
#[derive(Debug)]
pub struct ScriptedSignalSource {
    result: Result<Vec<SignalItem>, SignalError>,
    delay: Duration,
    calls: AtomicUsize,
    subnets: Mutex<Vec<SubnetId>>,
}

impl ScriptedSignalSource {
    pub fn returning(items: Vec<SignalItem>) -> Self {
        Self {
            result: Ok(items),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            subnets: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: SignalError) -> Self {
        Self {
            result: Err(error),
            ..Self::returning(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Subnets searched, in call order.
    pub fn searched(&self) -> Vec<SubnetId> {
        locked(&self.subnets).clone()
    }
}

#[async_trait]
impl SignalSource for ScriptedSignalSource {
    async fn search(&self, subnet_id: SubnetId) -> Result<Vec<SignalItem>, SignalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.subnets).push(subnet_id);
        pause(self.delay).await;
        self.result.clone()
    }
}

/// Scorer double.
#[derive(Debug)]
pub struct ScriptedScorer {
    result: Result<SignedScore, ScoreError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn returning(score: impl Into<SignedScore>) -> Self {
        Self {
            result: Ok(score.into()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ScoreError) -> Self {
        Self {
            result: Err(error),
            ..Self::returning(SignedScore::NEUTRAL)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(&self, _items: &[SignalItem]) -> Result<SignedScore, ScoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        pause(self.delay).await;
        self.result.clone()
    }
}

/// Ledger mutator double. Records every adjustment it is asked to make.
#[derive(Debug)]
pub struct ScriptedMutator {
    failure: Option<MutationError>,
    delay: Duration,
    adjustments: Mutex<Vec<StakeAdjustment>>,
}

impl ScriptedMutator {
    /// A mutator that executes every adjustment.
    pub fn accepting() -> Self {
        Self {
            failure: None,
            delay: Duration::ZERO,
            adjustments: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: MutationError) -> Self {
        Self {
            failure: Some(error),
            ..Self::accepting()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        locked(&self.adjustments).len()
    }

    pub fn adjustments(&self) -> Vec<StakeAdjustment> {
        locked(&self.adjustments).clone()
    }
}

#[async_trait]
impl LedgerMutator for ScriptedMutator {
    async fn adjust_stake(
        &self,
        adjustment: &StakeAdjustment,
    ) -> Result<MutationResult, MutationError> {
        let sequence = {
            let mut adjustments = locked(&self.adjustments);
            adjustments.push(adjustment.clone());
            adjustments.len()
        };
        pause(self.delay).await;

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(fixtures::mutation_result(adjustment, format!("tx-{sequence}")))
    }
}

// ============================================================================
// RECORDING SINK
// ============================================================================

/// Persistence sink that keeps appended records in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Record>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every append.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<Record> {
        locked(&self.records).clone()
    }

    pub fn records_of(&self, kind: RecordKind) -> Vec<Record> {
        locked(&self.records)
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    /// Appends attempted, including rejected ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` records of `kind` arrived or `timeout`
    /// elapsed. Returns whatever is there at that point.
    pub async fn wait_for(&self, kind: RecordKind, count: usize, timeout: Duration) -> Vec<Record> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let records = self.records_of(kind);
            if records.len() >= count || tokio::time::Instant::now() >= deadline {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until `count` append attempts were made or `timeout` elapsed.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let attempts = self.attempts();
            if attempts >= count || tokio::time::Instant::now() >= deadline {
                return attempts;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    async fn append(&self, record: Record) -> Result<(), PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PersistenceError::WriteFailed {
                kind: record.kind.to_string(),
                count: 1,
                reason: "sink rejected record".to_string(),
            });
        }
        locked(&self.records).push(record);
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest generators for TaoPulse types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_subnet_id() -> impl Strategy<Value = SubnetId> {
        0u16..1024
    }

    /// SS58-looking account identifiers.
    pub fn arb_account() -> impl Strategy<Value = String> {
        "5[1-9A-HJ-NP-Za-km-z]{47}"
    }

    pub fn arb_query_key() -> impl Strategy<Value = QueryKey> {
        (arb_subnet_id(), proptest::option::of(arb_account()))
            .prop_map(|(subnet, account)| QueryKey::new(subnet, account))
    }

    pub fn arb_dividend_value() -> impl Strategy<Value = DividendValue> {
        proptest::collection::vec((arb_subnet_id(), arb_account(), any::<u64>()), 0..8).prop_map(
            |triples| {
                let mut value = DividendValue::new();
                for (subnet, account, amount) in triples {
                    value.insert(subnet, account, amount);
                }
                value
            },
        )
    }

    /// Finite scores across a wide range, including exact zero.
    pub fn arb_signed_score() -> impl Strategy<Value = SignedScore> {
        prop_oneof![
            Just(SignedScore::NEUTRAL),
            (-100i64..=100).prop_map(SignedScore::from),
            (-1.0e9f64..1.0e9).prop_map(SignedScore::new),
        ]
    }

    pub fn arb_signal_item() -> impl Strategy<Value = SignalItem> {
        "[a-zA-Z0-9 #@.]{1,140}".prop_map(SignalItem::new)
    }

    pub fn arb_direction() -> impl Strategy<Value = Direction> {
        prop_oneof![Just(Direction::Increase), Just(Direction::Decrease)]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values for common scenarios.

    use super::*;

    pub const SUBNET: SubnetId = 18;
    pub const ACCOUNT: &str = "5FFApaS75bv5pJHfAp2FVLBj9ZaXuFDjEypsaBNc1wCfe52v";

    pub fn query_key() -> QueryKey {
        QueryKey::account(SUBNET, ACCOUNT)
    }

    pub fn dividend() -> DividendValue {
        DividendValue::single(SUBNET, ACCOUNT, 1000)
    }

    pub fn signal_items(count: usize) -> Vec<SignalItem> {
        (0..count)
            .map(|i| SignalItem::new(format!("subnet {SUBNET} looks strong #{i}")))
            .collect()
    }

    pub fn record(kind: RecordKind) -> Record {
        record_with_duration(kind, 0)
    }

    pub fn record_with_duration(kind: RecordKind, duration_ms: i64) -> Record {
        Record::new(
            RequestId::from("0123456789ab"),
            kind,
            serde_json::json!({ "netuid": SUBNET }),
            duration_ms,
        )
    }

    pub fn mutation_result(adjustment: &StakeAdjustment, tx_ref: impl Into<String>) -> MutationResult {
        MutationResult {
            subnet_id: adjustment.subnet_id,
            account: adjustment.account.clone(),
            direction: adjustment.direction,
            amount: adjustment.amount,
            tx_ref: Some(tx_ref.into()),
            executed_at: Utc::now(),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for action outcomes.

    use super::*;

    /// Assert the outcome failed at `stage`.
    #[track_caller]
    pub fn assert_failed_at(outcome: &ActionOutcome, stage: ActionStage) {
        match outcome {
            ActionOutcome::Failed { stage: s, .. } => {
                assert_eq!(*s, stage, "failed at the wrong stage");
            }
            other => panic!("Expected failure at {stage}, got: {other:?}"),
        }
    }

    /// Assert the outcome completed with a mutation in `direction`.
    #[track_caller]
    pub fn assert_completed_with(outcome: &ActionOutcome, direction: Direction) {
        match outcome {
            ActionOutcome::Completed { mutation, .. } => {
                assert_eq!(mutation.direction, direction, "wrong mutation direction");
            }
            other => panic!("Expected completed outcome, got: {other:?}"),
        }
    }

    /// Assert an amount lies within `[0, max]`.
    #[track_caller]
    pub fn assert_amount_bounded(amount: f64, max: f64) {
        assert!(
            (0.0..=max).contains(&amount),
            "amount {amount} outside [0, {max}]"
        );
    }
}
