//! Deterministic collaborators for local runs without external services.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use taopulse_core::{
    DividendValue, LedgerGateway, LedgerMutator, MutationError, MutationResult, QueryKey,
    ScoreError, Scorer, SignalError, SignalItem, SignalSource, SignedScore, StakeAdjustment,
    SubnetId, UpstreamError,
};

use crate::sentiment::{clean_items, SCORE_MAX, SCORE_MIN};

// ============================================================================
// SIGNALS
// ============================================================================

/// Signal source returning `count` copies of one fixed text.
#[derive(Debug, Clone)]
pub struct MockSignalSource {
    text: String,
    count: usize,
}

impl MockSignalSource {
    pub fn new(count: usize) -> Self {
        Self {
            text: "this is good".to_string(),
            count,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

impl Default for MockSignalSource {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl SignalSource for MockSignalSource {
    async fn search(&self, _subnet_id: SubnetId) -> Result<Vec<SignalItem>, SignalError> {
        let now = Utc::now();
        Ok((0..self.count)
            .map(|_| SignalItem::new(self.text.clone()).with_created_at(now))
            .collect())
    }
}

// ============================================================================
// SCORING
// ============================================================================

const POSITIVE: &[&str] = &["good", "great", "bullish", "strong", "up", "love", "moon"];
const NEGATIVE: &[&str] = &["bad", "bearish", "weak", "down", "scam", "dump", "hate"];

/// Scorer that either returns a fixed score or counts polarity keywords.
#[derive(Debug, Clone)]
pub enum MockScorer {
    Fixed(SignedScore),
    Keywords,
}

impl MockScorer {
    /// Each cleaned item counts +1 or -1 by its keyword balance; the mean is
    /// scaled to the score range.
    fn keyword_score(items: &[SignalItem]) -> Result<SignedScore, ScoreError> {
        let texts = clean_items(items);
        if texts.is_empty() {
            return Err(ScoreError::NoItems);
        }

        let total: i64 = texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let words: Vec<&str> = lower
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .collect();
                let pos = words.iter().filter(|w| POSITIVE.contains(*w)).count() as i64;
                let neg = words.iter().filter(|w| NEGATIVE.contains(*w)).count() as i64;
                (pos - neg).signum()
            })
            .sum();

        let score = (total * SCORE_MAX) / texts.len() as i64;
        Ok(SignedScore::from(score.clamp(SCORE_MIN, SCORE_MAX)))
    }
}

#[async_trait]
impl Scorer for MockScorer {
    async fn score(&self, items: &[SignalItem]) -> Result<SignedScore, ScoreError> {
        match self {
            Self::Fixed(score) => {
                if items.is_empty() {
                    Err(ScoreError::NoItems)
                } else {
                    Ok(*score)
                }
            }
            Self::Keywords => Self::keyword_score(items),
        }
    }
}

// ============================================================================
// LEDGER
// ============================================================================

/// In-memory ledger seeded with dividends. Reads come from the seed and
/// stake adjustments are recorded.
#[derive(Debug, Default)]
pub struct MockLedger {
    dividends: RwLock<DividendValue>,
    adjustments: RwLock<Vec<StakeAdjustment>>,
    tx_counter: AtomicU64,
}

impl MockLedger {
    pub fn seeded(dividends: DividendValue) -> Self {
        Self {
            dividends: RwLock::new(dividends),
            ..Self::default()
        }
    }

    pub fn set_dividend(&self, subnet_id: SubnetId, account: &str, amount: u64) {
        self.dividends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subnet_id, account, amount);
    }

    pub fn adjustments(&self) -> Vec<StakeAdjustment> {
        self.adjustments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn fetch_value(&self, key: &QueryKey) -> Result<DividendValue, UpstreamError> {
        let dividends = self.dividends.read().unwrap_or_else(PoisonError::into_inner);
        let value = match key.account.as_deref() {
            Some(account) => DividendValue::single(
                key.subnet_id,
                account,
                dividends.amount(key.subnet_id, account).unwrap_or(0),
            ),
            None => {
                let mut value = DividendValue::empty_subnet(key.subnet_id);
                for (account, amount) in dividends.subnet(key.subnet_id).into_iter().flatten() {
                    value.insert(key.subnet_id, account.clone(), *amount);
                }
                value
            }
        };
        Ok(value)
    }
}

#[async_trait]
impl LedgerMutator for MockLedger {
    async fn adjust_stake(
        &self,
        adjustment: &StakeAdjustment,
    ) -> Result<MutationResult, MutationError> {
        if !adjustment.amount.is_finite() || adjustment.amount < 0.0 {
            return Err(MutationError::Rejected {
                reason: format!("invalid amount {}", adjustment.amount),
            });
        }

        self.adjustments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(adjustment.clone());
        let tx = self.tx_counter.fetch_add(1, Ordering::Relaxed) + 1;

        Ok(MutationResult {
            subnet_id: adjustment.subnet_id,
            account: adjustment.account.clone(),
            direction: adjustment.direction,
            amount: adjustment.amount,
            tx_ref: Some(format!("mock-{tx}")),
            executed_at: Utc::now(),
        })
    }
}
