//! Stake sizing policy.

use taopulse_core::{SignedScore, StakeAdjustment, SubnetId};

/// Turns a sentiment score into a bounded stake adjustment.
///
/// The score's sign picks the direction and its magnitude scales the amount
/// by `stake_per_point`. The amount is always within `[0, max_amount]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePolicy {
    pub stake_per_point: f64,
    pub max_amount: f64,
}

impl Default for TradePolicy {
    fn default() -> Self {
        Self {
            stake_per_point: 0.01,
            max_amount: 1.0,
        }
    }
}

impl TradePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stake_per_point(mut self, stake_per_point: f64) -> Self {
        self.stake_per_point = stake_per_point;
        self
    }

    pub fn with_max_amount(mut self, max_amount: f64) -> Self {
        self.max_amount = max_amount;
        self
    }

    /// Upper bound actually applied. Never negative.
    pub fn ceiling(&self) -> f64 {
        if self.max_amount.is_nan() {
            0.0
        } else {
            self.max_amount.max(0.0)
        }
    }

    /// Amount for a score, clamped to `[0, ceiling]`.
    pub fn amount_for(&self, score: SignedScore) -> f64 {
        let raw = self.stake_per_point * score.value().abs();
        if raw.is_nan() {
            return 0.0;
        }
        raw.clamp(0.0, self.ceiling())
    }

    /// Adjustment for a score, or `None` when the score is neutral.
    pub fn decide(
        &self,
        subnet_id: SubnetId,
        account: &str,
        score: SignedScore,
    ) -> Option<StakeAdjustment> {
        let direction = score.direction()?;
        Some(StakeAdjustment {
            subnet_id,
            account: account.to_string(),
            direction,
            amount: self.amount_for(score),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use taopulse_core::Direction;
    use taopulse_test_utils::generators::{arb_account, arb_signed_score, arb_subnet_id};

    #[test]
    fn test_negative_score_decreases() {
        let policy = TradePolicy::default();
        let adjustment = policy
            .decide(18, "A", SignedScore::new(-5.0))
            .expect("non-neutral score");
        assert_eq!(adjustment.direction, Direction::Decrease);
        assert!((adjustment.amount - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_amount_is_capped() {
        let policy = TradePolicy::default().with_max_amount(0.3);
        assert!((policy.amount_for(SignedScore::new(100.0)) - 0.3).abs() < 1e-12);
        assert_eq!(policy.amount_for(SignedScore::new(f64::INFINITY)), 0.3);
    }

    #[test]
    fn test_neutral_score_has_no_adjustment() {
        let policy = TradePolicy::default();
        assert!(policy.decide(18, "A", SignedScore::NEUTRAL).is_none());
        assert!(policy.decide(18, "A", SignedScore::new(f64::NAN)).is_none());
    }

    #[test]
    fn test_degenerate_configuration_stays_in_bounds() {
        let negative_max = TradePolicy::default().with_max_amount(-2.0);
        assert_eq!(negative_max.amount_for(SignedScore::new(50.0)), 0.0);

        let nan_max = TradePolicy::default().with_max_amount(f64::NAN);
        assert_eq!(nan_max.amount_for(SignedScore::new(50.0)), 0.0);

        let negative_rate = TradePolicy::default().with_stake_per_point(-1.0);
        assert_eq!(negative_rate.amount_for(SignedScore::new(50.0)), 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Positive scores increase, negative scores decrease, zero does nothing.
        #[test]
        fn prop_direction_follows_sign(
            subnet in arb_subnet_id(),
            account in arb_account(),
            score in arb_signed_score(),
        ) {
            let decision = TradePolicy::default().decide(subnet, &account, score);
            let value = score.value();
            if value > 0.0 {
                prop_assert_eq!(decision.map(|d| d.direction), Some(Direction::Increase));
            } else if value < 0.0 {
                prop_assert_eq!(decision.map(|d| d.direction), Some(Direction::Decrease));
            } else {
                prop_assert!(decision.is_none());
            }
        }

        /// The amount never leaves [0, max] whatever the score or rate.
        #[test]
        fn prop_amount_bounded(
            score in arb_signed_score(),
            rate in -10.0f64..10.0,
            max in 0.0f64..100.0,
        ) {
            let policy = TradePolicy::new().with_stake_per_point(rate).with_max_amount(max);
            let amount = policy.amount_for(score);
            prop_assert!((0.0..=max).contains(&amount));
        }
    }
}
