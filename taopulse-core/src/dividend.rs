//! Dividend query types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::action::ActionOutcome;
use crate::identity::{SubnetId, Timestamp};

// ============================================================================
// QUERY KEY
// ============================================================================

/// Cache and deduplication key for one dividend lookup.
///
/// `account == None` asks for every account of the subnet and is a distinct
/// key from any single-account lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    pub subnet_id: SubnetId,
    pub account: Option<String>,
}

impl QueryKey {
    pub fn new(subnet_id: SubnetId, account: Option<String>) -> Self {
        Self {
            subnet_id,
            account: account.filter(|a| !a.trim().is_empty()),
        }
    }

    /// Key for a single account.
    pub fn account(subnet_id: SubnetId, account: impl Into<String>) -> Self {
        Self::new(subnet_id, Some(account.into()))
    }

    /// Key for every account of a subnet.
    pub fn subnet(subnet_id: SubnetId) -> Self {
        Self {
            subnet_id,
            account: None,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account {
            Some(account) => write!(f, "{}_{}", self.subnet_id, account),
            None => write!(f, "{}_*", self.subnet_id),
        }
    }
}

// ============================================================================
// DIVIDEND VALUE
// ============================================================================

/// Dividends per account, per subnet.
///
/// Serializes as `{"18": {"5F...": 1000}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DividendValue(BTreeMap<SubnetId, BTreeMap<String, u64>>);

impl DividendValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A value holding exactly one (subnet, account, amount) triple.
    pub fn single(subnet_id: SubnetId, account: impl Into<String>, amount: u64) -> Self {
        let mut value = Self::new();
        value.insert(subnet_id, account, amount);
        value
    }

    /// A value holding an empty account map for the subnet.
    pub fn empty_subnet(subnet_id: SubnetId) -> Self {
        let mut map = BTreeMap::new();
        map.insert(subnet_id, BTreeMap::new());
        Self(map)
    }

    pub fn insert(&mut self, subnet_id: SubnetId, account: impl Into<String>, amount: u64) {
        self.0
            .entry(subnet_id)
            .or_default()
            .insert(account.into(), amount);
    }

    pub fn subnet(&self, subnet_id: SubnetId) -> Option<&BTreeMap<String, u64>> {
        self.0.get(&subnet_id)
    }

    pub fn amount(&self, subnet_id: SubnetId, account: &str) -> Option<u64> {
        self.0.get(&subnet_id).and_then(|m| m.get(account)).copied()
    }

    pub fn subnets(&self) -> impl Iterator<Item = SubnetId> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    /// Sum of every amount, saturating.
    pub fn total(&self) -> u64 {
        self.0
            .values()
            .flat_map(BTreeMap::values)
            .fold(0u64, |acc, v| acc.saturating_add(*v))
    }
}

impl From<BTreeMap<SubnetId, BTreeMap<String, u64>>> for DividendValue {
    fn from(map: BTreeMap<SubnetId, BTreeMap<String, u64>>) -> Self {
        Self(map)
    }
}

// ============================================================================
// INBOUND QUERY AND RESPONSE
// ============================================================================

/// Inbound dividend query, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendQuery {
    pub subnet_id: Option<SubnetId>,
    pub account: Option<String>,
    pub trigger_action: bool,
}

/// Response to a dividend query.
///
/// `trade` is `null` unless the action pipeline was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub dividends: DividendValue,
    pub cached: bool,
    pub collected_at: Timestamp,
    pub trade: Option<ActionOutcome>,
}
