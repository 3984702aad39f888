//! Ledger sidecar wire types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use taopulse_core::{Direction, SubnetId};

/// Body of `GET /subnets/{netuid}/dividends`.
#[derive(Debug, Clone, Deserialize)]
pub struct DividendsResponse {
    #[serde(default)]
    pub dividends: BTreeMap<String, u64>,
}

/// Body of `POST /stake`.
#[derive(Debug, Clone, Serialize)]
pub struct StakeRequest<'a> {
    pub netuid: SubnetId,
    pub hotkey: &'a str,
    pub direction: Direction,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StakeResponse {
    #[serde(default)]
    pub tx_hash: Option<String>,
}
