//! Ledger sidecar stake client

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::{Duration, Instant};
use taopulse_core::{LedgerMutator, MutationError, MutationResult, StakeAdjustment};

use super::types::{StakeRequest, StakeResponse};
use crate::http::{client_with_timeout, elapsed_ms, error_body, join_url};

/// Submits stake adjustments to a ledger sidecar over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLedgerMutator {
    client: Client,
    base_url: String,
}

impl HttpLedgerMutator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: client_with_timeout(timeout),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LedgerMutator for HttpLedgerMutator {
    async fn adjust_stake(
        &self,
        adjustment: &StakeAdjustment,
    ) -> Result<MutationResult, MutationError> {
        let started = Instant::now();
        let body = StakeRequest {
            netuid: adjustment.subnet_id,
            hotkey: &adjustment.account,
            direction: adjustment.direction,
            amount: adjustment.amount,
        };

        let response = self
            .client
            .post(join_url(&self.base_url, "stake"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MutationError::Timeout {
                        elapsed_ms: elapsed_ms(started),
                    }
                } else {
                    MutationError::RequestFailed {
                        provider: "ledger".to_string(),
                        status: 0,
                        message: format!("HTTP request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(MutationError::Rejected {
                reason: format!("{}: {body}", status.as_u16()),
            });
        }

        let StakeResponse { tx_hash } =
            response
                .json()
                .await
                .map_err(|e| MutationError::RequestFailed {
                    provider: "ledger".to_string(),
                    status: status.as_u16(),
                    message: format!("Failed to parse response: {e}"),
                })?;

        tracing::info!(
            subnet_id = adjustment.subnet_id,
            direction = %adjustment.direction,
            amount = adjustment.amount,
            tx_hash = ?tx_hash,
            elapsed_ms = elapsed_ms(started),
            "stake adjusted"
        );

        Ok(MutationResult {
            subnet_id: adjustment.subnet_id,
            account: adjustment.account.clone(),
            direction: adjustment.direction,
            amount: adjustment.amount,
            tx_ref: tx_hash,
            executed_at: Utc::now(),
        })
    }
}
