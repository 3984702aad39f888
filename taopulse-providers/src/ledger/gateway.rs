//! Ledger sidecar read client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use taopulse_core::{DividendValue, LedgerGateway, QueryKey, UpstreamError};

use super::types::DividendsResponse;
use crate::http::{client_with_timeout, elapsed_ms, error_body, join_url};

/// Reads dividends from a ledger sidecar over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLedgerGateway {
    client: Client,
    base_url: String,
}

impl HttpLedgerGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: client_with_timeout(timeout),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Value for an account the ledger does not know.
fn unknown_account(key: &QueryKey) -> DividendValue {
    match key.account.as_deref() {
        Some(account) => DividendValue::single(key.subnet_id, account, 0),
        None => DividendValue::empty_subnet(key.subnet_id),
    }
}

/// Client timeouts, including while the body is read, are `Timeout`.
fn transport_error(error: reqwest::Error, started: Instant, context: &str) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::Timeout {
            elapsed_ms: elapsed_ms(started),
        }
    } else {
        UpstreamError::unavailable(format!("{context}: {error}"))
    }
}

fn to_value(key: &QueryKey, body: DividendsResponse) -> DividendValue {
    if body.dividends.is_empty() {
        return unknown_account(key);
    }
    let mut value = DividendValue::new();
    for (account, amount) in body.dividends {
        value.insert(key.subnet_id, account, amount);
    }
    value
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn fetch_value(&self, key: &QueryKey) -> Result<DividendValue, UpstreamError> {
        let started = Instant::now();
        let url = join_url(
            &self.base_url,
            &format!("subnets/{}/dividends", key.subnet_id),
        );

        let mut request = self.client.get(url);
        if let Some(account) = key.account.as_deref() {
            request = request.query(&[("hotkey", account)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, started, "ledger request failed"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(key = %key, "account unknown to ledger");
            return Ok(unknown_account(key));
        }
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(UpstreamError::unavailable(format!(
                "ledger returned {}: {body}",
                status.as_u16()
            )));
        }

        let body: DividendsResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, started, "malformed ledger response"))?;

        tracing::debug!(key = %key, elapsed_ms = elapsed_ms(started), "ledger read");
        Ok(to_value(key, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_unknown_account_values() {
        assert_eq!(
            unknown_account(&QueryKey::account(18, "A")),
            DividendValue::single(18, "A", 0)
        );
        assert_eq!(
            unknown_account(&QueryKey::subnet(18)),
            DividendValue::empty_subnet(18)
        );
    }

    #[test]
    fn test_to_value_nests_under_subnet() {
        let mut dividends = BTreeMap::new();
        dividends.insert("A".to_string(), 10);
        dividends.insert("B".to_string(), 20);
        let value = to_value(&QueryKey::subnet(3), DividendsResponse { dividends });

        assert_eq!(value.amount(3, "A"), Some(10));
        assert_eq!(value.amount(3, "B"), Some(20));
        assert_eq!(value.total(), 30);
    }
}
