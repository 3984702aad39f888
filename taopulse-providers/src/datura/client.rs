//! Datura social search client

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use reqwest::Client;
use std::time::{Duration, Instant};
use taopulse_core::{SignalError, SignalItem, SignalSource, SubnetId};

use super::types::{SearchRequest, Tweet, SEARCH_DATE_FORMAT};
use crate::http::{client_with_timeout, elapsed_ms, error_body};

const PROVIDER: &str = "datura";

/// Configuration for the Datura search client.
#[derive(Clone)]
pub struct DaturaConfig {
    pub base_url: String,
    pub token: String,
    /// Maximum number of tweets requested and returned.
    pub count: usize,
    pub timeout: Duration,
}

impl DaturaConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: "https://apis.datura.ai/twitter".to_string(),
            token: token.into(),
            count: 10,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for DaturaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaturaConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("count", &self.count)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Signal source backed by the Datura tweet search API.
#[derive(Debug)]
pub struct DaturaSignalSource {
    client: Client,
    config: DaturaConfig,
}

impl DaturaSignalSource {
    pub fn new(config: DaturaConfig) -> Self {
        Self {
            client: client_with_timeout(config.timeout),
            config,
        }
    }

    /// Search body for one subnet. The window runs from seven days ago to
    /// tomorrow.
    pub fn search_request(&self, subnet_id: SubnetId) -> SearchRequest {
        let today = Utc::now();
        SearchRequest {
            query: format!("Bittensor netuid {subnet_id}"),
            blue_verified: false,
            end_date: (today + TimeDelta::days(1))
                .format(SEARCH_DATE_FORMAT)
                .to_string(),
            is_image: false,
            is_quote: false,
            is_video: false,
            lang: "en".to_string(),
            min_likes: 0,
            min_replies: 0,
            min_retweets: 0,
            sort: "Top".to_string(),
            start_date: (today - TimeDelta::days(7))
                .format(SEARCH_DATE_FORMAT)
                .to_string(),
            count: self.config.count,
        }
    }
}

#[async_trait]
impl SignalSource for DaturaSignalSource {
    async fn search(&self, subnet_id: SubnetId) -> Result<Vec<SignalItem>, SignalError> {
        let started = Instant::now();
        let body = self.search_request(subnet_id);

        let response = self
            .client
            .post(&self.config.base_url)
            .header("Authorization", self.config.token.as_str())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SignalError::Timeout {
                        elapsed_ms: elapsed_ms(started),
                    }
                } else {
                    SignalError::RequestFailed {
                        provider: PROVIDER.to_string(),
                        status: 0,
                        message: format!("HTTP request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignalError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message: error_body(response).await,
            });
        }

        let tweets: Vec<Tweet> = response.json().await.map_err(|e| SignalError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: format!("Failed to parse response: {e}"),
        })?;

        let items: Vec<SignalItem> = tweets
            .into_iter()
            .take(self.config.count)
            .map(Tweet::into_item)
            .collect();

        tracing::info!(
            subnet_id,
            count = items.len(),
            elapsed_ms = elapsed_ms(started),
            "fetched tweets"
        );
        Ok(items)
    }
}
