//! Chutes HTTP client with rate limiting

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taopulse_core::ScoreError;
use tokio::sync::Semaphore;

use super::types::ApiError;
use crate::http::{client_with_timeout, elapsed_ms, join_url, parse_retry_after_ms};

pub(crate) const PROVIDER: &str = "chutes";

/// Chutes API client with rate limiting.
pub struct ChutesClient {
    client: Client,
    token: String,
    base_url: String,
    rate_limiter: Arc<Semaphore>,
    last_request: Arc<AtomicU64>,
    min_request_interval_ms: u64,
    start_time: Instant,
}

impl ChutesClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `token` - Chutes API token
    /// * `requests_per_minute` - Maximum requests per minute
    /// * `timeout` - Whole-request timeout
    pub fn new(token: impl Into<String>, requests_per_minute: u32, timeout: Duration) -> Self {
        let rpm = requests_per_minute.max(1);
        let min_interval_ms = (60_000 / u64::from(rpm)).max(10);

        Self {
            client: client_with_timeout(timeout),
            token: token.into(),
            base_url: "https://llm.chutes.ai/v1".to_string(),
            rate_limiter: Arc::new(Semaphore::new(rpm as usize)),
            last_request: Arc::new(AtomicU64::new(0)),
            min_request_interval_ms: min_interval_ms,
            start_time: Instant::now(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `endpoint` and decode the JSON response.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> Result<Res, ScoreError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| request_failed(0, format!("Rate limiter error: {e}")))?;

        // Enforce minimum interval between requests
        let now_ms = elapsed_ms(self.start_time);
        let last_ms = self.last_request.load(Ordering::Relaxed);
        let elapsed = now_ms.saturating_sub(last_ms);
        if last_ms > 0 && elapsed < self.min_request_interval_ms {
            let wait_ms = self.min_request_interval_ms - elapsed;
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
        self.last_request
            .store(elapsed_ms(self.start_time).max(1), Ordering::Relaxed);

        let started = Instant::now();
        let response = self
            .client
            .post(join_url(&self.base_url, endpoint))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScoreError::Timeout {
                        elapsed_ms: elapsed_ms(started),
                    }
                } else {
                    request_failed(0, format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);

        if status.is_success() {
            return response.json().await.map_err(|e| ScoreError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to parse response: {e}"),
            });
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let error_msg = match serde_json::from_str::<ApiError>(&error_text) {
            Ok(api_error) => api_error.error.message,
            Err(_) => error_text,
        };

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => ScoreError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after_ms,
            },
            _ => request_failed(status.as_u16(), error_msg),
        })
    }
}

fn request_failed(status: u16, message: String) -> ScoreError {
    ScoreError::RequestFailed {
        provider: PROVIDER.to_string(),
        status,
        message,
    }
}

impl std::fmt::Debug for ChutesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChutesClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
