//! Helpers shared by the HTTP clients.

use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use std::time::{Duration, Instant};

/// Build a reqwest client with a whole-request timeout.
pub(crate) fn client_with_timeout(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            Client::new()
        })
}

/// Milliseconds since `started`, saturating.
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Body of a failed response, for error messages.
pub(crate) async fn error_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
pub(crate) fn parse_retry_after_ms(headers: &HeaderMap) -> Option<i64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as i64)
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
