//! Health Check Endpoints
//!
//! - /health - Liveness
//! - /health/ready - Record sink and cache state

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use taopulse_core::{HealthCheck, HealthStatus};
use taopulse_storage::CacheStats;

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub record_sink: HealthCheck,
    pub cache: HealthCheck,
    pub version: String,
    pub uptime_seconds: u64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health
pub async fn liveness() -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        details: None,
    })
}

/// GET /health/ready
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let record_sink = state.sink.health_check();
    let cache = cache_health(state.engine.cache_stats().await, state.engine.cache().inflight_count());
    let status = record_sink.status.worst(cache.status);

    let response = HealthResponse {
        status,
        details: Some(HealthDetails {
            record_sink,
            cache,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
        }),
    };

    let status_code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(response))
}

fn cache_health(stats: CacheStats, inflight: usize) -> HealthCheck {
    let stats_json = serde_json::to_value(&stats).unwrap_or_default();
    HealthCheck::healthy("dividend_cache")
        .with_metadata("stats", stats_json)
        .with_metadata("hit_rate", serde_json::json!(stats.hit_rate()))
        .with_metadata("inflight", serde_json::json!(inflight))
}
