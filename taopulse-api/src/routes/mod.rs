//! REST API Routes
//!
//! - `GET /api/v1/tao_dividends` - dividend query with optional trade
//! - `GET /health`, `GET /health/ready` - health checks

pub mod dividends;
pub mod health;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::state::AppState;

/// Build the service router with CORS and request tracing.
pub fn create_router(state: AppState, config: &AppConfig) -> Router {
    let api_routes = Router::new().route("/tao_dividends", get(dividends::get_dividends));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
}

fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .max_age(Duration::from_secs(86400));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any).allow_headers(Any).expose_headers(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricted origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .expose_headers([header::HeaderName::from_static("x-request-id")])
    }
}
