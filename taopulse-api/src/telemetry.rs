//! Tracing Subscriber Initialization
//!
//! Installs a registry with an `EnvFilter` and a fmt layer. JSON output is
//! the default; `TAOPULSE_LOG_FORMAT=pretty` switches to human-readable
//! output for local runs.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILTER: &str = "taopulse_api=debug,tower_http=debug,info";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    /// Environment (production, staging, development)
    pub environment: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "taopulse-api".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("TAOPULSE_SERVICE_NAME").unwrap_or(defaults.service_name),
            service_version: defaults.service_version,
            environment: std::env::var("TAOPULSE_ENVIRONMENT").unwrap_or(defaults.environment),
            log_format: std::env::var("TAOPULSE_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(defaults.log_format),
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Call once at startup. A second call fails because a global subscriber
/// is already installed.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    installed
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        environment = config.environment,
        "Telemetry initialized"
    );
    Ok(())
}
