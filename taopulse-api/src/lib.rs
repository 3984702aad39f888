//! TaoPulse API - HTTP Surface
//!
//! Axum router, environment configuration, telemetry, and the wiring that
//! turns configuration into a running orchestration engine.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult, ErrorCode, StartupError};
pub use routes::create_router;
pub use state::{AppState, Engine, RecordBackend};
pub use telemetry::{init_tracer, LogFormat, TelemetryConfig};
