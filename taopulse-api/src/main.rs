//! TaoPulse API Server Entry Point
//!
//! Loads configuration, wires the collaborators, and serves until ctrl-c.
//! Queued records are flushed after the server stops accepting requests.

use taopulse_api::{
    create_router, init_tracer, AppConfig, AppState, StartupError, TelemetryConfig,
};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracer(&telemetry_config)?;

    let config = AppConfig::from_env();
    config.validate()?;
    let addr = config.bind_addr()?;

    let state = AppState::build(&config)?;
    let app = create_router(state.clone(), &config);

    tracing::info!(%addr, "Starting TaoPulse API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match state.sink.shutdown().await {
        Ok(flushed) => tracing::info!(flushed, "Records flushed"),
        Err(e) => tracing::warn!(error = %e, "Final record flush failed"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
