//! Gate Engine - HTTP service around the A-share gate pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use chrono::{Duration, NaiveDate, Utc};
use gate_common::config::Config;
use gate_common::logging::init_logging_with_exclusions;
use gate_engine::{build_router, AppState, Orchestrator, Sentry};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// How often the sentry is checked for a new exchange-local date.
const SESSION_CHECK_SECS: u64 = 60;

/// Exchange-local (UTC+8) calendar date.
fn exchange_today() -> NaiveDate {
    (Utc::now() + Duration::hours(8)).date_naive()
}

/// Roll the sentry into each new session so a DAILY_HALT clears without a
/// manual `/api/v1/sentry/session` call.
async fn run_session_rollover(sentry: Arc<Sentry>) {
    let mut check_interval = tokio::time::interval(std::time::Duration::from_secs(SESSION_CHECK_SECS));
    loop {
        check_interval.tick().await;
        if let Err(e) = sentry.roll_forward(exchange_today()) {
            tracing::warn!(error = %e, "Session rollover skipped");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_with_env()?;
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Gate Engine v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("Invalid configuration")?;

    let session = exchange_today();
    let thresholds = config.thresholds.clone();
    let sentry = Arc::new(Sentry::new(thresholds.sentry.clone(), session));
    let orchestrator =
        Orchestrator::new(thresholds, Arc::clone(&sentry)).context("Failed to build orchestrator")?;
    tracing::info!(session = %session, "Sentry opened");
    tokio::spawn(run_session_rollover(sentry));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(AppState::new(orchestrator))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.network.body_limit_bytes))
        .layer(cors);

    let addr = config.bind_endpoint();

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
