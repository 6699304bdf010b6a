//! PM Gateway - command-line front end for the request pipeline
//!
//! Fetches each endpoint given on the command line through the pipeline and
//! prints the JSON responses.

use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use serde_json::Value;
use tokio::signal;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pm_gateway::{Config, HttpTransport, Pipeline, RequestDescriptor};

/// Main entry point for the PM Gateway CLI.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the HTTP transport and the pipeline
/// 4. Fetch every endpoint argument concurrently, each on its own task
/// 5. Drain the pipeline; on SIGINT/SIGTERM queued fetches are dropped while
///    executing ones run to completion
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pm_gateway=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PM Gateway");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    if config.transport.base_url.is_empty() {
        anyhow::bail!("PM_API_BASE_URL must be set");
    }
    info!(
        "Configuration loaded: base_url={}, max_concurrent={}, reservoir={}/{} every {:?}",
        config.transport.base_url,
        config.limiter.max_concurrent,
        config.limiter.refill_amount,
        config.limiter.reservoir_ceiling,
        config.limiter.refill_interval
    );

    let transport = Arc::new(HttpTransport::from_config(&config.transport));
    let pipeline = Pipeline::from_config(&config, transport).context("failed to build pipeline")?;

    let endpoints: Vec<String> = std::env::args().skip(1).collect();
    if endpoints.is_empty() {
        warn!("No endpoints given; nothing to fetch");
    }

    // Each fetch runs on its own task so a signal never cancels a call in flight
    let handles: Vec<_> = endpoints
        .iter()
        .map(|endpoint| pipeline.spawn(RequestDescriptor::get(endpoint.as_str())))
        .collect();
    let fetches = join_all(handles);
    tokio::pin!(fetches);

    let interrupted = tokio::select! {
        results = &mut fetches => {
            report(&endpoints, results)?;
            false
        }
        _ = shutdown_signal() => true,
    };

    if interrupted {
        // Queued fetches fail with LimiterStopped; executing ones finish
        pipeline.shutdown(true).await;
        report(&endpoints, fetches.await)?;
    }

    let stats = pipeline.stats();
    info!(
        total = stats.total_requests,
        succeeded = stats.successful_requests,
        failed = stats.failed_requests,
        cache_hits = stats.cache_hits,
        avg_ms = stats.average_response_time_ms,
        "Request statistics"
    );

    if !interrupted {
        pipeline.shutdown(false).await;
    }
    info!("PM Gateway shutdown complete");
    Ok(())
}

/// Prints each successful response and logs each failure.
fn report(
    endpoints: &[String],
    results: Vec<Result<pm_gateway::Result<Value>, JoinError>>,
) -> anyhow::Result<()> {
    for (endpoint, joined) in endpoints.iter().zip(results) {
        match joined.context("fetch task panicked")? {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(err) => error!(endpoint = %endpoint, "Fetch failed: {}", err),
        }
    }
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
