//! atlas-gateway - An authenticated gateway for geospatial tile datasets
//!
//! This is the main entry point for the atlas-gateway application.

use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use atlas_gateway::config::Config;
use atlas_gateway::otel::{init_tracing, GatewayMetrics, OtelProvider};
use atlas_gateway::server::{AppState, Server};

/// Interval between sweeps of expired tokens and rate-limit state
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// atlas-gateway - An authenticated gateway for geospatial tile datasets
#[derive(Parser, Debug)]
#[command(name = "atlas-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "ATLAS_GATEWAY_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting atlas-gateway");

    let metrics = GatewayMetrics::new(&otel_provider.meter());
    let server_config = config.server.clone();
    let state = AppState::from_config(config, metrics)?;

    let loaded = state.atlas.reload_all().await;
    info!(
        loaded,
        datasets = ?state.atlas.dataset_names(),
        auth_enabled = state.auth.is_enabled(),
        rate_limit_enabled = state.limiter.is_enabled(),
        "Gateway state initialized"
    );

    let sweeper = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                state.sweep();
            }
        })
    };

    #[cfg(unix)]
    let reloader = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
                Ok(hangup) => hangup,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGHUP handler");
                    return;
                }
            };
            while hangup.recv().await.is_some() {
                let loaded = state.atlas.reload_all().await;
                info!(loaded, "Atlas reload on SIGHUP");
            }
        })
    };

    let server = Server::new(server_config.clone(), state);

    info!(
        host = %server_config.host,
        port = %server_config.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    sweeper.abort();
    #[cfg(unix)]
    reloader.abort();

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("atlas-gateway shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Tracing is not initialized yet
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
