//! Abacus Binary Entry Point
//!
//! This binary runs the analytics pipeline behind a small HTTP server.
//! Core functionality is provided by the `abacus` library crate.

use std::net::SocketAddr;
use std::time::Duration;

use abacus::{
    config::{AppConfig, parse_duration},
    server::{AppState, create_router},
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Abacus - Self-hosted API request analytics
#[derive(Parser, Debug)]
#[command(name = "abacus", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, env = "ABACUS_CONFIG")]
    config: Option<String>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "ABACUS_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "ABACUS_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database file path (overrides config file)
    #[arg(long, env = "ABACUS_DB_PATH")]
    db_path: Option<String>,

    /// Flush interval, e.g. `30s` (overrides config file)
    #[arg(long, env = "ABACUS_FLUSH_INTERVAL", value_parser = parse_duration)]
    flush_interval: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,abacus=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Abacus - Self-hosted API request analytics");

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            AppConfig::default()
        }
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    if let Some(interval) = cli.flush_interval {
        config.analytics.flush_interval = interval;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {}",
        config.server.bind,
        config.server.port,
        config.database.connection_url(),
    );

    // A store that cannot be opened aborts startup
    let analytics = config.analytics_builder().build().await?;

    let app = create_router(AppState {
        recorder: analytics.recorder(),
        store: analytics.store(),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutting down analytics...");
    analytics.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
