//! Application entry point.
//!
//! Initializes tracing, loads configuration from a TOML file, constructs the
//! server with the router, opens it, and closes it with a bounded graceful
//! shutdown when the process is interrupted. Fatal errors exit non-zero.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workshop::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use workshop::http::{Server, ServerConfig};

/// Workshop: a self-hosting HTTP front-end
#[derive(Parser, Debug)]
#[command(name = "workshop", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "workshop=debug")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Priority: CLI > env > default
    let log_filter = args
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run(&args).await {
        tracing::error!(error = %err, "Fatal error");
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(&args.config)
        .map_err(|err| format!("cannot load config '{}': {err}", args.config))?;
    tracing::info!(path = %args.config, "Loaded configuration");

    // The host's routes go here; the server merges its diagnostic route and
    // the normalization layers on top.
    let router = axum::Router::new();

    let mut server = Server::new(ServerConfig::from(&config), router);
    server.open().await?;
    tracing::info!(url = %server.url(), "Server running");

    shutdown_signal().await;
    tracing::info!("Interrupt received, shutting down");
    server.close().await?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
