//! Streaming HTTP forward proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!   Caller ──▶ axum router ─┬─▶ tunnel (optional, claims its own routes)
//!                           ├─▶ proxy routes ─▶ resolver ─▶ allow-list ─▶ dispatcher ──▶ Upstream
//!                           │     ◀── streamed response (hop-by-hop headers removed) ◀──┘
//!                           ├─▶ /health, /api, /metrics
//!                           └─▶ static files
//! ```
//!
//! Configuration comes from an optional TOML file overlaid with environment
//! variables (`PORT`, `REQUEST_TIMEOUT`, `WHITELIST`, `CORS_ORIGIN`, ...).

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use forward_proxy::config::load_config;
use forward_proxy::lifecycle::signals::forward_signals;
use forward_proxy::observability::logging;
use forward_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Streaming HTTP forward proxy", long_about = None)]
struct Cli {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    if cli.check {
        println!("Configuration OK");
        return Ok(());
    }

    logging::init(&config.observability);
    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_ms = config.upstream.request_timeout_ms,
        allow_list_entries = config.allow_list.len(),
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if let Err(error) = forward_signals(shutdown).await {
            tracing::error!(error = %error, "Signal handler failed");
        }
    });

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
