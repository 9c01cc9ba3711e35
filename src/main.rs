//! jk-balancer
//!
//! A reverse proxy that spreads requests over weighted backend groups,
//! keeps sessions on the backend that created them, and fails over when a
//! backend stops answering.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────▶ http server ──▶ routing ──▶ load_balancer ──▶ transport ──▶ Backend
//!                (request id)   (mounts)    (sticky/local/     (hyper
//!                                            weighted, retry)   client)
//!
//!     Cross-cutting: config (TOML), observability (tracing, metrics),
//!                    lifecycle (signals, graceful shutdown)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use jk_balancer::config::{load_config, ProxyConfig};
use jk_balancer::lifecycle::{signals, Shutdown};
use jk_balancer::observability::{logging, metrics};
use jk_balancer::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "jk-balancer", version, about = "Sticky-session HTTP load balancer")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("jk-balancer v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        balancers = config.balancers.len(),
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        total_timeout_secs = config.timeouts.total_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::wait_for_signal(shutdown.clone()));

    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
