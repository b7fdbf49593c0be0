//! Round-robin load-balancing reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────┐
//!                      │                DISPATCHER                  │
//!                      │                                            │
//!     Client Request   │  ┌─────────┐      ┌───────────────┐       │
//!     ─────────────────┼─▶│  http   │─────▶│ load_balancer │───────┼──▶ Backend
//!                      │  │ server  │      │ pool + backend│       │    Server
//!     Client Response  │  └─────────┘      └───────────────┘       │
//!     ◀────────────────┼────── response relayed verbatim ◀─────────┼────
//!                      │                                            │
//!                      │  ┌──────────────────────────────────────┐ │
//!                      │  │         Cross-Cutting Concerns        │ │
//!                      │  │  ┌─────────┐      ┌───────────────┐  │ │
//!                      │  │  │ config  │      │   lifecycle   │  │ │
//!                      │  │  │fail fast│      │signals + drain│  │ │
//!                      │  │  └─────────┘      └───────────────┘  │ │
//!                      │  └──────────────────────────────────────┘ │
//!                      └───────────────────────────────────────────┘
//! ```
//!
//! Every inbound request selects the next healthy backend in rotation and
//! is forwarded to it exactly once; the response streams back to the
//! original caller.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use dispatch_proxy::config::load_config;
use dispatch_proxy::lifecycle::signals::listen_for_signals;
use dispatch_proxy::lifecycle::Shutdown;
use dispatch_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "dispatch-proxy")]
#[command(about = "Round-robin load-balancing reverse proxy", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "dispatch.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dispatch_proxy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("dispatch-proxy v0.1.0 starting");

    let config = load_config(&args.config)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    // Backend construction fails fast here, before any socket is bound.
    let server = HttpServer::new(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(listen_for_signals(shutdown));

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
