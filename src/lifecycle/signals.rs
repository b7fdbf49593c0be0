//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate signals into the shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Signals request graceful shutdown; in-flight requests drain

use crate::lifecycle::shutdown::Shutdown;

/// Wait for a termination signal, then trigger `shutdown`.
///
/// Resolves after Ctrl+C (SIGINT) or, on unix, SIGTERM has arrived and the
/// shutdown has been triggered. Intended to be spawned once at startup.
pub async fn listen_for_signals(shutdown: Shutdown) {
    wait_for_termination().await;
    tracing::info!("Termination signal received, shutting down");
    shutdown.trigger();
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.expect("Failed to install Ctrl+C handler");
        }
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
}
