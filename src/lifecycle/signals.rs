//! OS signal handling.
//!
//! SIGINT / SIGTERM trigger graceful shutdown. Signals after the first are
//! logged and otherwise ignored.

use std::sync::Arc;

use crate::lifecycle::Shutdown;

/// Forward termination signals to `shutdown` until the process exits.
pub async fn forward_signals(shutdown: Arc<Shutdown>) -> std::io::Result<()> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        #[cfg(unix)]
        let signal = tokio::select! {
            res = tokio::signal::ctrl_c() => { res?; "SIGINT" }
            _ = terminate.recv() => "SIGTERM",
        };

        #[cfg(not(unix))]
        let signal = {
            tokio::signal::ctrl_c().await?;
            "ctrl-c"
        };

        if shutdown.trigger() {
            tracing::info!(signal, "Shutdown signal received");
        } else {
            tracing::info!(signal, "Shutdown already in progress");
        }
    }
}
