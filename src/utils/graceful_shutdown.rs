use std::time::Duration;

use eyre::{Result, WrapErr};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Turns SIGINT / SIGTERM into a cancellation every part of the server can
/// observe. In-flight requests get `drain_timeout` to finish afterwards.
#[derive(Clone)]
pub struct GracefulShutdown {
    token: CancellationToken,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    /// Create a new GracefulShutdown manager with default 30-second drain timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(drain_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            drain_timeout,
        }
    }

    /// Token cancelled once shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Manually trigger shutdown (tests, embedding applications)
    pub fn trigger_shutdown(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown manually triggered");
            self.token.cancel();
        }
    }

    /// Resolve once shutdown has started, by signal or by hand.
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// Listen for OS signals until one arrives or shutdown is triggered.
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for SIGINT")?;
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            result = wait_for_sigterm() => {
                result?;
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = self.token.cancelled() => {
                return Ok(());
            }
        }

        self.token.cancel();
        Ok(())
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix systems, we only have Ctrl+C
    std::future::pending::<()>().await;
    Ok(())
}
