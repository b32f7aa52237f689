//! Signal handling for graceful shutdown

use tracing::{debug, error, warn};

/// Handles shutdown signals (SIGTERM, SIGINT / Ctrl-C)
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal
    pub async fn wait(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            debug!("received SIGTERM");
                        }
                        _ = sigint.recv() => {
                            debug!("received SIGINT");
                        }
                    }
                    return;
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(?e, "failed to register signal handlers, falling back to ctrl-c");
                }
            }
        }

        match tokio::signal::ctrl_c().await {
            Ok(()) => debug!("received ctrl-c"),
            Err(e) => {
                error!(?e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
