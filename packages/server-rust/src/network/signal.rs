//! Shutdown triggers.

use std::fmt;

use tracing::{error, info};

/// Why an instance started shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// `ShutdownController::trigger_shutdown` or an injected trigger.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminate",
            Self::Requested => "requested",
        })
    }
}

/// Waits for SIGINT or SIGTERM (Ctrl+C only on non-unix platforms).
///
/// A handler that cannot be installed is logged and never fires.
pub async fn os_signal() -> ShutdownReason {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        () = interrupt => ShutdownReason::Interrupt,
        () = terminate => ShutdownReason::Terminate,
    };
    info!(%reason, "shutdown signal received");
    reason
}
