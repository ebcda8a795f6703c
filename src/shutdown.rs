use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Installs SIGTERM/SIGINT handlers and returns a `CancellationToken`
/// that trips when either signal arrives. The accept loop and the run
/// loop both watch this token to drain gracefully.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trip = token.clone();

    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, shutting down");
            }
            _ = sigint.recv() => {
                tracing::info!("SIGINT received, shutting down");
            }
        }

        trip.cancel();
    });

    token
}
