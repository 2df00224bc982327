use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancel the returned token on SIGTERM or SIGINT.
///
/// The dispatch worker and the admin API both watch this token. If a
/// signal handler cannot be installed the process keeps running and only
/// the remaining signal triggers shutdown.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate())
            .inspect_err(|e| tracing::error!(error = %e, "Failed to install SIGTERM handler"))
            .ok();
        let mut sigint = signal(SignalKind::interrupt())
            .inspect_err(|e| tracing::error!(error = %e, "Failed to install SIGINT handler"))
            .ok();

        tokio::select! {
            Some(_) = recv(&mut sigterm) => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            Some(_) = recv(&mut sigint) => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
            else => return,
        }

        token_clone.cancel();
    });

    token
}

async fn recv(signal: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => None,
    }
}
