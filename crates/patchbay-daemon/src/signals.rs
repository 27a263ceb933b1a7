//! Signal handling for graceful shutdown.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Set up signal handlers for graceful shutdown.
///
/// `shutdown` is cancelled when SIGTERM or SIGINT is received.
pub fn setup_signal_handlers(shutdown: &CancellationToken) {
    // Handle SIGTERM
    let token = shutdown.clone();
    tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM");
                token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
        }
    });

    // Handle SIGINT (Ctrl+C)
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT");
            token.cancel();
        }
    });
}
