//! Process-level signal handling and the root cancellation scope.
//!
//! Grounded on the teacher's `handle_shutdown_signals`, which listens for
//! SIGINT/SIGTERM via `tokio::signal::unix`; spec.md §7 additionally names
//! SIGQUIT. Rust's signal handling has no global registry to reset the way
//! the source worker's `installSignalHandlers` does — registering our
//! listeners first thing in `main`, before any other part of the process
//! touches signal state, satisfies the same "our handlers win" requirement.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Spawn a task that cancels `token` on SIGINT, SIGTERM, or SIGQUIT.
pub fn install(token: CancellationToken) {
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigquit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigquit.recv() => info!("received SIGQUIT"),
        }

        token.cancel();
    });
}
