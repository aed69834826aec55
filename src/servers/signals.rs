//! This module contains functions to handle signals.
use derive_more::Display;
use tokio::sync::mpsc;
use tracing::info;

/// The message a spawned server task receives to notify it to shut down.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum Halted {
    Normal,
    Dropped,
}

/// Resolves on `ctrl_c` or, on unix, the `terminate` signal.
///
/// # Panics
///
/// Panics if unable to install a signal handler.
pub async fn global_shutdown_signal() {
    let interrupt = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {}
    }
}

/// Resolves when a halt message arrives or every halt sender is gone.
pub async fn shutdown_signal(mut rx_halt: mpsc::Receiver<Halted>) {
    let signal = rx_halt.recv().await.unwrap_or(Halted::Dropped);

    info!("Halt signal processed: {signal}");
}
