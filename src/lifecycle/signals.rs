//! OS signal handling.
//!
//! SIGINT and SIGTERM (unix) interrupt the engine. The handler only flips the
//! shutdown state; it never touches the cache.

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Spawn a task that interrupts `shutdown` on the first termination signal.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(name) => {
                tracing::info!(signal = name, "Termination signal received");
                shutdown.interrupt();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers; relying on SHUTDOWN verb");
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = interrupt.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
