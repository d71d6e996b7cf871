//! Signal handling for graceful server shutdown.

use bingo_server::ShutdownState;
use tokio::signal;
use tracing::info;

/// Resolves on SIGINT or SIGTERM (Ctrl+C on Windows).
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}

/// Waits for the first signal, then initiates `shutdown_state`.
pub async fn shutdown_on_signal(shutdown_state: &ShutdownState) -> std::io::Result<()> {
    wait_for_shutdown_signal().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    shutdown_state.initiate_shutdown();
    Ok(())
}
