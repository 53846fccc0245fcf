use anyhow::Result;
use tokio::signal;

/// Resolves once the process is asked to stop by Ctrl+C or SIGTERM.
///
/// # Errors
/// Returns an error if a signal handler cannot be installed.
pub async fn wait_for_shutdown() -> Result<()> {
    let name = tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            "SIGINT"
        }
        result = terminate() => {
            result?;
            "SIGTERM"
        }
    };
    tracing::info!(signal = name, "shutdown requested");
    Ok(())
}

#[cfg(unix)]
async fn terminate() -> Result<()> {
    let mut stream = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    stream.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> Result<()> {
    std::future::pending().await
}
