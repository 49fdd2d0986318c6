//! Process startup and shutdown helpers shared by the binaries.

use std::path::{Path, PathBuf};

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Install the ring crypto provider for `wss://` connections.
///
/// # Errors
///
/// Returns an error if another provider was installed first.
pub fn install_crypto_provider() -> Result<(), &'static str> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "a rustls crypto provider is already installed")
}

/// Load `.env` from the working directory or the nearest ancestor holding one.
///
/// Variables already set in the environment win.
pub fn load_dotenv() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let path = find_dotenv(&cwd)?;
    dotenvy::from_path(&path).ok()?;
    Some(path)
}

fn find_dotenv(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(".env"))
        .find(|candidate| candidate.is_file())
}

/// Wait for SIGINT or SIGTERM, then cancel `shutdown_token`.
#[allow(clippy::expect_used)]
pub async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating shutdown"),
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
