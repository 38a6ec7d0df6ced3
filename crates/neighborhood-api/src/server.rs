//! HTTP server lifecycle management.
//!
//! [`bind`] opens the listener described by [`ServerConfig`]; [`serve`]
//! runs the router on it until the state's shutdown token is cancelled.
//! [`start_server`] does both in the foreground.

use std::io;
use std::sync::Arc;

use neighborhood_presence::ServerConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be opened on the configured host and port.
    #[error("failed to bind {host}:{port}: {source}")]
    Bind {
        /// Configured host (name or address).
        host: String,
        /// Configured port.
        port: u16,
        /// The underlying socket error.
        source: io::Error,
    },

    /// The server hit a fatal I/O error while accepting connections.
    #[error("serve error: {source}")]
    Serve {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },
}

/// Open a TCP listener for `config`.
///
/// The host may be a name (`localhost`) or a literal address; port `0`
/// picks an ephemeral port.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind {
            host: config.host.clone(),
            port: config.port,
            source,
        })
}

/// Bind to the configured address and serve until shutdown.
pub async fn start_server(config: &ServerConfig, state: Arc<AppState>) -> Result<(), ServerError> {
    let listener = bind(config).await?;
    serve(listener, state).await
}

/// Serve the router on an already-bound listener.
///
/// Returns once `state.shutdown` is cancelled and in-flight HTTP requests
/// have drained. Open channels observe the same token and close
/// themselves.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Presence server listening");
    }

    let shutdown = state.shutdown.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Presence server stopped accepting connections");
    Ok(())
}
