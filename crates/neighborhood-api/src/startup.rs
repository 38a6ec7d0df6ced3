//! Server startup helper for embedding in the binary.
//!
//! Provides [`spawn_server`] which binds the presence server and runs it
//! on a background Tokio task.
//!
//! # Usage
//!
//! ```rust,ignore
//! use neighborhood_api::startup::spawn_server;
//! use neighborhood_api::state::AppState;
//! use std::sync::Arc;
//!
//! let state = Arc::new(AppState::default());
//! let (handle, addr) = spawn_server(&config.server, Arc::clone(&state)).await?;
//! // ... on Ctrl-C:
//! state.shutdown().await;
//! handle.await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use neighborhood_presence::ServerConfig;
use tokio::task::JoinHandle;

use crate::server::{ServerError, bind, serve};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind the listener, then serve on a background Tokio task.
///
/// Binding happens before the task is spawned so an occupied port is
/// reported to the caller instead of being logged from the background.
/// The returned handle completes after `state.shutdown` is cancelled.
pub async fn spawn_server(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<(JoinHandle<()>, SocketAddr), StartupError> {
    let listener = bind(config).await?;
    let local = listener.local_addr().map_err(ServerError::from)?;

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, state).await {
            tracing::error!(error = %e, "Presence server exited with error");
        }
    });

    Ok((handle, local))
}
