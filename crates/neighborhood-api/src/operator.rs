//! Session config endpoints.
//!
//! A side channel for server-wide game/session settings. These endpoints
//! never touch the player registry.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/config` | Current session config |
//! | `POST` | `/config` | Merge a JSON object into the session config |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::Value;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Generic success response.
#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    /// Whether the operation succeeded.
    ok: bool,
    /// Human-readable message.
    message: String,
    /// Config revision after the update.
    revision: u64,
}

// ---------------------------------------------------------------------------
// POST /config
// ---------------------------------------------------------------------------

/// Apply a config update.
///
/// Top-level keys of the body replace existing values; `null` deletes a
/// key. Non-object bodies are rejected with 400.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let keys = body.as_object().map_or(0, serde_json::Map::len);
    let revision = state.session_config.apply(body).await?;

    info!(revision, keys, "Session config updated");

    Ok(Json(OperatorResponse {
        ok: true,
        message: "Config applied".to_owned(),
        revision,
    }))
}

// ---------------------------------------------------------------------------
// GET /config
// ---------------------------------------------------------------------------

/// Return the current session config with its revision.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.session_config.view().await;
    Ok(Json(serde_json::to_value(view)?))
}
