//! `WebSocket` sync channel: one persistent connection per client.
//!
//! Clients connect to `GET /ws?clientId=ID&token=TOKEN`. When the socket
//! opens the channel subscribes to registry events, opens a registry
//! session (creating the player entry), starts profile enrichment and sends
//! the full player list as a `snapshot` frame. After that:
//!
//! - inbound `update` frames for the channel's own id are applied through
//!   [`Registry::apply_update`](neighborhood_presence::Registry::apply_update);
//!   stale or foreign updates are dropped
//! - every registry event is forwarded as an `update` or `remove` frame,
//!   except the channel's own changes (echo suppression)
//! - no inbound frame for the liveness interval closes the channel
//!
//! All exits (client close, transport error, liveness timeout, takeover
//! by a newer channel for the same id, server shutdown) converge on one
//! teardown that closes the registry session exactly once.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use chrono::Utc;
use neighborhood_presence::{RegistryEvent, UpdateOutcome};
use neighborhood_types::{
    ClientId, ClientMessage, ClientUpdate, MAX_CLIENT_ID_LEN, ServerMessage, SessionId,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::sleep;
use tracing::{debug, warn};
use validator::Validate as _;

use crate::error::ApiError;
use crate::state::AppState;

/// Close code sent to a channel replaced by a newer one for the same id.
pub const CLOSE_SUPERSEDED: u16 = 4000;

/// Close code sent when the channel's entry was removed out from under it.
pub const CLOSE_EVICTED: u16 = 4001;

/// Query parameters of the channel endpoint.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ChannelParams {
    /// Client identifier. Generated server-side when absent or empty.
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
    /// Bearer credential forwarded to the identity service.
    pub token: Option<String>,
}

/// Why a channel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// Reading from the socket failed.
    TransportError,
    /// Writing to the socket failed.
    SendFailed,
    /// No inbound frame within the liveness interval.
    LivenessTimeout,
    /// A newer channel took over this client id.
    Superseded,
    /// The entry was removed by something other than this channel.
    Evicted,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// The close frame to send, if the socket is still usable.
    pub fn close_frame(self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            Self::ClientClosed | Self::TransportError | Self::SendFailed => return None,
            Self::LivenessTimeout => (close_code::AWAY, "liveness timeout"),
            Self::Shutdown => (close_code::AWAY, "server shutting down"),
            Self::Superseded => (CLOSE_SUPERSEDED, "superseded by a newer connection"),
            Self::Evicted => (CLOSE_EVICTED, "evicted"),
        };
        Some(CloseFrame {
            code,
            reason: reason.into(),
        })
    }
}

/// Upgrade an HTTP request to a sync channel.
///
/// A missing or empty `clientId` gets a generated id. A malformed one
/// (too long, or containing control characters) is rejected with 400
/// before the upgrade.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_channel(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChannelParams>,
) -> Result<Response, ApiError> {
    let client_id = match params.client_id.filter(|id| !id.is_empty()) {
        None => ClientId::generate(),
        Some(id) if ClientId::is_well_formed(&id) => ClientId::from(id),
        Some(_) => {
            return Err(ApiError::InvalidPayload(format!(
                "clientId must be at most {MAX_CLIENT_ID_LEN} printable characters"
            )));
        }
    };
    Ok(ws.on_upgrade(move |socket| run_channel(socket, state, client_id, params.token)))
}

/// Drive one channel from open to close.
async fn run_channel(
    socket: WebSocket,
    state: Arc<AppState>,
    client_id: ClientId,
    token: Option<String>,
) {
    // Subscribe before the entry exists so no event after the snapshot is
    // missed.
    let events = state.registry.subscribe();
    let opened = state.registry.open_session(&client_id).await;
    let session = opened.session;
    state.channel_opened();

    if let Some(previous) = opened.superseded {
        debug!(client_id = %client_id, %session, %previous, "Channel took over existing client id");
    }
    debug!(client_id = %client_id, %session, "Channel open");

    state
        .enricher
        .start(client_id.clone(), session, token)
        .await;

    let mut channel = Channel {
        socket,
        state: Arc::clone(&state),
        client_id,
        session,
    };

    let reason = if channel.send_snapshot().await {
        channel.drive(events).await
    } else {
        CloseReason::SendFailed
    };

    channel.close(reason).await;
    state.channel_closed();
}

/// Decide how a registry event reaches the channel owning `own_session`
/// for `own_id`.
///
/// Sessions are minted in increasing order, so an event for our own id
/// from a newer session means we were taken over, while one from an older
/// session is a leftover from the channel we replaced.
fn route(
    event: RegistryEvent,
    own_id: &ClientId,
    own_session: SessionId,
    shutting_down: bool,
) -> Outbound {
    match event {
        RegistryEvent::Upserted { entry, origin } => {
            if entry.client_id != *own_id {
                return Outbound::Send(ServerMessage::Update { entry });
            }
            match origin {
                // Our own creation or update; the client already has it.
                Some(origin) if origin == own_session => Outbound::Skip,
                Some(origin) if origin > own_session => Outbound::Close(CloseReason::Superseded),
                Some(_) => Outbound::Skip,
                // Enrichment or a server-side upsert of our entry.
                None => Outbound::Send(ServerMessage::Update { entry }),
            }
        }
        RegistryEvent::Removed { entry, owner } => {
            if entry.client_id != *own_id {
                Outbound::Send(ServerMessage::Remove { entry })
            } else if owner != Some(own_session) {
                Outbound::Skip
            } else if shutting_down {
                // Shutdown clears the registry before every channel has
                // observed the cancelled token.
                Outbound::Close(CloseReason::Shutdown)
            } else {
                Outbound::Close(CloseReason::Evicted)
            }
        }
    }
}

/// What to do with a registry event.
#[derive(Debug, PartialEq)]
enum Outbound {
    Send(ServerMessage),
    Skip,
    Close(CloseReason),
}

struct Channel {
    socket: WebSocket,
    state: Arc<AppState>,
    client_id: ClientId,
    session: SessionId,
}

impl Channel {
    async fn drive(&mut self, mut events: tokio::sync::broadcast::Receiver<RegistryEvent>) -> CloseReason {
        let liveness = self.state.presence.liveness_timeout();
        let deadline = sleep(liveness);
        tokio::pin!(deadline);
        let shutdown = self.state.shutdown.clone();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return CloseReason::Shutdown,

                () = &mut deadline => {
                    debug!(client_id = %self.client_id, "Channel liveness timeout");
                    return CloseReason::LivenessTimeout;
                }

                // Registry change to fan out.
                result = events.recv() => {
                    match result {
                        Ok(event) => match route(
                            event,
                            &self.client_id,
                            self.session,
                            self.state.shutdown.is_cancelled(),
                        ) {
                            Outbound::Send(msg) => {
                                if !self.send(&msg).await {
                                    return CloseReason::SendFailed;
                                }
                            }
                            Outbound::Skip => {}
                            Outbound::Close(reason) => return reason,
                        },
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(client_id = %self.client_id, skipped, "Channel lagged, resending snapshot");
                            match self.state.registry.session_of(&self.client_id).await {
                                Some(owner) if owner == self.session => {}
                                Some(_) => return CloseReason::Superseded,
                                None => return CloseReason::Evicted,
                            }
                            if !self.send_snapshot().await {
                                return CloseReason::SendFailed;
                            }
                        }
                        Err(RecvError::Closed) => return CloseReason::Shutdown,
                    }
                }

                // Inbound frame from the client.
                msg = self.socket.recv() => {
                    deadline.set(sleep(liveness));
                    match msg {
                        Some(Ok(Message::Close(_))) | None => return CloseReason::ClientClosed,
                        Some(Err(e)) => {
                            debug!(client_id = %self.client_id, "Channel transport error: {e}");
                            return CloseReason::TransportError;
                        }
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reason) = self.handle_text(text.as_str()).await {
                                return reason;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if self.socket.send(Message::Pong(data)).await.is_err() {
                                return CloseReason::SendFailed;
                            }
                        }
                        Some(Ok(_)) => {
                            // Pong and binary frames only count as liveness.
                        }
                    }
                }
            }
        }
    }

    /// Handle a text frame. Returns a close reason if the channel must end.
    async fn handle_text(&mut self, text: &str) -> Option<CloseReason> {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "Ignoring malformed channel frame");
                return None;
            }
        };

        match message {
            ClientMessage::Ping => {
                let pong = ServerMessage::Pong {
                    timestamp: Utc::now().timestamp_millis(),
                };
                (!self.send(&pong).await).then_some(CloseReason::SendFailed)
            }
            ClientMessage::Update(update) => self.handle_update(&update).await,
        }
    }

    async fn handle_update(&mut self, update: &ClientUpdate) -> Option<CloseReason> {
        if update.client_id != self.client_id {
            warn!(
                client_id = %self.client_id,
                claimed = %update.client_id,
                "Dropping update addressed to another client"
            );
            return None;
        }
        if let Some(profile) = &update.profile
            && let Err(e) = profile.validate()
        {
            warn!(client_id = %self.client_id, error = %e, "Dropping update with invalid profile");
            return None;
        }

        match self.state.registry.apply_update(self.session, update).await {
            UpdateOutcome::Applied(_) => None,
            UpdateOutcome::Stale { last_updated } => {
                debug!(
                    client_id = %self.client_id,
                    timestamp = update.timestamp,
                    last_updated,
                    "Dropping stale update"
                );
                None
            }
            UpdateOutcome::NotOwner => Some(CloseReason::Superseded),
            UpdateOutcome::NotFound => Some(CloseReason::Evicted),
        }
    }

    async fn send_snapshot(&mut self) -> bool {
        let (players, timestamp) = self.state.registry.snapshot().await;
        self.send(&ServerMessage::Snapshot { players, timestamp }).await
    }

    /// Send one frame. Returns `false` if the socket is gone.
    async fn send(&mut self, message: &ServerMessage) -> bool {
        let json = match serde_json::to_string(message) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize channel frame: {e}");
                return true;
            }
        };
        self.socket.send(Message::Text(json.into())).await.is_ok()
    }

    /// Tear the channel down: cancel enrichment, close the registry
    /// session, then say goodbye if the socket still works.
    async fn close(mut self, reason: CloseReason) {
        self.state.enricher.cancel(&self.client_id, self.session).await;
        let removed = self
            .state
            .registry
            .close_session(&self.client_id, self.session)
            .await
            .is_some();

        debug!(
            client_id = %self.client_id,
            session = %self.session,
            ?reason,
            removed,
            "Channel closed"
        );

        if let Some(frame) = reason.close_frame() {
            let _ = self.socket.send(Message::Close(Some(frame))).await;
        }
    }
}
