//! Wire messages for the sync channel and REST snapshot bodies.
//!
//! Channel frames are JSON text frames tagged by a `type` field:
//!
//! | Direction | `type` | Payload |
//! |-----------|--------|---------|
//! | client -> server | `update` | `clientId`, `position?`, `profile?`, `timestamp` |
//! | client -> server | `ping` | keep-alive |
//! | server -> client | `snapshot` | all players plus server timestamp |
//! | server -> client | `update` | the changed entry |
//! | server -> client | `remove` | the departed entry |
//! | server -> client | `pong` | server timestamp |

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::ClientId;
use crate::structs::{PlayerEntry, Position, ProfilePatch, StatePatch};

/// A position/profile update sent by a client on its own channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ClientUpdate {
    /// Must match the identity of the channel it arrives on.
    pub client_id: ClientId,
    /// New position, if the player moved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub position: Option<Position>,
    /// Profile fields to change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub profile: Option<ProfilePatch>,
    /// Client clock in milliseconds. Updates not newer than the entry's
    /// `lastUpdated` are dropped.
    #[ts(type = "number")]
    pub timestamp: u64,
}

impl ClientUpdate {
    /// The partial state carried by this update.
    pub fn patch(&self) -> StatePatch {
        StatePatch {
            position: self.position.clone(),
            profile: self.profile.clone(),
        }
    }
}

/// Frames a client may send on the sync channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ClientMessage {
    /// Position and/or profile change.
    Update(ClientUpdate),
    /// Application-level keep-alive.
    Ping,
}

/// Frames the server pushes on the sync channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ServerMessage {
    /// Full registry contents, sent when a channel opens.
    Snapshot {
        /// All connected players in insertion order.
        players: Vec<PlayerEntry>,
        /// Server wall clock, Unix milliseconds.
        timestamp: i64,
    },
    /// A player was created or changed.
    Update {
        /// The full resulting entry.
        entry: PlayerEntry,
    },
    /// A player left.
    Remove {
        /// The entry as it was at removal.
        entry: PlayerEntry,
    },
    /// Reply to a client keep-alive.
    Pong {
        /// Server wall clock, Unix milliseconds.
        timestamp: i64,
    },
}

/// Body of `GET /state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StateResponse {
    /// All connected players in insertion order.
    pub players: Vec<PlayerEntry>,
    /// Server wall clock, Unix milliseconds.
    pub timestamp: i64,
}

/// Body of `GET /players/count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CountResponse {
    /// Number of connected players.
    pub count: usize,
    /// Server wall clock, Unix milliseconds.
    pub timestamp: i64,
}

/// Body of `GET /players/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlayerResponse {
    /// The requested entry.
    pub player: PlayerEntry,
}
