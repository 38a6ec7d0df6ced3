//! Registry entry and partial-state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use validator::Validate;

use crate::ids::ClientId;

/// Placeholder display name used until profile enrichment completes.
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Position of a player in the shared space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
    /// Optional room or scene the player is in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub room: Option<String>,
}

impl Position {
    /// Create a position without a room.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, room: None }
    }
}

/// Identity fields as returned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Profile {
    /// Human-readable name shown above the avatar.
    pub display_name: String,
    /// Avatar image URL, if the account has one.
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// Partial profile update. Absent fields keep their prior values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ProfilePatch {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 64))]
    #[ts(optional)]
    pub display_name: Option<String>,
    /// New avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    #[ts(optional)]
    pub profile_picture_url: Option<String>,
}

impl From<Profile> for ProfilePatch {
    fn from(profile: Profile) -> Self {
        Self {
            display_name: Some(profile.display_name),
            profile_picture_url: profile.profile_picture_url,
        }
    }
}

/// Partial player state applied by an upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StatePatch {
    /// Replacement position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub position: Option<Position>,
    /// Profile fields to merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub profile: Option<ProfilePatch>,
}

impl StatePatch {
    /// A patch that only moves the player.
    pub const fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            profile: None,
        }
    }

    /// A patch that only touches profile fields.
    pub const fn profile(profile: ProfilePatch) -> Self {
        Self {
            position: None,
            profile: Some(profile),
        }
    }
}

/// Live state record for one connected player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct PlayerEntry {
    /// Primary key; immutable for the lifetime of the entry.
    pub client_id: ClientId,
    /// Display name, a placeholder until enrichment completes.
    pub display_name: String,
    /// Avatar image URL.
    pub profile_picture_url: Option<String>,
    /// Current position.
    pub position: Position,
    /// Timestamp of the newest accepted client update (client clock, ms).
    #[ts(type = "number")]
    pub last_updated: u64,
    /// When the entry was created.
    pub connected_at: DateTime<Utc>,
    /// When the entry was last mutated by any path.
    pub updated_at: DateTime<Utc>,
}

impl PlayerEntry {
    /// A fresh entry with placeholder identity at the origin.
    pub fn new(client_id: ClientId, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            display_name: display_name.into(),
            profile_picture_url: None,
            position: Position::default(),
            last_updated: 0,
            connected_at: now,
            updated_at: now,
        }
    }

    /// Merge a partial state into this entry. Missing fields keep their
    /// prior values. Does not touch `last_updated`.
    pub fn merge(&mut self, patch: &StatePatch) {
        if let Some(position) = &patch.position {
            self.position = position.clone();
        }
        if let Some(profile) = &patch.profile {
            if let Some(name) = &profile.display_name {
                self.display_name.clone_from(name);
            }
            if let Some(url) = &profile.profile_picture_url {
                self.profile_picture_url = Some(url.clone());
            }
        }
        self.updated_at = Utc::now();
    }
}
