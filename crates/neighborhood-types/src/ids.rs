//! Identifier types for the presence layer.
//!
//! Client identifiers are opaque strings chosen by the browser (or
//! generated server-side when a channel opens without one). Session
//! identifiers are server-internal and never leave the process.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Longest accepted client identifier, in bytes.
pub const MAX_CLIENT_ID_LEN: usize = 128;

/// Stable identifier of a connected client. Primary key of the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ClientId(pub String);

impl ClientId {
    /// Wrap an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier (UUID v7) for a client that did not
    /// supply one.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Whether `raw` is acceptable as a client-supplied identifier:
    /// non-empty, at most [`MAX_CLIENT_ID_LEN`] bytes, no control characters.
    pub fn is_well_formed(raw: &str) -> bool {
        !raw.is_empty() && raw.len() <= MAX_CLIENT_ID_LEN && !raw.chars().any(char::is_control)
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Tag identifying which open channel currently owns a registry entry.
///
/// A new session is minted every time a channel opens, including a
/// takeover of an id that already has an open channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "s{}", self.0)
    }
}
