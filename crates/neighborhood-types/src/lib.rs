//! Shared type definitions for the Neighborhood presence layer.
//!
//! This crate is the single source of truth for the data that flows
//! between the registry, the sync channel, the snapshot API and the
//! browser. Types are exported to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Client and session identifiers
//! - [`structs`] -- Registry entries and partial state
//! - [`messages`] -- Channel frames and REST response bodies

pub mod ids;
pub mod messages;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use ids::{ClientId, MAX_CLIENT_ID_LEN, SessionId};
pub use messages::{
    ClientMessage, ClientUpdate, CountResponse, PlayerResponse, ServerMessage, StateResponse,
};
pub use structs::{
    DEFAULT_DISPLAY_NAME, PlayerEntry, Position, Profile, ProfilePatch, StatePatch,
};
