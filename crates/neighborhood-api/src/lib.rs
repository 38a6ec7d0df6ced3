//! Snapshot API and real-time sync channel for the Neighborhood presence
//! layer.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` sync channel** (`/ws`) that creates the player's
//!   registry entry, streams registry changes to the client and applies the
//!   client's own position/profile updates
//! - **Snapshot REST endpoints** (`/state`, `/players/count`,
//!   `/players/:id`) read directly from the live registry
//! - **Session config endpoints** (`/config`) for server-wide settings
//! - **Minimal HTML status page** (`GET /`) and a health probe
//!
//! # Architecture
//!
//! A single [`AppState`] owns the [`Registry`], the enrichment runner and
//! the shutdown token. Channels subscribe to the registry's typed change
//! events; REST handlers call the registry's read methods. No component
//! reaches into another's internals.
//!
//! [`Registry`]: neighborhood_presence::Registry

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerError, bind, serve, start_server};
pub use startup::{StartupError, spawn_server};
pub use state::AppState;
