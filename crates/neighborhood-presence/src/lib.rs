//! Connection registry, change events and profile enrichment for the
//! Neighborhood presence layer.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `neighborhood-config.yaml`.
//! - [`registry`] -- The authoritative in-memory player map and its typed
//!   change events.
//! - [`identity`] -- Identity service providers (HTTP, static, disabled).
//! - [`enrichment`] -- Cancellable per-client profile lookups.
//! - [`session_config`] -- Server-wide opaque game/session settings.

pub mod config;
pub mod enrichment;
pub mod identity;
pub mod registry;
pub mod session_config;

pub use config::{ConfigError, IdentityConfig, NeighborhoodConfig, PresenceConfig, ServerConfig};
pub use enrichment::Enricher;
pub use identity::{HttpIdentity, IdentityError, IdentityProvider, StaticIdentity};
pub use registry::{OpenedSession, Registry, RegistryEvent, UpdateOutcome};
pub use session_config::{SessionConfig, SessionConfigError, SessionConfigView};
