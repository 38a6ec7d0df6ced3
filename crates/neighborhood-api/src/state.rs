//! Shared application state for the presence server.
//!
//! [`AppState`] owns the registry, the enrichment runner, the session
//! config side channel and the shutdown token. It is constructed once at
//! startup, wrapped in [`Arc`] and injected into every handler and channel
//! via Axum's `State` extractor. There is no module-level state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use neighborhood_presence::{
    Enricher, IdentityProvider, PresenceConfig, Registry, SessionConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state for the Axum application.
#[derive(Debug)]
pub struct AppState {
    /// The authoritative player registry.
    pub registry: Arc<Registry>,
    /// Profile enrichment runner writing into `registry`.
    pub enricher: Arc<Enricher>,
    /// Opaque server-wide settings updated through `POST /config`.
    pub session_config: Arc<SessionConfig>,
    /// Channel and registry tuning.
    pub presence: PresenceConfig,
    /// Cancelled once when the server begins shutting down.
    pub shutdown: CancellationToken,
    open_channels: AtomicUsize,
}

impl AppState {
    /// Build the state from config and an identity provider.
    pub fn new(presence: PresenceConfig, identity: IdentityProvider) -> Self {
        let registry = Arc::new(Registry::new(
            presence.broadcast_capacity,
            presence.default_display_name.as_str(),
        ));
        let enricher = Arc::new(Enricher::new(Arc::clone(&registry), Arc::new(identity)));
        Self {
            registry,
            enricher,
            session_config: Arc::new(SessionConfig::new()),
            presence,
            shutdown: CancellationToken::new(),
            open_channels: AtomicUsize::new(0),
        }
    }

    /// Number of sync channels currently open.
    pub fn open_channels(&self) -> usize {
        self.open_channels.load(Ordering::Acquire)
    }

    pub(crate) fn channel_opened(&self) {
        self.open_channels.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn channel_closed(&self) {
        // Saturate instead of wrapping if the counter is ever off by one.
        let _ = self
            .open_channels
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Tear down all presence state.
    ///
    /// Signals every open channel to close, aborts pending enrichments and
    /// drops any remaining registry entries. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.enricher.cancel_all().await;
        let dropped = self.registry.clear().await;
        info!(dropped, "Presence state torn down");
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(PresenceConfig::default(), IdentityProvider::Disabled)
    }
}
