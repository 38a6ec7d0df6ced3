//! The connection registry: authoritative map of connected players.
//!
//! [`Registry`] owns the only shared mutable presence state in the process.
//! Every mutation runs inside a single write-lock critical section that
//! also emits the matching [`RegistryEvent`], so subscribers observe
//! events in exactly the order mutations were applied. The registry knows
//! nothing about sockets; the sync channel subscribes to its events.
//!
//! Entries created by a channel are tagged with the [`SessionId`] of that
//! channel. Session-scoped operations ([`Registry::apply_update`],
//! [`Registry::enrich`], [`Registry::close_session`]) are no-ops when the
//! caller no longer owns the entry, which makes channel teardown
//! idempotent and keeps a superseded channel from touching its
//! successor's entry.

use chrono::Utc;
use indexmap::IndexMap;
use neighborhood_types::{ClientId, ClientUpdate, PlayerEntry, ProfilePatch, SessionId, StatePatch};
use tokio::sync::{RwLock, broadcast};

/// Default capacity of the change-event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// A change applied to the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// An entry was created or modified.
    Upserted {
        /// The full resulting entry.
        entry: PlayerEntry,
        /// The channel session whose own message caused the change, if any.
        /// Channels use this for echo suppression.
        origin: Option<SessionId>,
    },
    /// An entry was removed.
    Removed {
        /// The entry as it was at removal.
        entry: PlayerEntry,
        /// The channel session that owned the entry, if any. Lets a channel
        /// tell its own eviction apart from the removal of an entry it has
        /// since replaced.
        owner: Option<SessionId>,
    },
}

impl RegistryEvent {
    /// The client the event is about.
    pub const fn client_id(&self) -> &ClientId {
        match self {
            Self::Upserted { entry, .. } | Self::Removed { entry, .. } => &entry.client_id,
        }
    }
}

/// Result of applying a client update through [`Registry::apply_update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The update was merged; contains the resulting entry.
    Applied(PlayerEntry),
    /// The update's timestamp was not newer than the entry's `last_updated`.
    Stale {
        /// The entry's current `last_updated`.
        last_updated: u64,
    },
    /// The entry is owned by a different session (the caller was superseded).
    NotOwner,
    /// No entry exists for the client.
    NotFound,
}

/// Result of opening a channel session.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedSession {
    /// The session that now owns the entry.
    pub session: SessionId,
    /// The freshly created entry.
    pub entry: PlayerEntry,
    /// The session that owned the entry before, if this open was a takeover.
    pub superseded: Option<SessionId>,
}

#[derive(Debug)]
struct Slot {
    entry: PlayerEntry,
    session: Option<SessionId>,
}

#[derive(Debug, Default)]
struct Inner {
    slots: IndexMap<ClientId, Slot>,
    next_session: u64,
}

impl Inner {
    const fn mint_session(&mut self) -> SessionId {
        self.next_session = self.next_session.wrapping_add(1);
        SessionId(self.next_session)
    }
}

/// In-memory presence registry.
///
/// Construct one per server and share it behind an [`std::sync::Arc`].
#[derive(Debug)]
pub struct Registry {
    inner: RwLock<Inner>,
    events: broadcast::Sender<RegistryEvent>,
    default_display_name: String,
}

impl Registry {
    /// Create an empty registry.
    ///
    /// `event_capacity` bounds how far a subscriber may fall behind before
    /// it observes [`broadcast::error::RecvError::Lagged`].
    pub fn new(event_capacity: usize, default_display_name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: RwLock::new(Inner::default()),
            events,
            default_display_name: default_display_name.into(),
        }
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// The placeholder name given to new entries.
    pub fn default_display_name(&self) -> &str {
        &self.default_display_name
    }

    fn emit(&self, event: RegistryEvent) {
        // send only fails when nobody is subscribed, which is normal.
        let _ = self.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Core contract
    // -----------------------------------------------------------------------

    /// Create the entry if absent, otherwise merge `patch` into it.
    ///
    /// Returns the full resulting entry. Missing fields keep their prior
    /// values.
    pub async fn upsert(&self, client_id: &ClientId, patch: &StatePatch) -> PlayerEntry {
        let mut inner = self.inner.write().await;
        let slot = inner.slots.entry(client_id.clone()).or_insert_with(|| Slot {
            entry: PlayerEntry::new(client_id.clone(), self.default_display_name.as_str()),
            session: None,
        });
        slot.entry.merge(patch);
        let entry = slot.entry.clone();
        self.emit(RegistryEvent::Upserted {
            entry: entry.clone(),
            origin: None,
        });
        entry
    }

    /// Delete the entry. No-op (and no event) if it is already absent.
    pub async fn remove(&self, client_id: &ClientId) -> Option<PlayerEntry> {
        let mut inner = self.inner.write().await;
        let slot = inner.slots.shift_remove(client_id)?;
        self.emit(RegistryEvent::Removed {
            entry: slot.entry.clone(),
            owner: slot.session,
        });
        Some(slot.entry)
    }

    /// Look up a single entry.
    pub async fn get(&self, client_id: &ClientId) -> Option<PlayerEntry> {
        let inner = self.inner.read().await;
        inner.slots.get(client_id).map(|slot| slot.entry.clone())
    }

    /// All entries in insertion order.
    pub async fn list(&self) -> Vec<PlayerEntry> {
        let inner = self.inner.read().await;
        inner.slots.values().map(|slot| slot.entry.clone()).collect()
    }

    /// Number of entries.
    pub async fn count(&self) -> usize {
        self.inner.read().await.slots.len()
    }

    /// Read entries and a server timestamp under the same lock, so the
    /// two describe one instant.
    pub async fn snapshot(&self) -> (Vec<PlayerEntry>, i64) {
        let inner = self.inner.read().await;
        let players = inner.slots.values().map(|slot| slot.entry.clone()).collect();
        (players, Utc::now().timestamp_millis())
    }

    // -----------------------------------------------------------------------
    // Channel sessions
    // -----------------------------------------------------------------------

    /// Create the entry for a newly opened channel.
    ///
    /// If the id already has an entry, it is replaced by a fresh one owned
    /// by the new session and the previous owner is reported in
    /// [`OpenedSession::superseded`]. Either way a single
    /// [`RegistryEvent::Upserted`] is emitted, tagged with the new session.
    pub async fn open_session(&self, client_id: &ClientId) -> OpenedSession {
        let mut inner = self.inner.write().await;
        let session = inner.mint_session();
        let entry = PlayerEntry::new(client_id.clone(), self.default_display_name.as_str());
        let previous = inner.slots.insert(
            client_id.clone(),
            Slot {
                entry: entry.clone(),
                session: Some(session),
            },
        );
        self.emit(RegistryEvent::Upserted {
            entry: entry.clone(),
            origin: Some(session),
        });
        OpenedSession {
            session,
            entry,
            superseded: previous.and_then(|slot| slot.session),
        }
    }

    /// Apply an update received on `session`'s channel.
    ///
    /// The ownership check, stale check and merge happen atomically. Only
    /// an [`UpdateOutcome::Applied`] result emits an event.
    pub async fn apply_update(&self, session: SessionId, update: &ClientUpdate) -> UpdateOutcome {
        let mut inner = self.inner.write().await;
        let Some(slot) = inner.slots.get_mut(&update.client_id) else {
            return UpdateOutcome::NotFound;
        };
        if slot.session != Some(session) {
            return UpdateOutcome::NotOwner;
        }
        if update.timestamp <= slot.entry.last_updated {
            return UpdateOutcome::Stale {
                last_updated: slot.entry.last_updated,
            };
        }
        slot.entry.merge(&update.patch());
        slot.entry.last_updated = update.timestamp;
        let entry = slot.entry.clone();
        self.emit(RegistryEvent::Upserted {
            entry: entry.clone(),
            origin: Some(session),
        });
        UpdateOutcome::Applied(entry)
    }

    /// Merge enrichment results into the entry owned by `session`.
    ///
    /// Returns `None` without emitting anything when the entry is gone or
    /// has been taken over, so a late enrichment never resurrects a
    /// departed player.
    pub async fn enrich(
        &self,
        client_id: &ClientId,
        session: SessionId,
        profile: ProfilePatch,
    ) -> Option<PlayerEntry> {
        let mut inner = self.inner.write().await;
        let slot = inner.slots.get_mut(client_id)?;
        if slot.session != Some(session) {
            return None;
        }
        slot.entry.merge(&StatePatch::profile(profile));
        let entry = slot.entry.clone();
        self.emit(RegistryEvent::Upserted {
            entry: entry.clone(),
            origin: None,
        });
        Some(entry)
    }

    /// Remove the entry if `session` still owns it.
    ///
    /// Returns the removed entry. Repeated calls for the same session, or
    /// calls from a superseded session, return `None` and emit nothing.
    pub async fn close_session(
        &self,
        client_id: &ClientId,
        session: SessionId,
    ) -> Option<PlayerEntry> {
        let mut inner = self.inner.write().await;
        if inner.slots.get(client_id)?.session != Some(session) {
            return None;
        }
        let slot = inner.slots.shift_remove(client_id)?;
        self.emit(RegistryEvent::Removed {
            entry: slot.entry.clone(),
            owner: slot.session,
        });
        Some(slot.entry)
    }

    /// The session currently owning an entry.
    pub async fn session_of(&self, client_id: &ClientId) -> Option<SessionId> {
        let inner = self.inner.read().await;
        inner.slots.get(client_id).and_then(|slot| slot.session)
    }

    /// Remove every entry, emitting a removal for each. Returns how many
    /// entries were dropped.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.write().await;
        let drained: Vec<Slot> = inner.slots.drain(..).map(|(_, slot)| slot).collect();
        let dropped = drained.len();
        for slot in drained {
            self.emit(RegistryEvent::Removed {
                entry: slot.entry,
                owner: slot.session,
            });
        }
        dropped
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY, neighborhood_types::DEFAULT_DISPLAY_NAME)
    }
}
