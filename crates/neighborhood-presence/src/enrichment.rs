//! Profile enrichment: fills in display name and avatar after connect.
//!
//! [`Enricher::start`] launches one background task per client that
//! fetches the profile from the [`IdentityProvider`] and merges it into the
//! registry entry through [`Registry::enrich`]. Starting a new enrichment
//! for a client aborts the one already in flight. Failures are logged and
//! leave the placeholder identity in place; they never reach the channel.

use std::collections::HashMap;
use std::sync::Arc;

use neighborhood_types::{ClientId, SessionId};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::identity::IdentityProvider;
use crate::registry::Registry;

type TaskTable = HashMap<ClientId, (SessionId, JoinHandle<()>)>;

/// Runs and tracks in-flight profile lookups, at most one per client.
#[derive(Debug)]
pub struct Enricher {
    registry: Arc<Registry>,
    provider: Arc<IdentityProvider>,
    tasks: Arc<Mutex<TaskTable>>,
}

impl Enricher {
    /// Create an enricher writing into `registry`.
    pub fn new(registry: Arc<Registry>, provider: Arc<IdentityProvider>) -> Self {
        Self {
            registry,
            provider,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The provider used for lookups.
    pub fn provider(&self) -> &IdentityProvider {
        &self.provider
    }

    /// Start enriching `client_id` on behalf of `session`.
    ///
    /// Any enrichment already in flight for the client is aborted first.
    /// Returns `false` without spawning anything when there is no token or
    /// the provider is disabled.
    pub async fn start(&self, client_id: ClientId, session: SessionId, token: Option<String>) -> bool {
        let mut tasks = self.tasks.lock().await;
        if let Some((previous, handle)) = tasks.remove(&client_id) {
            handle.abort();
            debug!(client_id = %client_id, superseded = %previous, "superseded in-flight enrichment");
        }

        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return false;
        };
        if !self.provider.is_enabled() {
            return false;
        }

        let registry = Arc::clone(&self.registry);
        let provider = Arc::clone(&self.provider);
        let table = Arc::clone(&self.tasks);
        let task_client = client_id.clone();

        // The table lock is held until the handle is stored, so the task's
        // own cleanup below always sees its entry.
        let handle = tokio::spawn(async move {
            match provider.fetch_profile(&token).await {
                Ok(profile) => {
                    if registry
                        .enrich(&task_client, session, profile.into())
                        .await
                        .is_some()
                    {
                        debug!(client_id = %task_client, %session, "profile enriched");
                    } else {
                        debug!(client_id = %task_client, %session, "entry gone before enrichment finished");
                    }
                }
                Err(e) => {
                    warn!(
                        client_id = %task_client,
                        provider = provider.name(),
                        error = %e,
                        "profile enrichment failed, keeping placeholder identity"
                    );
                }
            }

            let mut tasks = table.lock().await;
            if tasks.get(&task_client).is_some_and(|(s, _)| *s == session) {
                tasks.remove(&task_client);
            }
        });

        tasks.insert(client_id, (session, handle));
        true
    }

    /// Abort the enrichment for `client_id` if it belongs to `session`.
    ///
    /// A superseded channel calling this leaves its successor's lookup
    /// running.
    pub async fn cancel(&self, client_id: &ClientId, session: SessionId) {
        let mut tasks = self.tasks.lock().await;
        if tasks.get(client_id).is_some_and(|(s, _)| *s == session)
            && let Some((_, handle)) = tasks.remove(client_id)
        {
            handle.abort();
        }
    }

    /// Abort every in-flight enrichment.
    pub async fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, (_, handle)) in tasks.drain() {
            handle.abort();
        }
    }

    /// Number of lookups currently tracked.
    pub async fn in_flight(&self) -> usize {
        self.tasks.lock().await.len()
    }
}
