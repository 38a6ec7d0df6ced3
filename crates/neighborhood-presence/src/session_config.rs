//! Server-wide game/session configuration side channel.
//!
//! Holds an opaque JSON object that the front end reads and that operators
//! update through `POST /config`. It is independent of the player registry:
//! nothing here touches presence entries.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// Errors from applying a config update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionConfigError {
    /// Config updates must be JSON objects.
    #[error("config payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Point-in-time view of the session config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfigView {
    /// Number of updates applied since startup.
    pub revision: u64,
    /// When the last update was applied.
    pub updated_at: Option<DateTime<Utc>>,
    /// Current values.
    pub values: Map<String, Value>,
}

#[derive(Debug, Default)]
struct Values {
    map: Map<String, Value>,
    updated_at: Option<DateTime<Utc>>,
}

/// Shared, mutable session configuration.
#[derive(Debug, Default)]
pub struct SessionConfig {
    values: RwLock<Values>,
    revision: AtomicU64,
}

impl SessionConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow-merge `payload` into the config.
    ///
    /// Top-level keys replace existing ones; a `null` value deletes the
    /// key. Returns the new revision.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigError::NotAnObject`] if `payload` is not a
    /// JSON object.
    pub async fn apply(&self, payload: Value) -> Result<u64, SessionConfigError> {
        let patch = match payload {
            Value::Object(patch) => patch,
            other => return Err(SessionConfigError::NotAnObject(json_kind(&other))),
        };

        let mut values = self.values.write().await;
        for (key, value) in patch {
            if value.is_null() {
                values.map.remove(&key);
            } else {
                values.map.insert(key, value);
            }
        }
        values.updated_at = Some(Utc::now());
        let revision = self.revision.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        Ok(revision)
    }

    /// Current values and revision.
    pub async fn view(&self) -> SessionConfigView {
        let values = self.values.read().await;
        SessionConfigView {
            revision: self.revision.load(Ordering::Acquire),
            updated_at: values.updated_at,
            values: values.map.clone(),
        }
    }

    /// Number of updates applied since startup.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
