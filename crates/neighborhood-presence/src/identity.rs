//! Identity service providers used by profile enrichment.
//!
//! Uses enum dispatch instead of a trait object because async methods are
//! not dyn-compatible. The HTTP provider talks to the account service with
//! `reqwest`; the static provider serves a fixed token table for local
//! development and tests.

use std::collections::HashMap;
use std::time::Duration;

use neighborhood_types::Profile;
use reqwest::StatusCode;

use crate::config::IdentityConfig;

/// Errors returned by an identity lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The credential was rejected.
    #[error("identity service rejected the credential")]
    Unauthorized,

    /// The credential is valid but has no profile.
    #[error("profile not found")]
    NotFound,

    /// The service answered with an unexpected status.
    #[error("identity service unavailable: {0}")]
    Unavailable(String),

    /// The request could not be sent or timed out.
    #[error("identity request failed: {0}")]
    Request(String),

    /// The response body was not a profile.
    #[error("invalid identity response: {0}")]
    InvalidResponse(String),

    /// No identity service is configured.
    #[error("identity service not configured")]
    NotConfigured,
}

/// A source of display profiles keyed by bearer credential.
#[derive(Debug)]
pub enum IdentityProvider {
    /// Remote identity service over HTTP.
    Http(HttpIdentity),
    /// Fixed in-memory token table.
    Static(StaticIdentity),
    /// Enrichment disabled; every lookup fails with `NotConfigured`.
    Disabled,
}

impl IdentityProvider {
    /// Build the provider described by `config`: HTTP when a base URL is
    /// set, otherwise disabled.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Request`] if the HTTP client cannot be
    /// constructed.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        match &config.base_url {
            Some(url) => Ok(Self::Http(HttpIdentity::new(url, config.timeout())?)),
            None => Ok(Self::Disabled),
        }
    }

    /// Look up the profile for a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] describing why no profile is available.
    pub async fn fetch_profile(&self, token: &str) -> Result<Profile, IdentityError> {
        match self {
            Self::Http(provider) => provider.fetch_profile(token).await,
            Self::Static(provider) => provider.fetch_profile(token).await,
            Self::Disabled => Err(IdentityError::NotConfigured),
        }
    }

    /// Whether lookups can succeed at all.
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &str {
        match self {
            Self::Http(_) => "http",
            Self::Static(_) => "static",
            Self::Disabled => "disabled",
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP provider
// ---------------------------------------------------------------------------

/// Identity provider backed by the account service.
///
/// Sends `GET {base_url}/profile` with `Authorization: Bearer <token>` and
/// expects `{ "displayName": ..., "profilePictureUrl": ... }`.
#[derive(Debug)]
pub struct HttpIdentity {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentity {
    /// Create a provider with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Request`] if the client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn fetch_profile(&self, token: &str) -> Result<Profile, IdentityError> {
        let url = format!("{}/profile", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<Profile>()
                .await
                .map_err(|e| IdentityError::InvalidResponse(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::Unauthorized),
            StatusCode::NOT_FOUND => Err(IdentityError::NotFound),
            status => Err(IdentityError::Unavailable(format!("returned {status}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Static provider
// ---------------------------------------------------------------------------

/// In-memory token table. Unknown tokens are unauthorized.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    profiles: HashMap<String, Profile>,
    delay: Option<Duration>,
}

impl StaticIdentity {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile for a token.
    #[must_use]
    pub fn with_profile(mut self, token: impl Into<String>, profile: Profile) -> Self {
        self.profiles.insert(token.into(), profile);
        self
    }

    /// Delay every lookup, simulating a slow service.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn fetch_profile(&self, token: &str) -> Result<Profile, IdentityError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.profiles
            .get(token)
            .cloned()
            .ok_or(IdentityError::Unauthorized)
    }
}
