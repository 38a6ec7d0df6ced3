//! Error types for the presence server binary.
//!
//! [`ServerBinError`] is the top-level error type that wraps all possible
//! failure modes during startup and shutdown.

/// Top-level error for the presence server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum ServerBinError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: neighborhood_presence::ConfigError,
    },

    /// The identity provider could not be built.
    #[error("identity error: {source}")]
    Identity {
        /// The underlying identity error.
        #[from]
        source: neighborhood_presence::IdentityError,
    },

    /// The HTTP server failed to start.
    #[error("startup error: {source}")]
    Startup {
        /// The underlying startup error.
        #[from]
        source: neighborhood_api::StartupError,
    },

    /// Waiting for the shutdown signal or the server task failed.
    #[error("runtime error: {message}")]
    Runtime {
        /// Description of the failure.
        message: String,
    },
}
