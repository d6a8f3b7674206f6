//! Error types for loading the runtime and reading bridge configuration.

use std::time::Duration;

/// Reasons a runtime load can fail. All of them are terminal for a bridge.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The module could not be fetched from its location.
    #[error("failed to fetch runtime module at {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// The fetched bytes do not match the configured digest.
    #[error("integrity mismatch for {location}: expected {expected}, got {actual}")]
    Integrity {
        location: String,
        expected: String,
        actual: String,
    },

    /// The module was fetched but is not a usable runtime.
    #[error("malformed runtime module at {location}: {reason}")]
    Malformed { location: String, reason: String },

    /// Initialization did not yield an evaluation entry point.
    #[error("runtime module at {location} exposes no entry point: {reason}")]
    MissingEntryPoint { location: String, reason: String },

    /// Fetching or initializing panicked instead of returning an error.
    #[error("runtime load panicked for {location}: {message}")]
    Panicked { location: String, message: String },

    /// Fetch and initialize did not finish within the load timeout.
    #[error("runtime load timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Errors reading or validating a [`crate::BridgeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
