//! Error types for dashgate.

use std::time::Duration;

/// Top-level error type for the guard.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the backend status endpoints.
///
/// None of these abort a validation cycle: the status client folds them
/// into an unreachable answer and the guard falls back to cached state.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("Request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Backend returned HTTP {status} for {endpoint}")]
    Http { endpoint: String, status: u16 },

    #[error("Malformed payload from {endpoint}: {reason}")]
    Payload { endpoint: String, reason: String },
}

/// Key-value store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Corrupt record under {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Result type alias for the guard.
pub type Result<T> = std::result::Result<T, Error>;
