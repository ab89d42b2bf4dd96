//! Error types for state synchronization and the event bridge.

use thiserror::Error;

/// Main error type.
///
/// Absence (unknown state, evicted version) and sync conflicts are not
/// errors; they are reported through `Option` and `SyncOutcome`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Custom conflict strategy selected but no resolver is set")]
    MissingResolver,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type user callbacks may return.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of event callbacks and state subscribers.
pub type CallbackResult = std::result::Result<(), CallbackError>;
