//! Configuration for the state manager and push hub.

use crate::error::{Result, SyncError};
use crate::state::ConflictStrategy;
use serde::{Deserialize, Serialize};

/// Sync configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Max snapshots retained per named state. Oldest are evicted first.
    pub max_history: usize,

    /// Strategy applied when a client syncs against a stale version.
    pub conflict_resolution: ConflictStrategy,

    /// Whether rendered components are cached by default. Consumed by the
    /// host's render cache; carried here so one config object covers both.
    pub default_cache: bool,

    /// Buffered render pushes per push subscriber before it is dropped.
    pub push_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_history: 100,
            conflict_resolution: ConflictStrategy::ClientWins,
            default_cache: true,
            push_buffer_size: 256,
        }
    }
}

impl SyncConfig {
    /// Config with the given strategy and defaults elsewhere.
    pub fn with_strategy(conflict_resolution: ConflictStrategy) -> Self {
        Self {
            conflict_resolution,
            ..Default::default()
        }
    }

    /// Config with the given history bound and defaults elsewhere.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            max_history,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_history == 0 {
            return Err(SyncError::InvalidConfig(
                "max_history must be at least 1".to_string(),
            ));
        }
        if self.push_buffer_size == 0 {
            return Err(SyncError::InvalidConfig(
                "push_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
