//! Conflict resolution between a client's stale write and the server's state.

use crate::error::{Result, SyncError};
use crate::types::StateMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How to settle a sync whose client version does not match the server's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Client's submitted state is taken verbatim.
    #[default]
    ClientWins,
    /// Server state is kept and the write is rejected.
    ServerWins,
    /// Currently resolved exactly like `ClientWins`.
    LatestWins,
    /// Client state overlaid with every server key.
    Merge,
    /// Caller-supplied resolver.
    Custom,
}

/// Caller-supplied resolver: `(client, server) -> resolved`.
pub type ResolverFn = Arc<dyn Fn(&StateMap, &StateMap) -> StateMap + Send + Sync>;

/// Result of resolving a conflict.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// Commit this state as a new version.
    Accept(StateMap),
    /// Keep the server state; the client's write is refused.
    Reject,
}

/// Resolve a conflicting write.
///
/// Pure apart from calling `custom`. Fails only when the strategy is
/// `Custom` and no resolver is given.
pub fn resolve(
    strategy: ConflictStrategy,
    client: &StateMap,
    server: &StateMap,
    custom: Option<&ResolverFn>,
) -> Result<Resolution> {
    match strategy {
        ConflictStrategy::ClientWins | ConflictStrategy::LatestWins => {
            Ok(Resolution::Accept(client.clone()))
        }

        ConflictStrategy::ServerWins => Ok(Resolution::Reject),

        ConflictStrategy::Merge => {
            // Server wins every overlapping key.
            let mut merged = client.clone();
            for (key, value) in server {
                merged.insert(key.clone(), value.clone());
            }
            Ok(Resolution::Accept(merged))
        }

        ConflictStrategy::Custom => {
            let resolver = custom.ok_or(SyncError::MissingResolver)?;
            Ok(Resolution::Accept(resolver(client, server)))
        }
    }
}
