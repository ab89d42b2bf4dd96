//! Versioned state with optimistic-concurrency sync.
//!
//! Every write to a named state appends a snapshot with the next version
//! number. The script context syncs by sending its state together with the
//! version it was based on; a stale version is a conflict, settled by a
//! [`ConflictStrategy`].

mod diff;
mod history;
mod manager;
mod resolver;

pub use diff::{apply_diff, FieldChange, StateDiff};
pub use history::{RollbackTarget, StateHistory};
pub use crate::dispatch::MAX_NOTIFY_DEPTH;
pub use manager::{StateManager, StateSubscriber, SubscriberId, SyncOutcome};
pub use resolver::{resolve, ConflictStrategy, Resolution, ResolverFn};
