//! # Component Sync
//!
//! State synchronization and event replay between a host process and the
//! script context of an embedded HTML component.
//!
//! ## Core Concepts
//!
//! - **State**: Named mappings with a bounded, versioned snapshot history
//! - **Sync**: Client writes carry the version they were based on; stale
//!   writes are settled by a conflict strategy
//! - **Events**: Inbound events are logged per component and dispatched to
//!   callbacks, and can be replayed later
//! - **Push**: The full current state is handed to the outbound transport on
//!   every change
//!
//! ## Example
//!
//! ```ignore
//! use component_sync::{Bridge, StateManager, StateSource, SyncConfig, Version};
//! use serde_json::json;
//!
//! let manager = Arc::new(StateManager::new(SyncConfig::default())?);
//! manager.set_state("counter", map(json!({"count": 0})), StateSource::Internal);
//!
//! let bridge = Bridge::new();
//! let m = Arc::clone(&manager);
//! bridge.register_callback("counter", "sync", move |data| {
//!     m.sync_from_client("counter", data.clone(), Version(1))?;
//!     Ok(())
//! });
//!
//! bridge.handle_event("counter", &json!({"event": "sync", "data": {"count": 1}}));
//! bridge.replay_events("counter");
//! ```

pub mod bridge;
pub mod config;
mod dispatch;
pub mod error;
pub mod state;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use bridge::{wrap_with_bridge, Bridge, EventCallback, EventLog, InboundEvent, StateListener};
pub use config::SyncConfig;
pub use error::{CallbackError, CallbackResult, Result, SyncError};
pub use state::{
    apply_diff, ConflictStrategy, FieldChange, Resolution, ResolverFn, RollbackTarget, StateDiff,
    StateHistory, StateManager, StateSubscriber, SubscriberId, SyncOutcome,
};
pub use subscriptions::{
    DropReason, PushConfig, PushEvent, PushFilter, PushHub, RenderArgs, SubscriptionHandle,
    SubscriptionId,
};
pub use types::*;
