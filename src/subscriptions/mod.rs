//! Outbound state pushes to the embedded script context.
//!
//! The transport itself is the host's concern. This module hands it the
//! full current state of a component whenever that state changes:
//! - Filtering by component name
//! - Bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let hub = Arc::new(PushHub::new());
//! let manager = StateManager::new(SyncConfig::default())?.with_push_hub(Arc::clone(&hub));
//!
//! let handle = hub.subscribe_component("counter");
//! manager.set_state("counter", state, StateSource::Internal);
//!
//! while let Ok(PushEvent::Render(args)) = handle.try_recv() {
//!     transport.post_render(&args);
//! }
//! ```

mod manager;
mod types;

pub use manager::PushHub;
pub use types::{
    DropReason, PushConfig, PushEvent, PushFilter, RenderArgs, SubscriptionHandle, SubscriptionId,
};
