//! Push hub broadcasting render args to the script-context transport.

use crate::config::SyncConfig;
use crate::types::{StateMap, Version};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::types::{
    DropReason, PushConfig, PushEvent, PushFilter, RenderArgs, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    filter: PushFilter,
    sender: Sender<PushEvent>,
}

impl Subscription {
    /// Try to send an event. Returns the drop reason if it could not be queued.
    fn try_send(&self, event: PushEvent) -> Option<DropReason> {
        match self.sender.try_send(event) {
            Ok(()) => None,
            Err(TrySendError::Full(_)) => Some(DropReason::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Some(DropReason::Disconnected),
        }
    }
}

/// Fans state pushes out to bounded channels.
///
/// Sending never blocks: a subscriber whose buffer is full is dropped.
pub struct PushHub {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Buffer size used by `subscribe_all` / `subscribe_component`.
    default_buffer: usize,
}

impl PushHub {
    pub fn new() -> Self {
        Self::with_buffer_size(PushConfig::default().buffer_size)
    }

    /// Hub whose default buffer is `config.push_buffer_size`.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::with_buffer_size(config.push_buffer_size)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            default_buffer: buffer_size.max(1),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: PushConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscriptions.write().insert(
            id,
            Subscription {
                filter: config.filter,
                sender,
            },
        );

        SubscriptionHandle { id, receiver }
    }

    /// Subscribe to every component with the hub's default buffer.
    pub fn subscribe_all(&self) -> SubscriptionHandle {
        self.subscribe(PushConfig {
            buffer_size: self.default_buffer,
            filter: PushFilter::all(),
        })
    }

    /// Subscribe to one component with the hub's default buffer.
    pub fn subscribe_component(&self, component: &str) -> SubscriptionHandle {
        self.subscribe(PushConfig {
            buffer_size: self.default_buffer,
            filter: PushFilter::components(vec![component.to_string()]),
        })
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            let _ = sub.sender.try_send(PushEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Push a component's full current state.
    pub fn push_state(&self, component: &str, state: &StateMap, version: Option<Version>) {
        let event = PushEvent::Render(RenderArgs {
            component: component.to_string(),
            state: state.clone(),
            version,
        });
        self.broadcast(component, event);
    }

    /// Tell subscribers a component's state is gone.
    pub fn push_cleared(&self, component: &str) {
        let event = PushEvent::Cleared {
            component: component.to_string(),
        };
        self.broadcast(component, event);
    }

    /// Drops subscribers that fail to receive.
    fn broadcast(&self, component: &str, event: PushEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.filter.matches(component) {
                    if let Some(reason) = sub.try_send(event.clone()) {
                        to_remove.push((*id, reason));
                    }
                }
            }
        }

        if to_remove.is_empty() {
            debug!(component, "pushed state");
            return;
        }

        let mut subs = self.subscriptions.write();
        for (id, reason) in to_remove {
            if let Some(sub) = subs.remove(&id) {
                warn!(component, subscription = id.0, ?reason, "dropping push subscriber");
                // Best effort; the buffer is probably still full.
                let _ = sub.sender.try_send(PushEvent::Dropped { reason });
            }
        }
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}
