//! Types for outbound render pushes.

use crate::types::{StateMap, Version};
use serde::{Deserialize, Serialize};

/// Configuration for a push subscription.
#[derive(Clone, Debug)]
pub struct PushConfig {
    /// Max buffered pushes before the subscriber is dropped.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: PushFilter,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: PushFilter::default(),
        }
    }
}

/// Which components a subscriber receives pushes for.
#[derive(Clone, Debug, Default)]
pub struct PushFilter {
    /// Component names (None = all components).
    pub components: Option<Vec<String>>,
}

impl PushFilter {
    /// Receive pushes for every component.
    pub fn all() -> Self {
        Self::default()
    }

    /// Receive pushes for the named components only.
    pub fn components(names: Vec<String>) -> Self {
        Self {
            components: Some(names),
        }
    }

    pub(crate) fn matches(&self, component: &str) -> bool {
        match &self.components {
            Some(names) => names.iter().any(|n| n == component),
            None => true,
        }
    }
}

/// Payload handed to the embedded script context on render.
///
/// Always the full current state, never a diff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderArgs {
    pub component: String,
    pub state: StateMap,
    /// Version of `state` when it comes from the versioned manager.
    pub version: Option<Version>,
}

/// Events delivered to push subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// A component's current state changed.
    Render(RenderArgs),

    /// A component's state was cleared.
    Cleared { component: String },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiver went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a push subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to receive pushes.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<PushEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<PushEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<PushEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<PushEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<PushEvent> {
        self.receiver.try_iter().collect()
    }
}
