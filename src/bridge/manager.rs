//! Event bridge between the host process and embedded script contexts.

use crate::dispatch::{invoke_isolated, with_notify_depth};
use crate::error::{CallbackResult, Result};
use crate::state::SubscriberId;
use crate::subscriptions::PushHub;
use crate::types::{Event, StateMap, UpdateMode};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::log::EventLog;

/// Handler for one `(component, event_type)` pair. Receives the event data.
pub type EventCallback = Arc<dyn Fn(&StateMap) -> CallbackResult + Send + Sync>;

/// Subscriber to the bridge's simple key-value state.
pub type StateListener = Arc<dyn Fn(&StateMap) -> CallbackResult + Send + Sync>;

/// Inbound message from the script context: `{event, data}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event: String,
    #[serde(default)]
    pub data: StateMap,
}

impl InboundEvent {
    pub fn new(event: impl Into<String>, data: StateMap) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Routes inbound events to callbacks and records them for replay.
///
/// Also carries a simple, unversioned key-value state per component with
/// multi-subscriber notification, for callers that do not need the
/// versioned [`StateManager`](crate::StateManager).
pub struct Bridge {
    /// component -> event type -> callback. Last registration wins.
    callbacks: RwLock<HashMap<String, HashMap<String, EventCallback>>>,
    log: RwLock<EventLog>,
    states: RwLock<HashMap<String, StateMap>>,
    listeners: RwLock<HashMap<String, Vec<(SubscriberId, StateListener)>>>,
    push: Option<Arc<PushHub>>,
    next_listener: AtomicU64,
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(HashMap::new()),
            log: RwLock::new(EventLog::new()),
            states: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            push: None,
            next_listener: AtomicU64::new(1),
        }
    }

    /// Push every change of the key-value state to `hub`.
    pub fn with_push_hub(mut self, hub: Arc<PushHub>) -> Self {
        self.push = Some(hub);
        self
    }

    // --- Callbacks ---

    /// Register the handler for `event_type` on `component`, replacing any
    /// previous one.
    pub fn register_callback<F>(&self, component: &str, event_type: &str, callback: F)
    where
        F: Fn(&StateMap) -> CallbackResult + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .entry(component.to_string())
            .or_default()
            .insert(event_type.to_string(), Arc::new(callback));
    }

    /// Returns false if nothing was registered.
    pub fn unregister_callback(&self, component: &str, event_type: &str) -> bool {
        let mut callbacks = self.callbacks.write();
        let Some(by_type) = callbacks.get_mut(component) else {
            return false;
        };
        let removed = by_type.remove(event_type).is_some();
        if by_type.is_empty() {
            callbacks.remove(component);
        }
        removed
    }

    /// Remove the callbacks of one component, or all callbacks.
    pub fn clear_callbacks(&self, component: Option<&str>) {
        let mut callbacks = self.callbacks.write();
        match component {
            Some(c) => {
                callbacks.remove(c);
            }
            None => callbacks.clear(),
        }
    }

    pub fn has_callback(&self, component: &str, event_type: &str) -> bool {
        self.callback(component, event_type).is_some()
    }

    fn callback(&self, component: &str, event_type: &str) -> Option<EventCallback> {
        self.callbacks
            .read()
            .get(component)
            .and_then(|by_type| by_type.get(event_type))
            .cloned()
    }

    // --- Inbound events ---

    /// Handle a raw inbound payload `{event: string, data?: object}`.
    ///
    /// Payloads without a non-empty string `event` are logged and ignored.
    /// A missing or null `data` is treated as an empty mapping.
    pub fn handle_event(&self, component: &str, payload: &Value) -> Option<Event> {
        let Some(event_type) = payload
            .get("event")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        else {
            warn!(component, "inbound payload has no event type, ignoring");
            return None;
        };

        let data = match payload.get("data") {
            None | Some(Value::Null) => StateMap::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                warn!(component, event = event_type, data = %other, "event data is not an object, using empty mapping");
                StateMap::new()
            }
        };

        Some(self.handle_inbound(component, InboundEvent::new(event_type, data)))
    }

    /// Record an inbound event and dispatch it.
    ///
    /// The event is logged before dispatch, whether or not a callback is
    /// registered and whether or not the callback fails.
    pub fn handle_inbound(&self, component: &str, inbound: InboundEvent) -> Event {
        let event = Event::new(component, inbound.event, inbound.data);
        self.log.write().record(event.clone());
        self.dispatch(&event);
        event
    }

    /// Returns true if a callback was found.
    fn dispatch(&self, event: &Event) -> bool {
        match self.callback(&event.component_name, &event.event_type) {
            Some(callback) => {
                debug!(component = %event.component_name, event = %event.event_type, "dispatching event");
                invoke_isolated("event_callback", &event.component_name, || callback(&event.data));
                true
            }
            None => {
                debug!(component = %event.component_name, event = %event.event_type, "no callback registered");
                false
            }
        }
    }

    // --- Event log ---

    /// Recorded events, filtered by component and type. `limit` keeps the
    /// last N matches.
    pub fn get_event_history(
        &self,
        component: Option<&str>,
        event_type: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<Event> {
        self.log.read().query(component, event_type, limit)
    }

    /// Re-dispatch every logged event of `component`, oldest first.
    ///
    /// Each event goes to the callback registered at replay time. The log is
    /// not modified. Returns how many events found a callback.
    pub fn replay_events(&self, component: &str) -> usize {
        let events = self.log.read().events(component).to_vec();
        let dispatched = events.iter().filter(|event| self.dispatch(event)).count();
        debug!(component, total = events.len(), dispatched, "replayed events");
        dispatched
    }

    /// Log of `component` as a JSON array of `{component, event, data, timestamp}`.
    pub fn export_events(&self, component: &str) -> Result<String> {
        let log = self.log.read();
        Ok(serde_json::to_string(log.events(component))?)
    }

    /// Clear one component's log, or all logs.
    pub fn clear_event_history(&self, component: Option<&str>) {
        self.log.write().clear(component);
        info!(component = ?component, "cleared event history");
    }

    // --- Simple key-value state ---

    /// Replace a component's state and notify its listeners.
    pub fn set_state(&self, component: &str, state: StateMap) {
        {
            let mut states = self.states.write();
            states.insert(component.to_string(), state.clone());
            self.push_render(component, &state);
        }
        self.notify(component, &state);
    }

    pub fn get_state(&self, component: &str) -> Option<StateMap> {
        self.states.read().get(component).cloned()
    }

    /// Merge into or replace a component's state and notify its listeners.
    pub fn update_state(&self, component: &str, partial: StateMap, mode: UpdateMode) {
        let next = {
            let mut states = self.states.write();
            let next = mode.apply(states.get(component), partial);
            states.insert(component.to_string(), next.clone());
            self.push_render(component, &next);
            next
        };
        self.notify(component, &next);
    }

    /// Call `listener` with the full state on every change, in registration
    /// order.
    pub fn subscribe_to_state<F>(&self, component: &str, listener: F) -> SubscriberId
    where
        F: Fn(&StateMap) -> CallbackResult + Send + Sync + 'static,
    {
        let id = SubscriberId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .write()
            .entry(component.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn unsubscribe_from_state(&self, component: &str, id: SubscriberId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(component) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        list.len() != before
    }

    /// Called with the states lock held, so pushes leave in write order.
    fn push_render(&self, component: &str, state: &StateMap) {
        if let Some(push) = &self.push {
            push.push_state(component, state, None);
        }
    }

    fn notify(&self, component: &str, state: &StateMap) {
        let listeners: Vec<StateListener> = self
            .listeners
            .read()
            .get(component)
            .map(|list| list.iter().map(|(_, f)| Arc::clone(f)).collect())
            .unwrap_or_default();

        if listeners.is_empty() {
            return;
        }

        with_notify_depth("state_listener", component, || {
            for listener in &listeners {
                invoke_isolated("state_listener", component, || listener(state));
            }
        });
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn map(v: Value) -> StateMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_kv_state_merge_and_replace() {
        let bridge = Bridge::new();

        bridge.set_state("c", map(json!({"count": 0})));
        bridge.update_state("c", map(json!({"count": 1})), UpdateMode::Merge);
        assert_eq!(bridge.get_state("c"), Some(map(json!({"count": 1}))));

        bridge.update_state("c", map(json!({"name": "test"})), UpdateMode::Merge);
        assert_eq!(bridge.get_state("c"), Some(map(json!({"count": 1, "name": "test"}))));

        bridge.update_state("c", map(json!({"value": 42})), UpdateMode::Replace);
        assert_eq!(bridge.get_state("c"), Some(map(json!({"value": 42}))));
        assert!(bridge.get_state("other").is_none());
    }

    #[test]
    fn test_kv_listeners() {
        let bridge = Bridge::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = bridge.subscribe_to_state("comp", move |state| {
            sink.lock().push(state.clone());
            Ok(())
        });

        bridge.set_state("comp", map(json!({"x": 1})));
        bridge.update_state("comp", map(json!({"x": 2})), UpdateMode::Merge);
        assert_eq!(*seen.lock(), vec![map(json!({"x": 1})), map(json!({"x": 2}))]);

        assert!(bridge.unsubscribe_from_state("comp", id));
        assert!(!bridge.unsubscribe_from_state("comp", id));
        bridge.set_state("comp", map(json!({"x": 3})));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_self_feeding_listener_is_bounded() {
        let bridge = Arc::new(Bridge::new());
        let inner = Arc::clone(&bridge);
        bridge.subscribe_to_state("loop", move |state| {
            let n = state.get("n").and_then(Value::as_u64).unwrap_or(0);
            inner.set_state("loop", map(json!({"n": n + 1})));
            Ok(())
        });

        bridge.set_state("loop", map(json!({"n": 0})));

        // One nested write per allowed depth.
        let n = bridge.get_state("loop").and_then(|s| s.get("n").and_then(Value::as_u64));
        assert_eq!(n, Some(crate::dispatch::MAX_NOTIFY_DEPTH as u64));
    }

    #[test]
    fn test_payload_without_event_is_ignored() {
        let bridge = Bridge::new();
        assert!(bridge.handle_event("c", &json!({"data": {}})).is_none());
        assert!(bridge.handle_event("c", &json!({"event": ""})).is_none());
        assert!(bridge.handle_event("c", &json!({"event": 5})).is_none());
        assert!(bridge.handle_event("c", &json!("click")).is_none());
        assert!(bridge.get_event_history(None, None, None).is_empty());
    }

    #[test]
    fn test_missing_data_defaults_to_empty() {
        let bridge = Bridge::new();
        let received = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&received);
        bridge.register_callback("c", "ping", move |data| {
            *sink.lock() = Some(data.clone());
            Ok(())
        });

        let event = bridge.handle_event("c", &json!({"event": "ping"})).unwrap();
        assert!(event.data.is_empty());
        assert_eq!(*received.lock(), Some(StateMap::new()));

        let event = bridge.handle_event("c", &json!({"event": "ping", "data": [1, 2]})).unwrap();
        assert!(event.data.is_empty());
    }

    #[test]
    fn test_last_registration_wins() {
        let bridge = Bridge::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&calls);
        bridge.register_callback("c", "click", move |_| {
            first.lock().push("first");
            Ok(())
        });
        let second = Arc::clone(&calls);
        bridge.register_callback("c", "click", move |_| {
            second.lock().push("second");
            Ok(())
        });

        bridge.handle_event("c", &json!({"event": "click"}));
        assert_eq!(*calls.lock(), vec!["second"]);
    }

    #[test]
    fn test_unregister_and_clear_callbacks() {
        let bridge = Bridge::new();
        bridge.register_callback("a", "x", |_| Ok(()));
        bridge.register_callback("a", "y", |_| Ok(()));
        bridge.register_callback("b", "x", |_| Ok(()));

        assert!(bridge.unregister_callback("a", "x"));
        assert!(!bridge.unregister_callback("a", "x"));
        assert!(bridge.has_callback("a", "y"));

        bridge.clear_callbacks(Some("a"));
        assert!(!bridge.has_callback("a", "y"));
        assert!(bridge.has_callback("b", "x"));

        bridge.clear_callbacks(None);
        assert!(!bridge.has_callback("b", "x"));
    }

    #[test]
    fn test_callback_can_reenter_bridge() {
        let bridge = Arc::new(Bridge::new());
        let inner = Arc::clone(&bridge);
        bridge.register_callback("counter", "increment", move |data| {
            let by = data.get("by").and_then(Value::as_i64).unwrap_or(1);
            let current = inner
                .get_state("counter")
                .and_then(|s| s.get("count").and_then(Value::as_i64))
                .unwrap_or(0);
            inner.update_state("counter", map(json!({"count": current + by})), UpdateMode::Merge);
            Ok(())
        });

        bridge.handle_event("counter", &json!({"event": "increment", "data": {"by": 2}}));
        bridge.handle_event("counter", &json!({"event": "increment"}));
        assert_eq!(bridge.get_state("counter"), Some(map(json!({"count": 3}))));
    }
}
