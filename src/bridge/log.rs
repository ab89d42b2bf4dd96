//! Per-component event log.

use crate::types::Event;
use std::collections::HashMap;

/// Recorded inbound events, grouped by component.
///
/// Within a component events keep arrival order. Components are iterated in
/// the order their first event arrived.
#[derive(Debug, Default)]
pub struct EventLog {
    order: Vec<String>,
    channels: HashMap<String, Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: Event) {
        match self.channels.get_mut(&event.component_name) {
            Some(events) => events.push(event),
            None => {
                self.order.push(event.component_name.clone());
                self.channels.insert(event.component_name.clone(), vec![event]);
            }
        }
    }

    /// Events of one component, in arrival order.
    pub fn events(&self, component: &str) -> &[Event] {
        self.channels
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Components with recorded events, in first-arrival order.
    pub fn components(&self) -> &[String] {
        &self.order
    }

    /// Total number of recorded events.
    pub fn len(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Matching events, optionally restricted to the last `limit` matches.
    ///
    /// With no component, logs are concatenated component by component; the
    /// result is not globally ordered by time.
    pub fn query(
        &self,
        component: Option<&str>,
        event_type: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<Event> {
        let components: Vec<&str> = match component {
            Some(c) => vec![c],
            None => self.order.iter().map(String::as_str).collect(),
        };

        let matching: Vec<&Event> = components
            .into_iter()
            .flat_map(|c| self.events(c))
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .collect();

        let skip = limit.map_or(0, |n| matching.len().saturating_sub(n));
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Clear one component's log, or every log.
    pub fn clear(&mut self, component: Option<&str>) {
        match component {
            Some(c) => {
                self.channels.remove(c);
                self.order.retain(|name| name != c);
            }
            None => {
                self.channels.clear();
                self.order.clear();
            }
        }
    }
}
