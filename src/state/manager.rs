//! Versioned state manager with optimistic-concurrency sync.

use crate::config::SyncConfig;
use crate::dispatch::{invoke_isolated, with_notify_depth};
use crate::error::{CallbackResult, Result, SyncError};
use crate::subscriptions::PushHub;
use crate::types::{StateMap, StateSnapshot, StateSource, UpdateMode, Version};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::diff::StateDiff;
use super::history::{RollbackTarget, StateHistory};
use super::resolver::{resolve, ConflictStrategy, Resolution, ResolverFn};

/// Callback invoked with each new snapshot of a named state.
pub type StateSubscriber = Arc<dyn Fn(&StateSnapshot) -> CallbackResult + Send + Sync>;

/// Identifies a subscription for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

/// Result of a client sync.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncOutcome {
    /// A new version was committed.
    Applied(StateSnapshot),
    /// The server kept its state; the client should adopt it.
    Rejected {
        server_state: StateMap,
        server_version: Version,
    },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Applied(_))
    }

    /// Server state returned to the client on rejection.
    pub fn conflict(&self) -> Option<&StateMap> {
        match self {
            SyncOutcome::Rejected { server_state, .. } => Some(server_state),
            SyncOutcome::Applied(_) => None,
        }
    }

    pub fn snapshot(&self) -> Option<&StateSnapshot> {
        match self {
            SyncOutcome::Applied(snapshot) => Some(snapshot),
            SyncOutcome::Rejected { .. } => None,
        }
    }
}

/// Everything tracked for one named state.
struct StateEntry {
    history: StateHistory,
    subscribers: Vec<(SubscriberId, StateSubscriber)>,
    resolver: Option<ResolverFn>,
}

impl StateEntry {
    fn new(max_history: usize) -> Self {
        Self {
            history: StateHistory::new(max_history),
            subscribers: Vec::new(),
            resolver: None,
        }
    }

    fn subscriber_fns(&self) -> Vec<StateSubscriber> {
        self.subscribers.iter().map(|(_, f)| Arc::clone(f)).collect()
    }
}

/// Manages versioned named states.
///
/// Each named state has its own lock, so writes to unrelated components do
/// not serialize. No lock is held while subscribers run, which lets a
/// subscriber write back into the manager.
pub struct StateManager {
    config: SyncConfig,
    entries: RwLock<HashMap<String, Arc<Mutex<StateEntry>>>>,
    /// Manager-wide resolver for `ConflictStrategy::Custom`.
    resolver: RwLock<Option<ResolverFn>>,
    push: Option<Arc<PushHub>>,
    next_subscriber: AtomicU64,
}

impl StateManager {
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            entries: RwLock::new(HashMap::new()),
            resolver: RwLock::new(None),
            push: None,
            next_subscriber: AtomicU64::new(1),
        })
    }

    /// Manager using `strategy` and default settings otherwise.
    pub fn with_strategy(strategy: ConflictStrategy) -> Self {
        Self {
            config: SyncConfig::with_strategy(strategy),
            ..Self::default()
        }
    }

    /// Push every change of a current state to `hub`.
    pub fn with_push_hub(mut self, hub: Arc<PushHub>) -> Self {
        self.push = Some(hub);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.config.conflict_resolution
    }

    /// Set the resolver used by `ConflictStrategy::Custom`.
    pub fn set_conflict_resolver<F>(&self, resolver: F)
    where
        F: Fn(&StateMap, &StateMap) -> StateMap + Send + Sync + 'static,
    {
        let resolver: ResolverFn = Arc::new(resolver);
        *self.resolver.write() = Some(resolver);
    }

    /// Set a resolver for one named state. Takes precedence over the
    /// manager-wide resolver.
    ///
    /// May be called before the state exists. Registering a resolver does
    /// not initialise the state: `get_state` stays `None` and the name is
    /// not listed by `state_names` until the first write.
    pub fn set_state_resolver<F>(&self, name: &str, resolver: F)
    where
        F: Fn(&StateMap, &StateMap) -> StateMap + Send + Sync + 'static,
    {
        let resolver: ResolverFn = Arc::new(resolver);
        self.entry(name).lock().resolver = Some(resolver);
    }

    // --- Writes ---

    /// Replace the state unconditionally, as a new version.
    pub fn set_state(&self, name: &str, state: StateMap, source: StateSource) -> StateSnapshot {
        self.commit(name, source, |_| state)
    }

    /// Apply a partial update as a new version.
    ///
    /// An unknown name is treated as having an empty current state.
    pub fn update_state(
        &self,
        name: &str,
        partial: StateMap,
        mode: UpdateMode,
        source: StateSource,
    ) -> StateSnapshot {
        self.commit(name, source, |current| mode.apply(current, partial))
    }

    /// Accept a write from the script context based on `client_version`.
    ///
    /// A matching version is adopted directly. A stale version is settled by
    /// the configured strategy; only `ServerWins` refuses the write, and that
    /// is reported as `SyncOutcome::Rejected`, not as an error.
    ///
    /// Fails only with `SyncError::MissingResolver` when the strategy is
    /// `Custom` and no resolver has been set. A custom resolver runs while
    /// the entry is locked and must not write to the same state.
    pub fn sync_from_client(
        &self,
        name: &str,
        client_state: StateMap,
        client_version: Version,
    ) -> Result<SyncOutcome> {
        let strategy = self.config.conflict_resolution;
        let entry = self.entry(name);

        let (snapshot, subscribers) = {
            let mut e = entry.lock();
            let custom = e.resolver.clone().or_else(|| self.resolver.read().clone());
            if strategy == ConflictStrategy::Custom && custom.is_none() {
                return Err(SyncError::MissingResolver);
            }

            let resolved = match e.history.latest() {
                None => client_state,
                Some(server) if server.version == client_version => client_state,
                Some(server) => {
                    debug!(
                        component = name,
                        client_version = client_version.0,
                        server_version = server.version.0,
                        ?strategy,
                        "sync conflict"
                    );
                    match resolve(strategy, &client_state, &server.state, custom.as_ref())? {
                        Resolution::Accept(state) => state,
                        Resolution::Reject => {
                            return Ok(SyncOutcome::Rejected {
                                server_state: server.state.clone(),
                                server_version: server.version,
                            });
                        }
                    }
                }
            };

            let snapshot = e.history.push(resolved, StateSource::External);
            self.push_render(name, &snapshot);
            (snapshot, e.subscriber_fns())
        };

        debug!(component = name, version = snapshot.version.0, "synced from client");
        notify(name, &snapshot, &subscribers);
        Ok(SyncOutcome::Applied(snapshot))
    }

    /// Roll back to an earlier retained version, discarding newer ones.
    ///
    /// Returns `None` if the state or the target version is not retained.
    /// Subscribers are not notified since no version is created; the push
    /// hub still receives the restored state.
    pub fn rollback(&self, name: &str, target: RollbackTarget) -> Option<StateSnapshot> {
        let entry = self.existing_entry(name)?;
        let restored = {
            let mut e = entry.lock();
            let restored = e.history.rollback(target);
            if let Some(snapshot) = &restored {
                self.push_render(name, snapshot);
            }
            restored
        };

        match &restored {
            Some(snapshot) => info!(component = name, version = snapshot.version.0, "rolled back state"),
            None => debug!(component = name, ?target, "rollback target not retained"),
        }

        restored
    }

    // --- Reads ---

    pub fn get_state(&self, name: &str) -> Option<StateMap> {
        let entry = self.existing_entry(name)?;
        let e = entry.lock();
        e.history.current_state().cloned()
    }

    pub fn get_snapshot(&self, name: &str) -> Option<StateSnapshot> {
        let entry = self.existing_entry(name)?;
        let e = entry.lock();
        e.history.latest().cloned()
    }

    pub fn get_version(&self, name: &str) -> Option<Version> {
        let entry = self.existing_entry(name)?;
        let e = entry.lock();
        e.history.current_version()
    }

    /// Retained snapshots, oldest first. `limit` keeps only the last N.
    pub fn get_history(&self, name: &str, limit: Option<usize>) -> Vec<StateSnapshot> {
        match self.existing_entry(name) {
            Some(entry) => entry.lock().history.tail(limit),
            None => Vec::new(),
        }
    }

    /// Changes from a retained version to the current state.
    pub fn get_diff(&self, name: &str, since: Version) -> Option<StateDiff> {
        let entry = self.existing_entry(name)?;
        let e = entry.lock();
        let old = e.history.get(since)?;
        let current = e.history.latest()?;
        Some(StateDiff::diff(&old.state, &current.state))
    }

    /// Names with at least one retained snapshot, sorted.
    pub fn state_names(&self) -> Vec<String> {
        let entries = self.entries.read();
        let mut names: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.lock().history.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    // --- Subscriptions ---

    /// Call `callback` with every new snapshot of `name`, in registration order.
    ///
    /// May be registered before the state exists.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> SubscriberId
    where
        F: Fn(&StateSnapshot) -> CallbackResult + Send + Sync + 'static,
    {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::SeqCst));
        self.entry(name).lock().subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, name: &str, id: SubscriberId) -> bool {
        let Some(entry) = self.existing_entry(name) else {
            return false;
        };
        let mut e = entry.lock();
        let before = e.subscribers.len();
        e.subscribers.retain(|(sid, _)| *sid != id);
        e.subscribers.len() != before
    }

    // --- Export / import ---

    /// Current snapshot as `{state, version, source, timestamp}` JSON.
    pub fn export_state(&self, name: &str) -> Result<Option<String>> {
        match self.get_snapshot(name) {
            Some(snapshot) => Ok(Some(serde_json::to_string(&snapshot)?)),
            None => Ok(None),
        }
    }

    /// Load an exported snapshot as the current state.
    ///
    /// Version numbers from another process are not comparable with local
    /// ones, so the import restarts the local chain at version 1, keeping the
    /// imported state, source and timestamp. Subscribers are notified.
    pub fn import_state(&self, name: &str, json: &str) -> Result<StateSnapshot> {
        let imported: StateSnapshot = serde_json::from_str(json)
            .map_err(|e| SyncError::Deserialization(e.to_string()))?;
        let exported_version = imported.version;

        let entry = self.entry(name);
        let (snapshot, subscribers) = {
            let mut e = entry.lock();
            let snapshot = e.history.restart(imported);
            self.push_render(name, &snapshot);
            (snapshot, e.subscriber_fns())
        };

        info!(component = name, exported_version = exported_version.0, "imported state");
        notify(name, &snapshot, &subscribers);
        Ok(snapshot)
    }

    /// Forget the state and history of one name, or of every name.
    ///
    /// Subscribers and per-state resolvers are kept.
    pub fn clear(&self, name: Option<&str>) {
        let cleared: Vec<String> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|(n, _)| name.map_or(true, |target| target == n.as_str()))
                .map(|(n, entry)| {
                    let mut e = entry.lock();
                    e.history = StateHistory::new(self.config.max_history);
                    if let Some(push) = &self.push {
                        push.push_cleared(n);
                    }
                    n.clone()
                })
                .collect()
        };

        info!(component = ?name, count = cleared.len(), "cleared state");
    }

    // --- Internals ---

    fn existing_entry(&self, name: &str) -> Option<Arc<Mutex<StateEntry>>> {
        self.entries.read().get(name).cloned()
    }

    fn entry(&self, name: &str) -> Arc<Mutex<StateEntry>> {
        if let Some(entry) = self.existing_entry(name) {
            return entry;
        }
        let mut entries = self.entries.write();
        Arc::clone(
            entries
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(StateEntry::new(self.config.max_history)))),
        )
    }

    /// Append a new version computed from the current state.
    fn commit<F>(&self, name: &str, source: StateSource, next: F) -> StateSnapshot
    where
        F: FnOnce(Option<&StateMap>) -> StateMap,
    {
        let entry = self.entry(name);
        let (snapshot, subscribers) = {
            let mut e = entry.lock();
            let state = next(e.history.current_state());
            let snapshot = e.history.push(state, source);
            self.push_render(name, &snapshot);
            (snapshot, e.subscriber_fns())
        };

        debug!(component = name, version = snapshot.version.0, ?source, "committed state");
        notify(name, &snapshot, &subscribers);
        snapshot
    }

    /// Must be called with the entry locked, so pushes for one name leave in
    /// version order. The hub never blocks.
    fn push_render(&self, name: &str, snapshot: &StateSnapshot) {
        if let Some(push) = &self.push {
            push.push_state(name, &snapshot.state, Some(snapshot.version));
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self {
            config: SyncConfig::default(),
            entries: RwLock::new(HashMap::new()),
            resolver: RwLock::new(None),
            push: None,
            next_subscriber: AtomicU64::new(1),
        }
    }
}

/// Run subscribers in order, isolating failures and bounding re-entry.
fn notify(name: &str, snapshot: &StateSnapshot, subscribers: &[StateSubscriber]) {
    if subscribers.is_empty() {
        return;
    }

    with_notify_depth("state_subscriber", name, || {
        for subscriber in subscribers {
            invoke_isolated("state_subscriber", name, || subscriber(snapshot));
        }
    });
}
