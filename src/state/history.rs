//! Bounded, append-only snapshot history for one named state.

use crate::types::{StateMap, StateSnapshot, StateSource, Version};
use std::collections::VecDeque;

/// Where to roll a state back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RollbackTarget {
    /// A specific retained version.
    Version(Version),
    /// This many versions before the current one.
    Steps(u64),
}

/// Snapshot history of one named state.
///
/// Versions increase by exactly one per append. When full, the oldest
/// snapshot is evicted; surviving snapshots keep their version numbers.
#[derive(Clone, Debug)]
pub struct StateHistory {
    snapshots: VecDeque<StateSnapshot>,
    max_history: usize,
}

impl StateHistory {
    pub fn new(max_history: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn latest(&self) -> Option<&StateSnapshot> {
        self.snapshots.back()
    }

    pub fn current_state(&self) -> Option<&StateMap> {
        self.latest().map(|s| &s.state)
    }

    pub fn current_version(&self) -> Option<Version> {
        self.latest().map(|s| s.version)
    }

    /// Oldest version still retained.
    pub fn oldest_version(&self) -> Option<Version> {
        self.snapshots.front().map(|s| s.version)
    }

    /// Append `state` as the next version and return the new snapshot.
    pub fn push(&mut self, state: StateMap, source: StateSource) -> StateSnapshot {
        let version = self
            .current_version()
            .map(Version::next)
            .unwrap_or(Version::FIRST);
        let snapshot = StateSnapshot::new(state, version, source);

        while self.snapshots.len() >= self.max_history {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot.clone());
        snapshot
    }

    /// Drop everything and start a new chain with `snapshot` as version 1.
    pub fn restart(&mut self, mut snapshot: StateSnapshot) -> StateSnapshot {
        snapshot.version = Version::FIRST;
        self.snapshots.clear();
        self.snapshots.push_back(snapshot.clone());
        snapshot
    }

    pub fn get(&self, version: Version) -> Option<&StateSnapshot> {
        // Versions are contiguous, so the index is a direct offset.
        let oldest = self.oldest_version()?;
        if version < oldest {
            return None;
        }
        let idx = usize::try_from(version.0 - oldest.0).ok()?;
        self.snapshots.get(idx).filter(|s| s.version == version)
    }

    /// Last `limit` snapshots (all when `None`), oldest first.
    pub fn tail(&self, limit: Option<usize>) -> Vec<StateSnapshot> {
        let skip = match limit {
            Some(n) => self.snapshots.len().saturating_sub(n),
            None => 0,
        };
        self.snapshots.iter().skip(skip).cloned().collect()
    }

    /// Resolve a rollback target against the retained versions.
    pub fn resolve_target(&self, target: RollbackTarget) -> Option<Version> {
        let version = match target {
            RollbackTarget::Version(v) => v,
            RollbackTarget::Steps(n) => self.current_version()?.back(n)?,
        };
        self.get(version).map(|s| s.version)
    }

    /// Discard every snapshot newer than `target`. Returns the new latest.
    pub fn rollback(&mut self, target: RollbackTarget) -> Option<StateSnapshot> {
        let version = self.resolve_target(target)?;
        while self.current_version().is_some_and(|v| v > version) {
            self.snapshots.pop_back();
        }
        self.latest().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(n: i64) -> StateMap {
        json!({ "value": n }).as_object().cloned().unwrap()
    }

    fn filled(max: usize, count: i64) -> StateHistory {
        let mut history = StateHistory::new(max);
        for i in 1..=count {
            history.push(value(i), StateSource::Internal);
        }
        history
    }

    #[test]
    fn test_versions_start_at_one() {
        let history = filled(10, 3);
        let versions: Vec<u64> = history.tail(None).iter().map(|s| s.version.0).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(history.current_state(), Some(&value(3)));
    }

    #[test]
    fn test_eviction_keeps_version_numbers() {
        let history = filled(5, 6);
        assert_eq!(history.len(), 5);
        assert_eq!(history.oldest_version(), Some(Version(2)));
        assert_eq!(history.current_version(), Some(Version(6)));
        assert!(history.get(Version(1)).is_none());
        assert_eq!(history.get(Version(4)).unwrap().state, value(4));
    }

    #[test]
    fn test_tail_limit() {
        let history = filled(10, 5);
        let last = history.tail(Some(3));
        assert_eq!(last.len(), 3);
        assert_eq!(last[0].version, Version(3));
        assert_eq!(last[2].version, Version(5));
        assert_eq!(history.tail(Some(50)).len(), 5);
    }

    #[test]
    fn test_rollback_truncates() {
        let mut history = filled(10, 4);
        let restored = history.rollback(RollbackTarget::Version(Version(2))).unwrap();
        assert_eq!(restored.version, Version(2));
        assert_eq!(history.len(), 2);

        // Next write continues after the rollback point.
        let next = history.push(value(9), StateSource::Internal);
        assert_eq!(next.version, Version(3));
    }

    #[test]
    fn test_rollback_steps() {
        let mut history = filled(10, 3);
        let restored = history.rollback(RollbackTarget::Steps(1)).unwrap();
        assert_eq!(restored.version, Version(2));
        assert_eq!(restored.state, value(2));
    }

    #[test]
    fn test_rollback_to_missing_version_leaves_history() {
        let mut history = filled(3, 5);
        assert!(history.rollback(RollbackTarget::Version(Version(1))).is_none());
        assert!(history.rollback(RollbackTarget::Version(Version(9))).is_none());
        assert!(history.rollback(RollbackTarget::Steps(3)).is_none());
        assert_eq!(history.len(), 3);
        assert_eq!(history.current_version(), Some(Version(5)));
    }

    #[test]
    fn test_restart_begins_new_chain() {
        let mut history = filled(10, 4);
        let imported = StateSnapshot::new(value(42), Version(17), StateSource::External);
        let snapshot = history.restart(imported);
        assert_eq!(snapshot.version, Version(1));
        assert_eq!(snapshot.source, StateSource::External);
        assert_eq!(history.len(), 1);
    }
}
