//! Key-level differences between two state mappings.

use crate::error::Result;
use crate::types::{ContentHash, StateMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Old and new value of a key present on both sides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Top-level difference between two mappings.
///
/// Values are compared by value; nested objects are not diffed recursively,
/// a changed nested object shows up as one modified key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    /// Keys in new but not old.
    pub added: StateMap,
    /// Keys in both with different values.
    pub modified: BTreeMap<String, FieldChange>,
    /// Keys in old but not new.
    pub removed: StateMap,
}

impl StateDiff {
    pub fn diff(old: &StateMap, new: &StateMap) -> Self {
        let mut diff = StateDiff::default();

        for (key, new_value) in new {
            match old.get(key) {
                None => {
                    diff.added.insert(key.clone(), new_value.clone());
                }
                Some(old_value) if old_value != new_value => {
                    diff.modified.insert(
                        key.clone(),
                        FieldChange {
                            old: old_value.clone(),
                            new: new_value.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }

        for (key, old_value) in old {
            if !new.contains_key(key) {
                diff.removed.insert(key.clone(), old_value.clone());
            }
        }

        diff
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.removed.is_empty()
    }

    /// Apply to `base`, producing a new mapping.
    ///
    /// `StateDiff::diff(old, new).apply(old) == new` for every pair.
    pub fn apply(&self, base: &StateMap) -> StateMap {
        let mut result = base.clone();
        for key in self.removed.keys() {
            result.remove(key);
        }
        for (key, change) in &self.modified {
            result.insert(key.clone(), change.new.clone());
        }
        for (key, value) in &self.added {
            result.insert(key.clone(), value.clone());
        }
        result
    }

    pub fn content_hash(&self) -> Result<ContentHash> {
        ContentHash::of_json(self)
    }
}

/// Free-function form of [`StateDiff::apply`].
pub fn apply_diff(base: &StateMap, diff: &StateDiff) -> StateMap {
    diff.apply(base)
}
