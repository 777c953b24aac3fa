//! The change set produced by comparing two flag snapshots.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// An opaque flag definition. The relay never interprets flag rules.
pub type FlagDefinition = serde_json::Value;

/// All flags of one tenant at one point in time, keyed by flag name.
pub type FlagSnapshot = HashMap<String, FlagDefinition>;

/// The two sides of an updated flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagChange {
    /// Definition before the reload
    pub before: FlagDefinition,
    /// Definition after the reload
    pub after: FlagDefinition,
}

/// Flags added, deleted and updated between two configuration loads.
///
/// A flag name appears in at most one of the three mappings: inserting a name
/// into one mapping removes it from the others, and deserializing a payload
/// that lists a name twice is rejected. An empty change set means "no change".
///
/// # Examples
///
/// ```rust
/// use flag_relay::changes::ChangeSet;
/// use serde_json::json;
///
/// let mut changes = ChangeSet::new();
/// changes.add("new-banner", json!({"variations": {"on": true}}));
/// changes.update("checkout", json!({"disable": false}), json!({"disable": true}));
///
/// assert_eq!(changes.len(), 2);
/// assert!(!changes.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChangeSet")]
pub struct ChangeSet {
    added: BTreeMap<String, FlagDefinition>,
    deleted: BTreeMap<String, FlagDefinition>,
    updated: BTreeMap<String, FlagChange>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the change set between two snapshots.
    ///
    /// Flags only in `old` are deleted, flags only in `new` are added, and flags
    /// present in both whose definitions differ are updated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flag_relay::changes::{ChangeSet, FlagSnapshot};
    /// use serde_json::json;
    ///
    /// let old: FlagSnapshot = [("a".to_string(), json!(1)), ("b".to_string(), json!(2))].into();
    /// let new: FlagSnapshot = [("b".to_string(), json!(3)), ("c".to_string(), json!(4))].into();
    ///
    /// let changes = ChangeSet::between(&old, &new);
    /// assert!(changes.deleted().contains_key("a"));
    /// assert!(changes.updated().contains_key("b"));
    /// assert!(changes.added().contains_key("c"));
    /// ```
    pub fn between(old: &FlagSnapshot, new: &FlagSnapshot) -> Self {
        let mut changes = Self::new();

        for (name, before) in old {
            match new.get(name) {
                None => {
                    changes.deleted.insert(name.clone(), before.clone());
                }
                Some(after) if after != before => {
                    changes.updated.insert(
                        name.clone(),
                        FlagChange {
                            before: before.clone(),
                            after: after.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }

        for (name, after) in new {
            if !old.contains_key(name) {
                changes.added.insert(name.clone(), after.clone());
            }
        }

        changes
    }

    /// Record a newly added flag.
    pub fn add(&mut self, name: impl Into<String>, definition: FlagDefinition) {
        let name = name.into();
        self.forget(&name);
        self.added.insert(name, definition);
    }

    /// Record a deleted flag with its last known definition.
    pub fn delete(&mut self, name: impl Into<String>, definition: FlagDefinition) {
        let name = name.into();
        self.forget(&name);
        self.deleted.insert(name, definition);
    }

    /// Record an updated flag.
    pub fn update(&mut self, name: impl Into<String>, before: FlagDefinition, after: FlagDefinition) {
        let name = name.into();
        self.forget(&name);
        self.updated.insert(name, FlagChange { before, after });
    }

    fn forget(&mut self, name: &str) {
        self.added.remove(name);
        self.deleted.remove(name);
        self.updated.remove(name);
    }

    /// Flags present only in the new snapshot.
    pub fn added(&self) -> &BTreeMap<String, FlagDefinition> {
        &self.added
    }

    /// Flags present only in the old snapshot.
    pub fn deleted(&self) -> &BTreeMap<String, FlagDefinition> {
        &self.deleted
    }

    /// Flags present in both snapshots with different definitions.
    pub fn updated(&self) -> &BTreeMap<String, FlagChange> {
        &self.updated
    }

    /// True when nothing was added, deleted or updated.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.updated.is_empty()
    }

    /// Total number of changed flags.
    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len() + self.updated.len()
    }

    /// Whether the named flag appears anywhere in the change set.
    pub fn contains(&self, name: &str) -> bool {
        self.added.contains_key(name) || self.deleted.contains_key(name) || self.updated.contains_key(name)
    }
}

/// Wire shape accepted on deserialization before the exclusivity check.
#[derive(Deserialize)]
struct RawChangeSet {
    #[serde(default)]
    added: BTreeMap<String, FlagDefinition>,
    #[serde(default)]
    deleted: BTreeMap<String, FlagDefinition>,
    #[serde(default)]
    updated: BTreeMap<String, FlagChange>,
}

impl TryFrom<RawChangeSet> for ChangeSet {
    type Error = String;

    fn try_from(raw: RawChangeSet) -> Result<Self, Self::Error> {
        let duplicate = raw
            .added
            .keys()
            .chain(raw.deleted.keys())
            .find(|name| raw.updated.contains_key(*name))
            .or_else(|| raw.added.keys().find(|name| raw.deleted.contains_key(*name)));

        if let Some(name) = duplicate {
            return Err(format!("flag '{}' appears in more than one change category", name));
        }

        Ok(Self {
            added: raw.added,
            deleted: raw.deleted,
            updated: raw.updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn snapshot(entries: &[(&str, i64)]) -> FlagSnapshot {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), json!({ "value": value })))
            .collect()
    }

    #[test]
    fn test_empty_change_set() {
        let changes = ChangeSet::new();
        assert!(changes.is_empty());
        assert_eq!(changes.len(), 0);
    }

    #[test]
    fn test_between_classifies_flags() {
        let old = snapshot(&[("gone", 1), ("same", 2), ("edited", 3)]);
        let new = snapshot(&[("same", 2), ("edited", 4), ("fresh", 5)]);

        let changes = ChangeSet::between(&old, &new);

        assert_eq!(changes.deleted().keys().collect::<Vec<_>>(), vec!["gone"]);
        assert_eq!(changes.added().keys().collect::<Vec<_>>(), vec!["fresh"]);
        assert_eq!(changes.updated().keys().collect::<Vec<_>>(), vec!["edited"]);
        assert_eq!(changes.updated()["edited"].before, json!({"value": 3}));
        assert_eq!(changes.updated()["edited"].after, json!({"value": 4}));
        assert!(!changes.contains("same"));
    }

    #[test]
    fn test_between_identical_snapshots_is_empty() {
        let old = snapshot(&[("a", 1), ("b", 2)]);
        assert!(ChangeSet::between(&old, &old.clone()).is_empty());
    }

    #[test]
    fn test_insert_moves_name_between_categories() {
        let mut changes = ChangeSet::new();
        changes.add("flag", json!(1));
        changes.delete("flag", json!(1));

        assert!(changes.added().is_empty());
        assert!(changes.deleted().contains_key("flag"));

        changes.update("flag", json!(1), json!(2));
        assert!(changes.deleted().is_empty());
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_serde_shape() {
        let mut changes = ChangeSet::new();
        changes.update("f3", json!("a"), json!("b"));

        let value = serde_json::to_value(&changes).unwrap();
        assert_eq!(
            value,
            json!({
                "added": {},
                "deleted": {},
                "updated": { "f3": { "before": "a", "after": "b" } }
            })
        );
    }

    #[test]
    fn test_deserialize_rejects_duplicate_names() {
        let payload = json!({
            "added": { "f": 1 },
            "deleted": { "f": 1 }
        });
        assert!(serde_json::from_value::<ChangeSet>(payload).is_err());

        let payload = json!({
            "deleted": { "f": 1 },
            "updated": { "f": { "before": 1, "after": 2 } }
        });
        assert!(serde_json::from_value::<ChangeSet>(payload).is_err());
    }

    #[test]
    fn test_deserialize_missing_categories_default_to_empty() {
        let changes: ChangeSet = serde_json::from_value(json!({ "added": { "f": true } })).unwrap();
        assert_eq!(changes.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_between_keeps_names_exclusive(
            old in prop::collection::hash_map("[a-e]", 0i64..3, 0..5),
            new in prop::collection::hash_map("[a-e]", 0i64..3, 0..5),
        ) {
            let old: FlagSnapshot = old.into_iter().map(|(k, v)| (k, json!(v))).collect();
            let new: FlagSnapshot = new.into_iter().map(|(k, v)| (k, json!(v))).collect();

            let changes = ChangeSet::between(&old, &new);

            for name in old.keys().chain(new.keys()) {
                let hits = changes.added().contains_key(name) as u8
                    + changes.deleted().contains_key(name) as u8
                    + changes.updated().contains_key(name) as u8;
                prop_assert!(hits <= 1);
            }
        }

        #[test]
        fn prop_mutators_keep_names_exclusive(ops in prop::collection::vec((0u8..3, "[a-c]"), 0..20)) {
            let mut changes = ChangeSet::new();
            for (op, name) in ops {
                match op {
                    0 => changes.add(name, json!(1)),
                    1 => changes.delete(name, json!(1)),
                    _ => changes.update(name, json!(1), json!(2)),
                }
            }

            for name in ["a", "b", "c"] {
                let hits = changes.added().contains_key(name) as u8
                    + changes.deleted().contains_key(name) as u8
                    + changes.updated().contains_key(name) as u8;
                prop_assert!(hits <= 1);
            }
        }
    }
}
