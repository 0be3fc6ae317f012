//! State differ.

use std::hash::Hash;

use converge_core::{ChangeSet, DesiredState, ObservedState};
use indexmap::IndexSet;
use serde_json::Value;

/// Partitions keys into add/remove/modify buckets.
///
/// Additions and modifications follow the iteration order of `desired`;
/// removals follow the iteration order of `observed`. Identical inputs yield an
/// empty change set.
pub fn diff<K, A>(desired: &DesiredState<K, A>, observed: &ObservedState<K, A>) -> ChangeSet<K>
where
    K: Clone + Eq + Hash,
    A: PartialEq,
{
    let mut changes = ChangeSet::new();

    for (key, attributes) in desired.iter() {
        match observed.get(key) {
            None => changes.to_add.push(key.clone()),
            Some(current) if current != attributes => changes.to_modify.push(key.clone()),
            Some(_) => {}
        }
    }

    changes.to_remove = observed
        .keys()
        .filter(|key| !desired.contains_key(key))
        .cloned()
        .collect();

    changes
}

/// Diffs attribute concerns, where a `null` desired value means "cleared".
///
/// A cleared concern the remote no longer reports is already converged.
pub fn diff_attributes(
    desired: &DesiredState<String, Value>,
    observed: &ObservedState<String, Value>,
) -> ChangeSet<String> {
    let mut changes = diff(desired, observed);
    changes
        .to_add
        .retain(|key| !desired.get(key).is_some_and(Value::is_null));
    changes
}

/// Diffs two plain key lists (members without attributes).
///
/// `to_modify` is always empty. Duplicates collapse to their first occurrence.
pub fn diff_keys<K>(old: &[K], new: &[K]) -> ChangeSet<K>
where
    K: Clone + Eq + Hash,
{
    let old_set: IndexSet<&K> = old.iter().collect();
    let new_set: IndexSet<&K> = new.iter().collect();

    ChangeSet {
        to_add: new_set
            .iter()
            .filter(|key| !old_set.contains(*key))
            .map(|key| (*key).clone())
            .collect(),
        to_remove: old_set
            .iter()
            .filter(|key| !new_set.contains(*key))
            .map(|key| (*key).clone())
            .collect(),
        to_modify: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn desired(pairs: &[(&str, i32)]) -> DesiredState<String, i32> {
        DesiredState::try_from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), *v))).unwrap()
    }

    fn observed(pairs: &[(&str, i32)]) -> ObservedState<String, i32> {
        ObservedState::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), *v)))
    }

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_add_and_remove() {
        let changes = diff(
            &desired(&[("a", 1), ("b", 1), ("c", 1)]),
            &observed(&[("b", 1), ("c", 1), ("d", 1)]),
        );
        assert_eq!(changes.to_add, keys(&["a"]));
        assert_eq!(changes.to_remove, keys(&["d"]));
        assert!(changes.to_modify.is_empty());
    }

    #[test]
    fn test_diff_modify_follows_desired_order() {
        let changes = diff(
            &desired(&[("z", 2), ("new", 1), ("a", 2), ("same", 1)]),
            &observed(&[("a", 1), ("same", 1), ("z", 1)]),
        );
        assert_eq!(changes.to_modify, keys(&["z", "a"]));
        assert_eq!(changes.to_add, keys(&["new"]));
        assert!(changes.to_remove.is_empty());
    }

    #[test]
    fn test_diff_edge_cases() {
        let everything = observed(&[("x", 1), ("y", 2)]);
        let changes = diff(&DesiredState::new(), &everything);
        assert_eq!(changes.to_remove, keys(&["x", "y"]));
        assert!(changes.to_add.is_empty());

        let changes = diff(&desired(&[("x", 1), ("y", 2)]), &ObservedState::empty());
        assert_eq!(changes.to_add, keys(&["x", "y"]));

        let changes = diff(&desired(&[("x", 1), ("y", 2)]), &everything);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_diff_partition_properties() {
        let d = desired(&[("a", 1), ("b", 2), ("c", 3), ("e", 5)]);
        let o = observed(&[("b", 2), ("c", 4), ("d", 1), ("f", 0)]);
        let changes = diff(&d, &o);

        for key in &changes.to_add {
            assert!(!changes.to_remove.contains(key));
            assert!(d.contains_key(key) && !o.contains_key(key));
        }
        for key in &changes.to_remove {
            assert!(o.contains_key(key) && !d.contains_key(key));
        }
        assert_eq!(changes.to_add, keys(&["a", "e"]));
        assert_eq!(changes.to_remove, keys(&["d", "f"]));
        assert_eq!(changes.to_modify, keys(&["c"]));
        assert_eq!(changes.len(), 5);
    }

    #[test]
    fn test_diff_keys() {
        let changes = diff_keys(&keys(&["a", "b", "b", "c"]), &keys(&["c", "d", "a", "d"]));
        assert_eq!(changes.to_add, keys(&["d"]));
        assert_eq!(changes.to_remove, keys(&["b"]));
        assert!(changes.to_modify.is_empty());

        assert!(diff_keys::<String>(&[], &[]).is_empty());
    }

    #[test]
    fn test_cleared_attribute_absent_remotely_is_converged() {
        let desired = DesiredState::try_from_pairs([
            ("description".to_string(), Value::Null),
            ("scope".to_string(), json!("REGIONAL")),
        ])
        .unwrap();

        let before = ObservedState::from_pairs([
            ("description".to_string(), json!("old")),
            ("scope".to_string(), json!("REGIONAL")),
        ]);
        let changes = diff_attributes(&desired, &before);
        assert_eq!(changes.to_modify, keys(&["description"]));
        assert!(changes.to_add.is_empty());

        let after = ObservedState::from_pairs([("scope".to_string(), json!("REGIONAL"))]);
        assert!(diff_attributes(&desired, &after).is_empty());
    }
}
