/// Add/remove/modify partition produced by diffing desired against observed.
///
/// Invariants maintained by the differ:
/// - `to_add` and `to_remove` are disjoint
/// - every key appears in at most one bucket
/// - bucket order follows the desired state's iteration order (removals,
///   which are absent from desired, follow the observed order)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet<K> {
    pub to_add: Vec<K>,
    pub to_remove: Vec<K>,
    pub to_modify: Vec<K>,
}

impl<K> ChangeSet<K> {
    pub fn new() -> Self {
        Self {
            to_add: Vec::new(),
            to_remove: Vec::new(),
            to_modify: Vec::new(),
        }
    }

    /// Returns `true` when applying this change set would be a no-op.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_modify.is_empty()
    }

    /// Total number of keys across all buckets.
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len() + self.to_modify.len()
    }
}

impl<K> Default for ChangeSet<K> {
    fn default() -> Self {
        Self::new()
    }
}
