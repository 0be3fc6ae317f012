use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::token::{ConcurrencyToken, LifecycleStatus};

/// Identifies one remote resource by kind (e.g. `"ip-set"`) and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Ordered set of `(key, attributes)` pairs declared by configuration.
///
/// Keys are unique; insertion order is preserved and drives the ordering of
/// every [`crate::ChangeSet`] computed from this state.
#[derive(Debug, Clone)]
pub struct DesiredState<K, A> {
    entries: IndexMap<K, A>,
}

impl<K: Eq + Hash, A> DesiredState<K, A> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Builds a desired state from pairs, rejecting duplicate keys.
    pub fn try_from_pairs<I>(pairs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (K, A)>,
        K: fmt::Display,
    {
        let mut state = Self::new();
        for (key, attributes) in pairs {
            state.insert(key, attributes)?;
        }
        Ok(state)
    }

    /// Adds one entry. Fails if the key is already declared.
    pub fn insert(&mut self, key: K, attributes: A) -> Result<(), CoreError>
    where
        K: fmt::Display,
    {
        if self.entries.contains_key(&key) {
            return Err(CoreError::duplicate_key(key.to_string()));
        }
        self.entries.insert(key, attributes);
        Ok(())
    }

    pub fn get(&self, key: &K) -> Option<&A> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &A)> {
        self.entries.iter()
    }
}

impl<K: Eq + Hash, A> Default for DesiredState<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

// Order-insensitive, like `IndexMap` equality.
impl<K: Eq + Hash, A: PartialEq> PartialEq for DesiredState<K, A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// The collection read back from the remote system at one point in time,
/// together with the resource's current token and lifecycle status.
#[derive(Debug, Clone)]
pub struct ObservedState<K, A> {
    entries: IndexMap<K, A>,
    token: Option<ConcurrencyToken>,
    status: Option<LifecycleStatus>,
}

impl<K: Eq + Hash, A> ObservedState<K, A> {
    pub fn new(entries: IndexMap<K, A>) -> Self {
        Self {
            entries,
            token: None,
            status: None,
        }
    }

    /// An observation with no entries, token or status.
    pub fn empty() -> Self {
        Self::new(IndexMap::new())
    }

    /// Builds an observation from pairs. The remote is authoritative, so a
    /// repeated key keeps the last value reported.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, A)>,
    {
        Self::new(pairs.into_iter().collect())
    }

    pub fn with_token(mut self, token: ConcurrencyToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_status(mut self, status: LifecycleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn token(&self) -> Option<&ConcurrencyToken> {
        self.token.as_ref()
    }

    pub fn status(&self) -> Option<&LifecycleStatus> {
        self.status.as_ref()
    }

    pub fn get(&self, key: &K) -> Option<&A> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &A)> {
        self.entries.iter()
    }
}

impl<K: Eq + Hash, A: PartialEq> PartialEq for ObservedState<K, A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries && self.token == other.token && self.status == other.status
    }
}
