use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque optimistic-concurrency value (a version id or update token).
///
/// Every mutating remote call returns a fresh token which must be supplied
/// on the next mutating call for the same resource. Tokens are never
/// persisted beyond a single reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConcurrencyToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConcurrencyToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status string reported by the remote system (e.g. `"CREATING"`).
///
/// Statuses are compared verbatim; the engine never interprets them beyond
/// set membership in a [`crate::WaitSpec`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifecycleStatus(String);

impl LifecycleStatus {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LifecycleStatus {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LifecycleStatus {
    fn from(value: String) -> Self {
        Self(value)
    }
}
