//! Wire-neutral types exchanged with a remote API.

use std::fmt;

use converge_core::{ConcurrencyToken, LifecycleStatus, ObservedState, ResourceRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// A resource as reported by the remote system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource {
    /// Kind and id.
    pub resource: ResourceRef,
    /// Token the next mutating call must carry.
    pub token: ConcurrencyToken,
    /// Lifecycle status (e.g. `CREATING`, `ACTIVE`).
    pub status: LifecycleStatus,
    /// Top-level attributes, keyed by concern name.
    pub attributes: IndexMap<String, Value>,
    /// Associated members (addresses, secrets, rules ...), keyed by member key.
    pub members: IndexMap<String, Value>,
    /// When the remote last changed this resource.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl RemoteResource {
    /// Creates a new `RemoteResource` with no attributes or members.
    #[must_use]
    pub fn new(
        resource: ResourceRef,
        token: ConcurrencyToken,
        status: impl Into<LifecycleStatus>,
    ) -> Self {
        Self {
            resource,
            token,
            status: status.into(),
            attributes: IndexMap::new(),
            members: IndexMap::new(),
            last_updated: OffsetDateTime::now_utc(),
        }
    }

    /// The member collection as an observation carrying this resource's token and status.
    #[must_use]
    pub fn observed_members(&self) -> ObservedState<String, Value> {
        ObservedState::new(self.members.clone())
            .with_token(self.token.clone())
            .with_status(self.status.clone())
    }

    /// The attribute concerns as an observation carrying this resource's token and status.
    #[must_use]
    pub fn observed_attributes(&self) -> ObservedState<String, Value> {
        ObservedState::new(self.attributes.clone())
            .with_token(self.token.clone())
            .with_status(self.status.clone())
    }
}

/// One member sent in a batch-associate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub key: String,
    pub value: Value,
}

impl Member {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// A member the remote refused to process, with its per-item reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedItem {
    pub key: String,
    pub code: String,
    pub message: String,
}

impl RejectedItem {
    pub fn new(key: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Result of a batch associate/disassociate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Token after the call; the call is a mutation even if some items were rejected.
    pub token: ConcurrencyToken,
    /// Items the remote did not process.
    pub rejected: Vec<RejectedItem>,
}

impl BatchOutcome {
    pub fn accepted(token: ConcurrencyToken) -> Self {
        Self {
            token,
            rejected: Vec::new(),
        }
    }

    pub fn with_rejected(mut self, rejected: Vec<RejectedItem>) -> Self {
        self.rejected = rejected;
        self
    }

    /// Every item in the call was applied.
    pub fn is_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}
