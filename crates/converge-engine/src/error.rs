//! Error types for reconciliation passes.
//!
//! Not-found and first-time conflicts are absorbed inside the engine; what
//! reaches the caller is one of the [`EngineError`] variants below, each naming
//! the resource and the concern that failed.

use std::fmt;
use std::time::Duration;

use converge_core::{ConcurrencyToken, CoreError, LifecycleStatus, ResourceRef, UnprocessedItem};
use converge_remote::RemoteError;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by a reconciliation pass.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The token was stale again after one refresh.
    #[error("{resource}: {concern} conflicted again after refreshing the token: {source}")]
    Conflict {
        resource: ResourceRef,
        concern: String,
        #[source]
        source: RemoteError,
    },

    /// A transient error outlasted the retry budget.
    #[error("{resource}: {concern} still failing after retry budget: {source}")]
    Transient {
        resource: ResourceRef,
        concern: String,
        #[source]
        source: RemoteError,
    },

    /// Any other remote error.
    #[error("{resource}: {concern} failed: {source}")]
    Remote {
        resource: ResourceRef,
        concern: String,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    PartialBatch(#[from] PartialBatchFailure),

    #[error("{resource}: reached failure status {status} (expected one of {expected:?})")]
    TerminalState {
        resource: ResourceRef,
        status: LifecycleStatus,
        expected: Vec<String>,
    },

    #[error("{resource}: unexpected status {status} (expected one of {expected:?})")]
    UnexpectedState {
        resource: ResourceRef,
        status: LifecycleStatus,
        expected: Vec<String>,
    },

    #[error("{resource}: timed out after {}ms waiting for {expected:?} (last status: {})",
        .elapsed.as_millis(),
        .last_status.as_ref().map_or("<none>", LifecycleStatus::as_str))]
    Timeout {
        resource: ResourceRef,
        last_status: Option<LifecycleStatus>,
        elapsed: Duration,
        expected: Vec<String>,
    },

    /// A wait gave up after too many consecutive absent reads.
    #[error("{resource}: not found after {checks} consecutive checks")]
    NotFound { resource: ResourceRef, checks: u32 },

    /// A wait that does not tolerate absence saw no resource.
    #[error("{resource}: resource disappeared while waiting")]
    Absent { resource: ResourceRef },

    #[error("invalid wait spec: {0}")]
    InvalidWaitSpec(#[from] CoreError),

    #[error(transparent)]
    Mutation(Box<MutationFailure>),
}

impl EngineError {
    /// Wraps a remote error that escaped the retrier.
    pub fn from_remote(
        resource: &ResourceRef,
        concern: impl Into<String>,
        source: RemoteError,
        transient: bool,
    ) -> Self {
        let resource = resource.clone();
        let concern = concern.into();
        if source.is_conflict() {
            Self::Conflict {
                resource,
                concern,
                source,
            }
        } else if transient {
            Self::Transient {
                resource,
                concern,
                source,
            }
        } else {
            Self::Remote {
                resource,
                concern,
                source,
            }
        }
    }

    /// The resource this error is about, when it names one.
    pub fn resource(&self) -> Option<&ResourceRef> {
        match self {
            Self::Conflict { resource, .. }
            | Self::Transient { resource, .. }
            | Self::Remote { resource, .. }
            | Self::TerminalState { resource, .. }
            | Self::UnexpectedState { resource, .. }
            | Self::Timeout { resource, .. }
            | Self::NotFound { resource, .. }
            | Self::Absent { resource } => Some(resource),
            Self::PartialBatch(failure) => Some(&failure.resource),
            Self::Mutation(failure) => Some(&failure.resource),
            Self::InvalidWaitSpec(_) => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Mutation(failure) => failure.source.is_conflict(),
            _ => false,
        }
    }

    /// The partial-batch detail, directly or from inside a mutation failure.
    pub fn partial_batch(&self) -> Option<&PartialBatchFailure> {
        match self {
            Self::PartialBatch(failure) => Some(failure),
            Self::Mutation(failure) => failure.source.partial_batch(),
            _ => None,
        }
    }
}

impl From<MutationFailure> for EngineError {
    fn from(failure: MutationFailure) -> Self {
        Self::Mutation(Box::new(failure))
    }
}

/// Items a batch step could not process, across every chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialBatchFailure {
    pub resource: ResourceRef,
    pub concern: String,
    pub unprocessed: Vec<UnprocessedItem<String>>,
}

impl PartialBatchFailure {
    /// Keys of every unprocessed item, in submission order.
    pub fn keys(&self) -> Vec<&str> {
        self.unprocessed.iter().map(|u| u.item.as_str()).collect()
    }
}

impl fmt::Display for PartialBatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} item(s) of {} not processed",
            self.resource,
            self.unprocessed.len(),
            self.concern
        )?;
        for (i, item) in self.unprocessed.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PartialBatchFailure {}

/// A mutation sequence that stopped early.
///
/// `last_token` is the token returned by the last call the remote accepted;
/// `applied` counts the steps that completed before the failing one.
#[derive(Debug, Error)]
#[error("{resource}: step {} ({concern}) failed after {applied} applied step(s): {source}", .applied + 1)]
pub struct MutationFailure {
    pub resource: ResourceRef,
    pub concern: String,
    pub last_token: ConcurrencyToken,
    pub applied: usize,
    /// Mutating calls the remote accepted before the failure.
    pub calls: usize,
    #[source]
    pub source: EngineError,
}
