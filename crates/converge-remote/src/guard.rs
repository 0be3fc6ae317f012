//! Idempotent read/delete guard.
//!
//! A "not found" from the remote is a normal outcome for reads after external
//! deletion and for repeated deletes. The guard turns it into an absent read
//! or a no-op delete; every other error passes through unchanged.
//!
//! # Example
//!
//! ```ignore
//! use converge_remote::GuardedRemote;
//!
//! let guard = GuardedRemote::new(client);
//! if guard.read(&resource).await?.is_none() {
//!     // create it
//! }
//! guard.delete(&resource).await?; // safe to repeat
//! ```

use converge_core::ResourceRef;
use tracing::debug;

use crate::error::RemoteError;
use crate::traits::RemoteApi;
use crate::types::RemoteResource;

/// What a guarded delete did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The remote accepted the delete.
    Deleted,
    /// The resource was already gone.
    AlreadyAbsent,
}

/// Maps a not-found error to `Ok(None)`.
pub fn absent_if_not_found<T>(result: Result<T, RemoteError>) -> Result<Option<T>, RemoteError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Maps a not-found error on delete to [`DeleteOutcome::AlreadyAbsent`].
pub fn ignore_not_found(result: Result<(), RemoteError>) -> Result<DeleteOutcome, RemoteError> {
    match result {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(err) if err.is_not_found() => Ok(DeleteOutcome::AlreadyAbsent),
        Err(err) => Err(err),
    }
}

/// Returns the single element of a lookup result.
///
/// An empty result is a `NotFound` (so the guard treats it as absence); more
/// than one element is `TooManyResults`.
pub fn assert_single<T>(
    mut items: Vec<T>,
    kind: &str,
    lookup: &str,
) -> Result<T, RemoteError> {
    match items.len() {
        0 => Err(RemoteError::not_found(kind, lookup)),
        1 => Ok(items.remove(0)),
        count => Err(RemoteError::too_many_results(kind, count)),
    }
}

/// A client wrapper whose reads and deletes tolerate absence.
///
/// Mutating calls are not wrapped; reach them through [`GuardedRemote::inner`].
pub struct GuardedRemote<C> {
    inner: C,
}

impl<C: RemoteApi> GuardedRemote<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    /// Get a reference to the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Reads a resource; `Ok(None)` if it does not exist.
    pub async fn read(&self, resource: &ResourceRef) -> Result<Option<RemoteResource>, RemoteError> {
        let result = absent_if_not_found(self.inner.read(resource).await);
        if let Ok(None) = result {
            debug!(resource = %resource, backend = self.inner.backend_name(), "Resource absent on read");
        }
        result
    }

    /// Deletes a resource; deleting an absent resource succeeds.
    pub async fn delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome, RemoteError> {
        let outcome = ignore_not_found(self.inner.delete(resource).await)?;
        if outcome == DeleteOutcome::AlreadyAbsent {
            debug!(resource = %resource, "Resource already absent on delete");
        }
        Ok(outcome)
    }

    /// Lists a kind; a not-found kind yields an empty list.
    pub async fn list(&self, kind: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        Ok(absent_if_not_found(self.inner.list(kind).await)?.unwrap_or_default())
    }

    /// Finds the single listed resource matching `predicate`.
    ///
    /// `Ok(None)` when nothing matches; `TooManyResults` when several do.
    pub async fn find_single<P>(
        &self,
        kind: &str,
        lookup: &str,
        predicate: P,
    ) -> Result<Option<RemoteResource>, RemoteError>
    where
        P: Fn(&RemoteResource) -> bool,
    {
        let matches: Vec<_> = self
            .list(kind)
            .await?
            .into_iter()
            .filter(|r| predicate(r))
            .collect();
        absent_if_not_found(assert_single(matches, kind, lookup))
    }
}
