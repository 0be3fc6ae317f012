//! The remote API contract consumed by the reconciliation engine.

use std::sync::Arc;

use async_trait::async_trait;
use converge_core::{ConcurrencyToken, ResourceRef};
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::RemoteError;
use crate::types::{BatchOutcome, Member, RemoteResource};

/// Per-kind CRUD and batch calls against a remote control plane.
///
/// Every mutating call takes the token returned by the previous mutating call
/// for the same resource and returns a fresh one. Implementations must be
/// thread-safe (`Send + Sync`); the engine never issues two mutating calls for
/// the same resource concurrently.
///
/// # Example
///
/// ```ignore
/// use converge_remote::{RemoteApi, RemoteError};
///
/// async fn current_token(api: &dyn RemoteApi, resource: &ResourceRef) -> Result<ConcurrencyToken, RemoteError> {
///     Ok(api.read(resource).await?.token)
/// }
/// ```
#[async_trait]
pub trait RemoteApi: Send + Sync {
    // ==================== CRUD Operations ====================

    /// Creates a resource with its initial attribute concerns.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Api` if the resource already exists or the
    /// service rejects the request.
    async fn create(
        &self,
        resource: &ResourceRef,
        attributes: &IndexMap<String, Value>,
    ) -> Result<RemoteResource, RemoteError>;

    /// Reads a resource.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the resource does not exist or is
    /// not yet visible to reads.
    async fn read(&self, resource: &ResourceRef) -> Result<RemoteResource, RemoteError>;

    /// Lists every visible resource of a kind.
    async fn list(&self, kind: &str) -> Result<Vec<RemoteResource>, RemoteError>;

    /// Sets (or, with `Value::Null`, clears) one attribute concern.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Conflict` if `token` is stale.
    async fn update(
        &self,
        resource: &ResourceRef,
        concern: &str,
        value: &Value,
        token: &ConcurrencyToken,
    ) -> Result<ConcurrencyToken, RemoteError>;

    /// Deletes a resource.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the resource does not exist.
    async fn delete(&self, resource: &ResourceRef) -> Result<(), RemoteError>;

    // ==================== Batch Operations ====================

    /// Adds or replaces members. Individual members may be rejected without
    /// failing the call.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Conflict` if `token` is stale and
    /// `RemoteError::InvalidRequest` if the batch exceeds the per-call limit.
    async fn batch_associate(
        &self,
        resource: &ResourceRef,
        members: &[Member],
        token: &ConcurrencyToken,
    ) -> Result<BatchOutcome, RemoteError>;

    /// Removes members by key. Individual keys may be rejected without
    /// failing the call.
    async fn batch_disassociate(
        &self,
        resource: &ResourceRef,
        keys: &[String],
        token: &ConcurrencyToken,
    ) -> Result<BatchOutcome, RemoteError>;

    // ==================== Metadata ====================

    /// Returns the name of this backend for logging.
    fn backend_name(&self) -> &'static str;
}

/// Type alias for a shareable remote API client.
pub type DynRemote = Arc<dyn RemoteApi>;

#[async_trait]
impl<T: RemoteApi + ?Sized> RemoteApi for Arc<T> {
    async fn create(
        &self,
        resource: &ResourceRef,
        attributes: &IndexMap<String, Value>,
    ) -> Result<RemoteResource, RemoteError> {
        (**self).create(resource, attributes).await
    }

    async fn read(&self, resource: &ResourceRef) -> Result<RemoteResource, RemoteError> {
        (**self).read(resource).await
    }

    async fn list(&self, kind: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        (**self).list(kind).await
    }

    async fn update(
        &self,
        resource: &ResourceRef,
        concern: &str,
        value: &Value,
        token: &ConcurrencyToken,
    ) -> Result<ConcurrencyToken, RemoteError> {
        (**self).update(resource, concern, value, token).await
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<(), RemoteError> {
        (**self).delete(resource).await
    }

    async fn batch_associate(
        &self,
        resource: &ResourceRef,
        members: &[Member],
        token: &ConcurrencyToken,
    ) -> Result<BatchOutcome, RemoteError> {
        (**self).batch_associate(resource, members, token).await
    }

    async fn batch_disassociate(
        &self,
        resource: &ResourceRef,
        keys: &[String],
        token: &ConcurrencyToken,
    ) -> Result<BatchOutcome, RemoteError> {
        (**self).batch_disassociate(resource, keys, token).await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
