use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use converge_core::{ConcurrencyToken, LifecycleStatus, ResourceRef};
use converge_remote::{BatchOutcome, Member, RejectedItem, RemoteApi, RemoteError, RemoteResource};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use crate::journal::{CallRecord, Operation};

/// Lifecycle statuses reported by the in-memory backend.
pub mod status {
    pub const CREATING: &str = "CREATING";
    pub const ACTIVE: &str = "ACTIVE";
    pub const UPDATING: &str = "UPDATING";
    pub const DELETING: &str = "DELETING";
}

#[derive(Debug)]
struct Entry {
    remote: RemoteResource,
    /// Reads that still report NotFound (eventual consistency after create).
    hidden_reads: u32,
    /// Reads left before a transitional status settles.
    settle_reads: u32,
    deleting: bool,
}

/// In-memory remote control plane.
///
/// This backend provides:
/// - Fresh UUID concurrency tokens on every mutation, with stale-token conflicts
/// - `CREATING`/`UPDATING`/`DELETING` statuses that settle after a number of reads
/// - Read-after-create visibility lag
/// - An optional per-call batch limit
/// - Fault injection per operation and per-member rejection
/// - A journal of every call and the token it carried
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    resources: DashMap<ResourceRef, Entry>,
    rejections: DashMap<String, (String, String)>,
    /// Per-operation script; `None` lets that call through.
    faults: Mutex<HashMap<Operation, VecDeque<Option<RemoteError>>>>,
    journal: Mutex<Vec<CallRecord>>,
    visibility_lag: u32,
    settle_reads: u32,
    batch_limit: Option<usize>,
}

fn next_token() -> ConcurrencyToken {
    ConcurrencyToken::new(uuid::Uuid::new_v4().to_string())
}

impl InMemoryRemote {
    /// Creates a backend where every change is immediately visible and settled.
    pub fn new() -> Self {
        Self::default()
    }

    /// New resources report NotFound for the first `reads` reads.
    pub fn with_visibility_lag(mut self, reads: u32) -> Self {
        self.visibility_lag = reads;
        self
    }

    /// Transitional statuses settle after `reads` reads.
    pub fn with_settle_reads(mut self, reads: u32) -> Self {
        self.settle_reads = reads;
        self
    }

    /// Batch calls larger than `limit` are rejected as invalid.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    /// Makes the next call of `operation` fail with `error`.
    pub async fn fail_next(&self, operation: Operation, error: RemoteError) {
        self.fail_times(operation, 1, error).await;
    }

    /// Makes the next `times` calls of `operation` fail with `error`.
    pub async fn fail_times(&self, operation: Operation, times: usize, error: RemoteError) {
        let mut faults = self.faults.lock().await;
        let queue = faults.entry(operation).or_default();
        queue.extend(std::iter::repeat_n(Some(error), times));
    }

    /// Lets the next `n - 1` calls of `operation` through and fails the `n`th.
    pub async fn fail_nth(&self, operation: Operation, n: usize, error: RemoteError) {
        let mut faults = self.faults.lock().await;
        let queue = faults.entry(operation).or_default();
        queue.extend(std::iter::repeat_n(None, n.saturating_sub(1)));
        queue.push_back(Some(error));
    }

    /// Every batch call will reject the member with this key.
    pub fn reject_member(
        &self,
        key: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.rejections
            .insert(key.into(), (code.into(), message.into()));
    }

    pub fn clear_rejections(&self) {
        self.rejections.clear();
    }

    /// Inserts a visible, settled resource directly.
    pub fn seed(
        &self,
        resource: ResourceRef,
        attributes: IndexMap<String, Value>,
        members: IndexMap<String, Value>,
    ) -> RemoteResource {
        let mut remote = RemoteResource::new(resource.clone(), next_token(), status::ACTIVE);
        remote.attributes = attributes;
        remote.members = members;
        self.resources.insert(
            resource,
            Entry {
                remote: remote.clone(),
                hidden_reads: 0,
                settle_reads: 0,
                deleting: false,
            },
        );
        remote
    }

    /// Forces a status that will not settle on its own (e.g. `FAILED`).
    pub fn set_status(&self, resource: &ResourceRef, status: impl Into<LifecycleStatus>) -> bool {
        match self.resources.get_mut(resource) {
            Some(mut entry) => {
                entry.remote.status = status.into();
                entry.settle_reads = 0;
                true
            }
            None => false,
        }
    }

    /// Simulates a concurrent writer by rotating the resource's token.
    pub fn touch(&self, resource: &ResourceRef) -> Option<ConcurrencyToken> {
        let mut entry = self.resources.get_mut(resource)?;
        entry.remote.token = next_token();
        entry.remote.last_updated = OffsetDateTime::now_utc();
        Some(entry.remote.token.clone())
    }

    /// Returns `true` if the backend holds the resource, visible or not.
    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.resources.contains_key(resource)
    }

    /// Snapshot of the backend's copy, bypassing visibility and settling.
    pub fn snapshot(&self, resource: &ResourceRef) -> Option<RemoteResource> {
        self.resources.get(resource).map(|e| e.remote.clone())
    }

    /// All calls made so far, in order.
    pub async fn journal(&self) -> Vec<CallRecord> {
        self.journal.lock().await.clone()
    }

    /// Token-consuming calls made so far, in order.
    pub async fn mutations(&self) -> Vec<CallRecord> {
        self.journal
            .lock()
            .await
            .iter()
            .filter(|r| r.operation.is_token_mutation())
            .cloned()
            .collect()
    }

    async fn injected_fault(&self, operation: Operation) -> Option<RemoteError> {
        let mut faults = self.faults.lock().await;
        faults.get_mut(&operation).and_then(VecDeque::pop_front).flatten()
    }

    async fn record(&self, record: CallRecord) {
        self.journal.lock().await.push(record);
    }

    fn transition_status(&self) -> (&'static str, u32) {
        if self.settle_reads > 0 {
            (status::UPDATING, self.settle_reads)
        } else {
            (status::ACTIVE, 0)
        }
    }

    fn observe(&self, resource: &ResourceRef) -> Result<RemoteResource, RemoteError> {
        let not_found = || RemoteError::not_found(&resource.kind, &resource.id);
        let mut entry = self.resources.get_mut(resource).ok_or_else(not_found)?;

        if entry.hidden_reads > 0 {
            entry.hidden_reads -= 1;
            return Err(not_found());
        }

        if entry.deleting {
            if entry.settle_reads == 0 {
                drop(entry);
                self.resources.remove(resource);
                return Err(not_found());
            }
            entry.settle_reads -= 1;
            return Ok(entry.remote.clone());
        }

        if entry.settle_reads > 0 {
            entry.settle_reads -= 1;
            if entry.settle_reads == 0 {
                entry.remote.status = LifecycleStatus::new(status::ACTIVE);
            }
        }
        Ok(entry.remote.clone())
    }

    fn check_batch_limit(&self, items: usize) -> Result<(), RemoteError> {
        match self.batch_limit {
            Some(limit) if items > limit => Err(RemoteError::invalid_request(format!(
                "batch of {items} items exceeds the limit of {limit}"
            ))),
            _ => Ok(()),
        }
    }

    /// Applies `mutate` under token check and rotates the token.
    fn mutate<T>(
        &self,
        resource: &ResourceRef,
        token: &ConcurrencyToken,
        mutate: impl FnOnce(&mut RemoteResource) -> T,
    ) -> Result<(ConcurrencyToken, T), RemoteError> {
        let mut entry = self
            .resources
            .get_mut(resource)
            .filter(|e| !e.deleting)
            .ok_or_else(|| RemoteError::not_found(&resource.kind, &resource.id))?;

        if entry.remote.token != *token {
            return Err(RemoteError::conflict(
                token.as_str(),
                entry.remote.token.as_str(),
            ));
        }

        let output = mutate(&mut entry.remote);
        let (status, settle_reads) = self.transition_status();
        entry.remote.token = next_token();
        entry.remote.status = LifecycleStatus::new(status);
        entry.remote.last_updated = OffsetDateTime::now_utc();
        entry.settle_reads = settle_reads;
        Ok((entry.remote.token.clone(), output))
    }

    fn rejection_for(&self, key: &str) -> Option<RejectedItem> {
        self.rejections
            .get(key)
            .map(|r| RejectedItem::new(key, r.0.clone(), r.1.clone()))
    }

    async fn finish<T>(
        &self,
        operation: Operation,
        resource: &ResourceRef,
        sent_token: Option<&ConcurrencyToken>,
        items: usize,
        result: Result<T, RemoteError>,
        returned_token: impl FnOnce(&T) -> Option<ConcurrencyToken>,
    ) -> Result<T, RemoteError> {
        let record = CallRecord {
            operation,
            resource: resource.clone(),
            sent_token: sent_token.cloned(),
            returned_token: result.as_ref().ok().and_then(returned_token),
            items,
            succeeded: result.is_ok(),
        };
        if let Err(ref err) = result {
            debug!(?operation, resource = %resource, error = %err, "In-memory call failed");
        }
        self.record(record).await;
        result
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn create(
        &self,
        resource: &ResourceRef,
        attributes: &IndexMap<String, Value>,
    ) -> Result<RemoteResource, RemoteError> {
        let result = match self.injected_fault(Operation::Create).await {
            Some(err) => Err(err),
            None => self.create_entry(resource, attributes),
        };
        self.finish(Operation::Create, resource, None, 0, result, |r| {
            Some(r.token.clone())
        })
        .await
    }

    async fn read(&self, resource: &ResourceRef) -> Result<RemoteResource, RemoteError> {
        let result = match self.injected_fault(Operation::Read).await {
            Some(err) => Err(err),
            None => self.observe(resource),
        };
        self.finish(Operation::Read, resource, None, 0, result, |_| None)
            .await
    }

    async fn list(&self, kind: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        let result = match self.injected_fault(Operation::List).await {
            Some(err) => Err(err),
            None => Ok(self
                .resources
                .iter()
                .filter(|e| e.key().kind == kind && e.hidden_reads == 0)
                .map(|e| e.remote.clone())
                .collect()),
        };
        let scope = ResourceRef::new(kind, "*");
        self.finish(Operation::List, &scope, None, 0, result, |_| None)
            .await
    }

    async fn update(
        &self,
        resource: &ResourceRef,
        concern: &str,
        value: &Value,
        token: &ConcurrencyToken,
    ) -> Result<ConcurrencyToken, RemoteError> {
        let result = match self.injected_fault(Operation::Update).await {
            Some(err) => Err(err),
            None => self
                .mutate(resource, token, |remote| {
                    if value.is_null() {
                        remote.attributes.shift_remove(concern);
                    } else {
                        remote.attributes.insert(concern.to_string(), value.clone());
                    }
                })
                .map(|(token, ())| token),
        };
        self.finish(Operation::Update, resource, Some(token), 0, result, |t| {
            Some(t.clone())
        })
        .await
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<(), RemoteError> {
        let result = match self.injected_fault(Operation::Delete).await {
            Some(err) => Err(err),
            None => self.delete_entry(resource),
        };
        self.finish(Operation::Delete, resource, None, 0, result, |_| None)
            .await
    }

    async fn batch_associate(
        &self,
        resource: &ResourceRef,
        members: &[Member],
        token: &ConcurrencyToken,
    ) -> Result<BatchOutcome, RemoteError> {
        let result = match self.injected_fault(Operation::Associate).await {
            Some(err) => Err(err),
            None => self.check_batch_limit(members.len()).and_then(|()| {
                self.mutate(resource, token, |remote| {
                    let mut rejected = Vec::new();
                    for member in members {
                        match self.rejection_for(&member.key) {
                            Some(item) => rejected.push(item),
                            None => {
                                remote
                                    .members
                                    .insert(member.key.clone(), member.value.clone());
                            }
                        }
                    }
                    rejected
                })
                .map(|(token, rejected)| BatchOutcome::accepted(token).with_rejected(rejected))
            }),
        };
        self.finish(
            Operation::Associate,
            resource,
            Some(token),
            members.len(),
            result,
            |o| Some(o.token.clone()),
        )
        .await
    }

    async fn batch_disassociate(
        &self,
        resource: &ResourceRef,
        keys: &[String],
        token: &ConcurrencyToken,
    ) -> Result<BatchOutcome, RemoteError> {
        let result = match self.injected_fault(Operation::Disassociate).await {
            Some(err) => Err(err),
            None => self.check_batch_limit(keys.len()).and_then(|()| {
                self.mutate(resource, token, |remote| {
                    let mut rejected = Vec::new();
                    for key in keys {
                        match self.rejection_for(key) {
                            Some(item) => rejected.push(item),
                            None => {
                                remote.members.shift_remove(key);
                            }
                        }
                    }
                    rejected
                })
                .map(|(token, rejected)| BatchOutcome::accepted(token).with_rejected(rejected))
            }),
        };
        self.finish(
            Operation::Disassociate,
            resource,
            Some(token),
            keys.len(),
            result,
            |o| Some(o.token.clone()),
        )
        .await
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl InMemoryRemote {
    fn create_entry(
        &self,
        resource: &ResourceRef,
        attributes: &IndexMap<String, Value>,
    ) -> Result<RemoteResource, RemoteError> {
        if self.resources.get(resource).is_some_and(|e| !e.deleting) {
            return Err(RemoteError::api(
                "ResourceAlreadyExistsException",
                format!("{resource} already exists"),
            ));
        }

        let initial = if self.settle_reads > 0 {
            status::CREATING
        } else {
            status::ACTIVE
        };
        let mut remote = RemoteResource::new(resource.clone(), next_token(), initial);
        remote.attributes = attributes
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.resources.insert(
            resource.clone(),
            Entry {
                remote: remote.clone(),
                hidden_reads: self.visibility_lag,
                settle_reads: self.settle_reads,
                deleting: false,
            },
        );
        Ok(remote)
    }

    fn delete_entry(&self, resource: &ResourceRef) -> Result<(), RemoteError> {
        let mut entry = self
            .resources
            .get_mut(resource)
            .ok_or_else(|| RemoteError::not_found(&resource.kind, &resource.id))?;

        if entry.deleting {
            return Ok(());
        }
        if self.settle_reads == 0 {
            drop(entry);
            self.resources.remove(resource);
            return Ok(());
        }
        entry.deleting = true;
        entry.hidden_reads = 0;
        entry.settle_reads = self.settle_reads;
        entry.remote.status = LifecycleStatus::new(status::DELETING);
        entry.remote.last_updated = OffsetDateTime::now_utc();
        Ok(())
    }
}
