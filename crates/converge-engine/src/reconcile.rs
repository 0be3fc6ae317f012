//! One reconciliation pass over a single resource.

use converge_config::{EngineConfig, WaitSettings};
use converge_core::{
    ChangeSet, ConcurrencyToken, DesiredState, ResourceRef, RetryPolicy, WaitSpec,
};
use converge_remote::{DeleteOutcome, GuardedRemote, RemoteApi, RemoteError, RemoteResource, TransientClassifier};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::diff::{diff, diff_attributes};
use crate::error::{EngineError, Result};
use crate::mutate::Mutator;
use crate::plan::{BatchLimits, MutationPlan};
use crate::retry::{retry_when, retry_when_new_resource_not_found};
use crate::wait::Waiter;

/// Statuses used by the conventional lifecycle.
pub mod status {
    pub const CREATING: &str = "CREATING";
    pub const ACTIVE: &str = "ACTIVE";
    pub const UPDATING: &str = "UPDATING";
    pub const DELETING: &str = "DELETING";
    pub const FAILED: &str = "FAILED";
}

/// What one resource should look like.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredResource {
    pub resource: ResourceRef,
    /// Top-level attribute concerns, applied one call per concern.
    pub attributes: DesiredState<String, Value>,
    /// Associated members, applied through batch calls.
    pub members: DesiredState<String, Value>,
}

impl DesiredResource {
    pub fn new(resource: ResourceRef) -> Self {
        Self {
            resource,
            attributes: DesiredState::new(),
            members: DesiredState::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: DesiredState<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_members(mut self, members: DesiredState<String, Value>) -> Self {
        self.members = members;
        self
    }
}

/// Wait shapes for create, update and delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    pub create: WaitSpec,
    /// `None` when mutations take effect synchronously.
    pub update: Option<WaitSpec>,
    pub delete: WaitSpec,
}

impl Lifecycle {
    pub fn new(create: WaitSpec, delete: WaitSpec) -> Self {
        Self {
            create,
            update: None,
            delete,
        }
    }

    pub fn with_update(mut self, update: WaitSpec) -> Self {
        self.update = Some(update);
        self
    }

    /// `CREATING -> ACTIVE`, `UPDATING -> ACTIVE` and `DELETING -> gone`,
    /// with `FAILED` terminal, timed by `settings`.
    pub fn conventional(settings: &WaitSettings) -> Self {
        let create = settings
            .creation_spec([status::CREATING], [status::ACTIVE])
            .with_failure([status::FAILED]);
        let update = settings
            .apply(WaitSpec::new([status::UPDATING], [status::ACTIVE]))
            .with_failure([status::FAILED]);
        let delete = settings
            .deletion_spec([status::DELETING])
            .with_failure([status::FAILED]);
        Self::new(create, delete).with_update(update)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::conventional(&WaitSettings::default())
    }
}

/// Retry and batching knobs for a [`Reconciler`].
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub retry: RetryPolicy,
    pub classifier: TransientClassifier,
    pub limits: BatchLimits,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ReconcileSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            retry: config.retry.policy(),
            classifier: config.retry.classifier(),
            limits: BatchLimits::from(&config.batch),
        }
    }
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub resource: ResourceRef,
    /// Token observed at the end of the pass.
    pub token: ConcurrencyToken,
    pub created: bool,
    pub attribute_changes: ChangeSet<String>,
    pub member_changes: ChangeSet<String>,
    pub steps_applied: usize,
    /// Mutating calls issued, not counting the create.
    pub calls: usize,
}

impl ReconcileReport {
    /// `true` when the pass issued no create and no mutating call.
    pub fn is_noop(&self) -> bool {
        !self.created && self.calls == 0
    }
}

/// Sequences read, create, diff, mutate and wait for one resource at a time.
///
/// Different resources may be reconciled concurrently through a shared
/// `Reconciler`; passes for the same resource must not overlap.
pub struct Reconciler<C> {
    guard: GuardedRemote<C>,
    lifecycle: Lifecycle,
    settings: ReconcileSettings,
}

impl<C: RemoteApi> Reconciler<C> {
    pub fn new(remote: C, lifecycle: Lifecycle) -> Self {
        Self {
            guard: GuardedRemote::new(remote),
            lifecycle,
            settings: ReconcileSettings::default(),
        }
    }

    /// Builds a reconciler with the conventional lifecycle, timed and tuned by `config`.
    pub fn from_config(remote: C, config: &EngineConfig) -> Self {
        Self::new(remote, Lifecycle::conventional(&config.wait))
            .with_settings(ReconcileSettings::from(config))
    }

    pub fn with_settings(mut self, settings: ReconcileSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn remote(&self) -> &C {
        self.guard.inner()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Converges `desired` in one pass.
    pub async fn reconcile(&self, desired: &DesiredResource) -> Result<ReconcileReport> {
        let resource = &desired.resource;
        info!(resource = %resource, backend = self.remote().backend_name(), "Reconciling");

        let (current, created) = match self.read(resource).await? {
            Some(current) => (current, false),
            None => (self.create(desired).await?, true),
        };

        let attribute_changes = diff_attributes(&desired.attributes, &current.observed_attributes());
        let member_changes = diff(&desired.members, &current.observed_members());
        let plan = MutationPlan::build(
            &attribute_changes,
            &desired.attributes,
            &member_changes,
            &desired.members,
            self.settings.limits,
        );

        if plan.is_empty() {
            info!(resource = %resource, created, "Already converged");
            return Ok(ReconcileReport {
                resource: resource.clone(),
                token: current.token,
                created,
                attribute_changes,
                member_changes,
                steps_applied: 0,
                calls: 0,
            });
        }

        debug!(resource = %resource, steps = plan.len(), calls = plan.call_count(), "Applying plan");
        let mutator = Mutator::new(self.remote(), &self.settings.retry, &self.settings.classifier);
        let applied = mutator.apply(resource, current.token, plan.into_steps()).await?;

        let settled = match &self.lifecycle.update {
            Some(spec) => self.wait(resource, spec).await?,
            None => Some(self.read_after_write(resource, created).await?),
        };
        let token = settled.map_or(applied.token, |r| r.token);

        info!(
            resource = %resource,
            created,
            steps = applied.steps_applied,
            calls = applied.calls,
            "Reconciled"
        );
        Ok(ReconcileReport {
            resource: resource.clone(),
            token,
            created,
            attribute_changes,
            member_changes,
            steps_applied: applied.steps_applied,
            calls: applied.calls,
        })
    }

    /// Deletes a resource and waits until it is gone. Deleting an absent
    /// resource succeeds without waiting.
    pub async fn destroy(&self, resource: &ResourceRef) -> Result<DeleteOutcome> {
        info!(resource = %resource, "Destroying");
        let guard = &self.guard;
        let outcome = retry_when(&self.settings.retry, |e: &RemoteError| self.is_transient(e), || {
            guard.delete(resource)
        })
        .await
        .map_err(|err| self.escalate(resource, "delete", err))?;

        if outcome == DeleteOutcome::Deleted {
            self.wait(resource, &self.lifecycle.delete).await?;
        }
        info!(resource = %resource, ?outcome, "Destroyed");
        Ok(outcome)
    }

    async fn read(&self, resource: &ResourceRef) -> Result<Option<RemoteResource>> {
        let guard = &self.guard;
        retry_when(&self.settings.retry, |e: &RemoteError| self.is_transient(e), || guard.read(resource))
            .await
            .map_err(|err| self.escalate(resource, "read", err))
    }

    async fn create(&self, desired: &DesiredResource) -> Result<RemoteResource> {
        let resource = &desired.resource;
        let attributes: IndexMap<String, Value> = desired
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let remote = self.remote();

        let created = retry_when(&self.settings.retry, |e: &RemoteError| self.is_transient(e), || {
            remote.create(resource, &attributes)
        })
        .await
        .map_err(|err| self.escalate(resource, "create", err))?;
        info!(resource = %resource, status = %created.status, "Created");

        match self.wait(resource, &self.lifecycle.create).await? {
            Some(settled) => Ok(settled),
            None => Ok(created),
        }
    }

    /// Re-reads after mutation; a just-created resource may still be invisible.
    async fn read_after_write(&self, resource: &ResourceRef, created: bool) -> Result<RemoteResource> {
        let remote = self.remote();
        retry_when_new_resource_not_found(
            &self.settings.retry,
            created,
            |e| self.is_transient(e),
            || remote.read(resource),
        )
        .await
        .map_err(|err| self.escalate(resource, "read", err))
    }

    async fn wait(&self, resource: &ResourceRef, spec: &WaitSpec) -> Result<Option<RemoteResource>> {
        let guard = &self.guard;
        Waiter::new(spec.clone())?
            .for_resource(resource)
            .wait(|| guard.read(resource))
            .await
            .map_err(|err| err.into_engine_error(resource, spec))
    }

    fn is_transient(&self, err: &RemoteError) -> bool {
        self.settings.classifier.is_transient(err)
    }

    fn escalate(&self, resource: &ResourceRef, concern: &str, err: RemoteError) -> EngineError {
        let transient = self.is_transient(&err);
        EngineError::from_remote(resource, concern, err, transient)
    }
}
