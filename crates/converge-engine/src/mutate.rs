//! Version-token mutator.
//!
//! Applies an ordered list of [`MutationStep`]s to one resource. Each call
//! carries the token returned by the previous call. A stale-token conflict
//! triggers one token refresh and one retry of that step; a second conflict
//! is fatal. The first irrecoverable failure stops the sequence and is
//! reported with the last token the remote accepted.

use std::collections::HashMap;
use std::future::Future;

use converge_core::{BatchPlan, ConcurrencyToken, ResourceRef, RetryPolicy, UnprocessedItem};
use converge_remote::{BatchOutcome, Member, RejectedItem, RemoteApi, RemoteError, TransientClassifier};
use tracing::{debug, warn};

use crate::batch::{ChunkOutcome, submit_threaded};
use crate::error::{EngineError, MutationFailure};
use crate::plan::{ASSOCIATE_CONCERN, DISASSOCIATE_CONCERN, MutationStep};
use crate::retry::retry_when;

/// Items that can be matched against per-item rejections by key.
pub trait BatchItem: Clone + std::fmt::Display {
    fn key(&self) -> &str;
}

impl BatchItem for String {
    fn key(&self) -> &str {
        self
    }
}

impl BatchItem for Member {
    fn key(&self) -> &str {
        &self.key
    }
}

/// Result of a fully applied sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReport {
    /// Token returned by the last call.
    pub token: ConcurrencyToken,
    pub steps_applied: usize,
    /// Mutating calls the remote accepted, including per-chunk calls.
    pub calls: usize,
}

type StepResult = Result<(ConcurrencyToken, usize), (ConcurrencyToken, usize, EngineError)>;

pub struct Mutator<'a, C> {
    remote: &'a C,
    policy: &'a RetryPolicy,
    classifier: &'a TransientClassifier,
}

impl<'a, C: RemoteApi> Mutator<'a, C> {
    pub fn new(remote: &'a C, policy: &'a RetryPolicy, classifier: &'a TransientClassifier) -> Self {
        Self {
            remote,
            policy,
            classifier,
        }
    }

    /// Applies `steps` in order, starting from `token`.
    pub async fn apply(
        &self,
        resource: &ResourceRef,
        token: ConcurrencyToken,
        steps: Vec<MutationStep>,
    ) -> Result<MutationReport, MutationFailure> {
        let total = steps.len();
        let mut token = token;
        let mut calls = 0;

        for (applied, step) in steps.into_iter().enumerate() {
            let concern = step.concern().to_string();
            debug!(resource = %resource, concern = %concern, step = applied + 1, total, "Applying step");

            match self.apply_step(resource, token, step).await {
                Ok((next, step_calls)) => {
                    token = next;
                    calls += step_calls;
                }
                Err((last_token, step_calls, source)) => {
                    warn!(resource = %resource, concern = %concern, applied, error = %source, "Mutation sequence stopped");
                    return Err(MutationFailure {
                        resource: resource.clone(),
                        concern,
                        last_token,
                        applied,
                        calls: calls + step_calls,
                        source,
                    });
                }
            }
        }

        Ok(MutationReport {
            token,
            steps_applied: total,
            calls,
        })
    }

    async fn apply_step(&self, resource: &ResourceRef, token: ConcurrencyToken, step: MutationStep) -> StepResult {
        match step {
            MutationStep::Update { concern, value } => {
                let remote = self.remote;
                let (concern, value) = (concern.as_str(), &value);
                let result = self
                    .call_with_refresh(resource, concern, &token, move |t| async move {
                        remote.update(resource, concern, value, &t).await
                    })
                    .await;
                match result {
                    Ok(next) => Ok((next, 1)),
                    Err(err) => Err((token, 0, err)),
                }
            }
            MutationStep::Associate(plan) => {
                let remote = self.remote;
                self.apply_batch(resource, token, plan, ASSOCIATE_CONCERN, move |chunk, t| async move {
                    remote.batch_associate(resource, &chunk, &t).await
                })
                .await
            }
            MutationStep::Disassociate(plan) => {
                let remote = self.remote;
                self.apply_batch(resource, token, plan, DISASSOCIATE_CONCERN, move |chunk, t| async move {
                    remote.batch_disassociate(resource, &chunk, &t).await
                })
                .await
            }
        }
    }

    /// Submits every chunk, threading the token. All chunks are submitted even
    /// when some report rejected items or fail outright; the step then fails
    /// with the rejections of every chunk. A failed call leaves the token
    /// unchanged, so the next chunk goes out with the last accepted token.
    async fn apply_batch<T, F, Fut>(
        &self,
        resource: &ResourceRef,
        token: ConcurrencyToken,
        plan: BatchPlan<T>,
        concern: &str,
        call: F,
    ) -> StepResult
    where
        T: BatchItem,
        F: Fn(Vec<T>, ConcurrencyToken) -> Fut + Copy,
        Fut: Future<Output = Result<BatchOutcome, RemoteError>>,
    {
        let submitted = submit_threaded(plan, token, move |token: ConcurrencyToken, chunk: Vec<T>| async move {
            let items = &chunk;
            let result = self
                .call_with_refresh(resource, concern, &token, move |t| call(items.clone(), t))
                .await;
            match result {
                Ok(outcome) => {
                    let unprocessed = match_rejections(resource, chunk, outcome.rejected);
                    (outcome.token, Ok(ChunkOutcome::with_unprocessed(unprocessed)))
                }
                Err(err) => (token, Err(err)),
            }
        })
        .await;

        let (token, report) = submitted;
        let calls = report.chunks_accepted();
        match report.into_result(resource, concern) {
            Ok(_) => Ok((token, calls)),
            Err(partial) => Err((token, calls, partial.into())),
        }
    }

    /// Makes one mutating call, refreshing the token once on conflict.
    async fn call_with_refresh<R, F, Fut>(
        &self,
        resource: &ResourceRef,
        concern: &str,
        token: &ConcurrencyToken,
        call: F,
    ) -> Result<R, EngineError>
    where
        F: Fn(ConcurrencyToken) -> Fut,
        Fut: Future<Output = Result<R, RemoteError>>,
    {
        let err = match self.call_retried(token, &call).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_conflict() => err,
            Err(err) => return Err(self.escalate(resource, concern, err)),
        };

        warn!(resource = %resource, concern, error = %err, "Stale token, refreshing");
        let current = self.current_token(resource).await?;
        match self.call_retried(&current, &call).await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.escalate(resource, concern, err)),
        }
    }

    async fn call_retried<R, F, Fut>(&self, token: &ConcurrencyToken, call: &F) -> Result<R, RemoteError>
    where
        F: Fn(ConcurrencyToken) -> Fut,
        Fut: Future<Output = Result<R, RemoteError>>,
    {
        let classifier = self.classifier;
        retry_when(self.policy, |e: &RemoteError| classifier.is_transient(e), || call(token.clone())).await
    }

    async fn current_token(&self, resource: &ResourceRef) -> Result<ConcurrencyToken, EngineError> {
        let remote = self.remote;
        let classifier = self.classifier;
        retry_when(self.policy, |e: &RemoteError| classifier.is_transient(e), || remote.read(resource))
            .await
            .map(|current| current.token)
            .map_err(|err| self.escalate(resource, "token refresh", err))
    }

    fn escalate(&self, resource: &ResourceRef, concern: &str, err: RemoteError) -> EngineError {
        let transient = self.classifier.is_transient(&err);
        EngineError::from_remote(resource, concern, err, transient)
    }
}

/// Pairs the remote's rejections with the chunk items they name.
fn match_rejections<T: BatchItem>(
    resource: &ResourceRef,
    chunk: Vec<T>,
    rejected: Vec<RejectedItem>,
) -> Vec<UnprocessedItem<T>> {
    if rejected.is_empty() {
        return Vec::new();
    }
    let mut by_key: HashMap<String, RejectedItem> =
        rejected.into_iter().map(|r| (r.key.clone(), r)).collect();
    let unprocessed = chunk
        .into_iter()
        .filter_map(|item| {
            by_key
                .remove(item.key())
                .map(|r| UnprocessedItem::new(item, r.code, r.message))
        })
        .collect();
    for key in by_key.keys() {
        warn!(resource = %resource, key = %key, "Remote rejected an item that was not in the chunk");
    }
    unprocessed
}
