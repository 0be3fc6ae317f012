//! Async operation poller.
//!
//! A [`Waiter`] polls a refresh function until the reported status reaches
//! a target status of its `WaitSpec`, hits a failure status, or the timeout elapses.
//! Once the deadline passes, one last refresh is made before giving up, so
//! total polling time is bounded by `initial_delay + timeout`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use converge_core::{AbsencePolicy, CoreError, LifecycleStatus, ResourceRef, StatusClass, WaitSpec};
use converge_remote::{RemoteError, RemoteResource};
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::EngineError;

/// Anything that reports a lifecycle status.
pub trait StatusSource {
    fn lifecycle_status(&self) -> &LifecycleStatus;
}

impl StatusSource for LifecycleStatus {
    fn lifecycle_status(&self) -> &LifecycleStatus {
        self
    }
}

impl StatusSource for RemoteResource {
    fn lifecycle_status(&self) -> &LifecycleStatus {
        &self.status
    }
}

#[derive(Debug, Error)]
pub enum WaitError<E: Display> {
    #[error("refresh failed: {0}")]
    Refresh(E),

    #[error("reached failure status {status}")]
    Terminal { status: LifecycleStatus },

    #[error("unexpected status {status}")]
    Unexpected { status: LifecycleStatus },

    #[error("timed out after {}ms", .elapsed.as_millis())]
    Timeout {
        last_status: Option<LifecycleStatus>,
        elapsed: Duration,
    },

    #[error("not found after {checks} consecutive checks")]
    NotFound { checks: u32 },

    #[error("resource is absent")]
    Absent,
}

impl WaitError<RemoteError> {
    /// Attaches the resource and the expected statuses.
    pub fn into_engine_error(self, resource: &ResourceRef, spec: &WaitSpec) -> EngineError {
        let resource = resource.clone();
        match self {
            Self::Refresh(source) => EngineError::from_remote(&resource, "status", source, false),
            Self::Terminal { status } => EngineError::TerminalState {
                resource,
                status,
                expected: spec.target.iter().map(ToString::to_string).collect(),
            },
            Self::Unexpected { status } => EngineError::UnexpectedState {
                resource,
                status,
                expected: spec.expected_statuses(),
            },
            Self::Timeout {
                last_status,
                elapsed,
            } => EngineError::Timeout {
                resource,
                last_status,
                elapsed,
                expected: spec.target.iter().map(ToString::to_string).collect(),
            },
            Self::NotFound { checks } => EngineError::NotFound { resource, checks },
            Self::Absent => EngineError::Absent { resource },
        }
    }
}

/// Polls a single asynchronous transition described by a [`WaitSpec`].
#[derive(Debug, Clone)]
pub struct Waiter {
    spec: WaitSpec,
    label: String,
}

impl Waiter {
    /// Validates the spec.
    pub fn new(spec: WaitSpec) -> Result<Self, CoreError> {
        spec.validate()?;
        Ok(Self {
            spec,
            label: String::new(),
        })
    }

    /// Names the waited-on resource in log lines.
    pub fn for_resource(mut self, resource: &ResourceRef) -> Self {
        self.label = resource.to_string();
        self
    }

    pub fn spec(&self) -> &WaitSpec {
        &self.spec
    }

    /// Waits for the transition.
    ///
    /// `refresh` returns `Ok(None)` when the resource is not visible. The
    /// result is the final observation, or `None` when absence reached the
    /// target (deletion waits).
    pub async fn wait<T, E, F, Fut>(&self, mut refresh: F) -> Result<Option<T>, WaitError<E>>
    where
        T: StatusSource,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let spec = &self.spec;
        if !spec.initial_delay.is_zero() {
            sleep(spec.initial_delay).await;
        }

        let started = Instant::now();
        let deadline = started + spec.timeout;
        let mut target_hits: u32 = 0;
        let mut absent_reads: u32 = 0;
        let mut last_status: Option<LifecycleStatus> = None;

        loop {
            let timed_out = Instant::now() >= deadline;

            match refresh().await.map_err(WaitError::Refresh)? {
                None => match spec.absence {
                    AbsencePolicy::Target => {
                        absent_reads += 1;
                        target_hits += 1;
                        if target_hits >= spec.continuous_target_occurrence {
                            debug!(resource = %self.label, "Resource gone");
                            return Ok(None);
                        }
                    }
                    AbsencePolicy::Pending => {
                        absent_reads += 1;
                        target_hits = 0;
                        if spec.not_found_checks.is_some_and(|max| absent_reads > max) {
                            return Err(WaitError::NotFound {
                                checks: absent_reads,
                            });
                        }
                        debug!(resource = %self.label, absent_reads, "Not visible yet");
                    }
                    AbsencePolicy::Error => return Err(WaitError::Absent),
                },
                Some(observed) => {
                    absent_reads = 0;
                    let status = observed.lifecycle_status().clone();
                    match spec.classify(&status) {
                        StatusClass::Target => {
                            target_hits += 1;
                            if target_hits >= spec.continuous_target_occurrence {
                                debug!(
                                    resource = %self.label,
                                    status = %status,
                                    elapsed_ms = started.elapsed().as_millis() as u64,
                                    "Target status reached"
                                );
                                return Ok(Some(observed));
                            }
                        }
                        StatusClass::Pending => {
                            target_hits = 0;
                            debug!(resource = %self.label, status = %status, "Still pending");
                        }
                        StatusClass::Failure => return Err(WaitError::Terminal { status }),
                        StatusClass::Unexpected => return Err(WaitError::Unexpected { status }),
                    }
                    last_status = Some(status);
                }
            }

            if timed_out {
                return Err(WaitError::Timeout {
                    last_status,
                    elapsed: started.elapsed(),
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(spec.poll_interval.min(remaining)).await;
        }
    }
}
