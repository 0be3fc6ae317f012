use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::CoreError;
use crate::token::LifecycleStatus;

/// How a waiter treats a resource that is not visible to reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsencePolicy {
    /// Not yet visible; keep polling (creation waits).
    Pending,
    /// Gone; counts as reaching the target (deletion waits).
    Target,
    /// Absence is a failure.
    Error,
}

/// Where a reported status falls in a [`WaitSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Target,
    Failure,
    Unexpected,
}

/// Describes one asynchronous transition: `Pending -> {Target | Failure}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    pub pending: BTreeSet<LifecycleStatus>,
    pub target: BTreeSet<LifecycleStatus>,
    pub failure: BTreeSet<LifecycleStatus>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    /// Consecutive target observations required before success.
    pub continuous_target_occurrence: u32,
    /// Cap on consecutive absent reads while absence counts as pending.
    pub not_found_checks: Option<u32>,
    pub absence: AbsencePolicy,
}

fn status_set<I, S>(statuses: I) -> BTreeSet<LifecycleStatus>
where
    I: IntoIterator<Item = S>,
    S: Into<LifecycleStatus>,
{
    statuses.into_iter().map(Into::into).collect()
}

impl WaitSpec {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new<P, T, S>(pending: P, target: T) -> Self
    where
        P: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: Into<LifecycleStatus>,
    {
        Self {
            pending: status_set(pending),
            target: status_set(target),
            failure: BTreeSet::new(),
            timeout: Self::DEFAULT_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            initial_delay: Duration::ZERO,
            continuous_target_occurrence: 1,
            not_found_checks: None,
            absence: AbsencePolicy::Error,
        }
    }

    /// A creation wait: a resource not yet visible is still pending.
    pub fn creation<P, T, S>(pending: P, target: T) -> Self
    where
        P: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: Into<LifecycleStatus>,
    {
        Self::new(pending, target).with_absence(AbsencePolicy::Pending)
    }

    /// A deletion wait: a resource no longer visible has reached the target.
    pub fn deletion<P, S>(pending: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<LifecycleStatus>,
    {
        Self::new(pending, std::iter::empty::<S>()).with_absence(AbsencePolicy::Target)
    }

    pub fn with_failure<F, S>(mut self, failure: F) -> Self
    where
        F: IntoIterator<Item = S>,
        S: Into<LifecycleStatus>,
    {
        self.failure = status_set(failure);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = Some(checks);
        self
    }

    pub fn with_absence(mut self, absence: AbsencePolicy) -> Self {
        self.absence = absence;
        self
    }

    /// Classifies a reported status against this spec.
    pub fn classify(&self, status: &LifecycleStatus) -> StatusClass {
        if self.target.contains(status) {
            StatusClass::Target
        } else if self.failure.contains(status) {
            StatusClass::Failure
        } else if self.pending.contains(status) {
            StatusClass::Pending
        } else {
            StatusClass::Unexpected
        }
    }

    /// Statuses a waiter is prepared to see, for error messages.
    pub fn expected_statuses(&self) -> Vec<String> {
        self.pending
            .iter()
            .chain(&self.target)
            .chain(&self.failure)
            .map(ToString::to_string)
            .collect()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval.is_zero() {
            return Err(CoreError::invalid_wait_spec("poll_interval must be > 0"));
        }
        if self.continuous_target_occurrence == 0 {
            return Err(CoreError::invalid_wait_spec(
                "continuous_target_occurrence must be >= 1",
            ));
        }
        if self.target.is_empty() && self.absence != AbsencePolicy::Target {
            return Err(CoreError::invalid_wait_spec(
                "an empty target set requires absence to count as target",
            ));
        }
        if let Some(status) = self.pending.intersection(&self.target).next() {
            return Err(CoreError::invalid_wait_spec(format!(
                "status {status} is both pending and target"
            )));
        }
        if let Some(status) = self.failure.intersection(&self.target).next() {
            return Err(CoreError::invalid_wait_spec(format!(
                "status {status} is both failure and target"
            )));
        }
        Ok(())
    }
}
