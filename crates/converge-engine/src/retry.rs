//! Transient-error retrier.
//!
//! [`retry_when`] retries an operation while its error is classified as
//! transient, bounded by the policy's budget. Once the budget is spent it makes
//! exactly one final attempt and returns whatever that yields. Non-transient
//! errors are returned immediately.

use std::fmt::Display;
use std::future::Future;

use converge_core::{ResourceRef, RetryPolicy};
use converge_remote::{RemoteError, RemoteResource};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::EngineError;

pub async fn retry_when<T, E, P, F, Fut>(policy: &RetryPolicy, is_transient: P, mut op: F) -> Result<T, E>
where
    E: Display,
    P: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let deadline = Instant::now() + policy.budget;
    let mut attempt: u32 = 0;

    while Instant::now() < deadline {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_transient(&err) => return Err(err),
            Err(err) => err,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let delay = policy.backoff.delay(attempt).min(remaining);
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient error, retrying"
        );
        sleep(delay).await;
    }

    debug!(attempts = attempt, "Retry budget exhausted, making final attempt");
    op().await
}

/// Retries while a just-created resource is not yet visible.
///
/// When `is_new` is set, NotFound counts as transient (read-after-create lag)
/// in addition to whatever `is_transient` accepts.
pub async fn retry_when_new_resource_not_found<T, P, F, Fut>(
    policy: &RetryPolicy,
    is_new: bool,
    is_transient: P,
    op: F,
) -> Result<T, RemoteError>
where
    P: Fn(&RemoteError) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    retry_when(
        policy,
        |err: &RemoteError| (is_new && err.is_not_found()) || is_transient(err),
        op,
    )
    .await
}

/// Polls `op` until it reports NotFound.
///
/// A successful read means the resource still exists and is retried after the
/// backoff delay. Any other error is returned at once. If the resource is still
/// present after the budget and one final read, the result is a timeout
/// carrying the last status seen.
pub async fn retry_until_not_found<F, Fut>(
    resource: &ResourceRef,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<(), EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RemoteResource, RemoteError>>,
{
    let started = Instant::now();
    let deadline = started + policy.budget;
    let mut attempt: u32 = 0;

    loop {
        let exhausted = Instant::now() >= deadline;
        attempt += 1;
        let present = match op().await {
            Ok(present) => present,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(EngineError::from_remote(resource, "read", err, false)),
        };

        if exhausted {
            return Err(EngineError::Timeout {
                resource: resource.clone(),
                last_status: Some(present.status),
                elapsed: started.elapsed(),
                expected: vec!["<absent>".to_string()],
            });
        }

        debug!(resource = %resource, attempt, status = %present.status, "Still present");
        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(policy.backoff.delay(attempt).min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use converge_core::ConcurrencyToken;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn policy(budget_secs: u64, interval_secs: u64) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_secs(budget_secs), Duration::from_secs(interval_secs))
    }

    fn is_throttled(err: &RemoteError) -> bool {
        matches!(err, RemoteError::Throttled { .. })
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry_when(&policy(60, 1), is_throttled, || async {
            match calls.fetch_add(1, Ordering::SeqCst) + 1 {
                n if n < 3 => Err(RemoteError::throttled("role not yet assumable")),
                _ => Ok("created"),
            }
        })
        .await;

        assert_eq!(assert_ok!(result), "created");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_returns_immediately() {
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_when(&policy(60, 1), is_throttled, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::api("ValidationException", "bad name"))
        })
        .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_makes_one_final_call() {
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_when(&policy(10, 1), is_throttled, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::throttled("still propagating"))
        })
        .await;

        assert!(matches!(assert_err!(result), RemoteError::Throttled { .. }));
        // ten attempts inside the budget plus the final one
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_call_can_succeed() {
        let calls = AtomicU32::new(0);
        let result = retry_when(&policy(3, 1), is_throttled, || async {
            match calls.fetch_add(1, Ordering::SeqCst) + 1 {
                n if n <= 3 => Err(RemoteError::throttled("busy")),
                _ => Ok(42),
            }
        })
        .await;
        assert_eq!(assert_ok!(result), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_calls_once() {
        let calls = AtomicU32::new(0);
        let _: Result<(), _> = retry_when(&policy(0, 1), is_throttled, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::throttled("busy"))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_is_capped() {
        let start = Instant::now();
        let policy = RetryPolicy::exponential(
            Duration::from_secs(100),
            Duration::from_secs(1),
            Duration::from_secs(4),
        );
        let calls = AtomicU32::new(0);
        let result = retry_when(&policy, is_throttled, || async {
            match calls.fetch_add(1, Ordering::SeqCst) + 1 {
                n if n < 5 => Err(RemoteError::throttled("busy")),
                _ => Ok(()),
            }
        })
        .await;

        assert_ok!(result);
        // 1 + 2 + 4 + 4
        assert_eq!(start.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_resource_not_found_is_transient_only_when_new() {
        let calls = Arc::new(AtomicU32::new(0));
        let read = || {
            let calls = Arc::clone(&calls);
            async move {
                match calls.fetch_add(1, Ordering::SeqCst) + 1 {
                    n if n < 3 => Err(RemoteError::not_found("queue", "jobs")),
                    _ => Ok("visible"),
                }
            }
        };

        let result = retry_when_new_resource_not_found(&policy(30, 1), true, is_throttled, read).await;
        assert_eq!(assert_ok!(result), "visible");

        calls.store(0, Ordering::SeqCst);
        let result = retry_when_new_resource_not_found(&policy(30, 1), false, is_throttled, read).await;
        assert!(assert_err!(result).is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn present(status: &str) -> RemoteResource {
        RemoteResource::new(
            ResourceRef::new("queue", "jobs"),
            ConcurrencyToken::new("t1"),
            status,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_not_found() {
        let resource = ResourceRef::new("queue", "jobs");
        let calls = AtomicU32::new(0);
        let result = retry_until_not_found(&resource, &policy(30, 2), || async {
            match calls.fetch_add(1, Ordering::SeqCst) + 1 {
                n if n < 4 => Ok(present("DELETING")),
                _ => Err(RemoteError::not_found("queue", "jobs")),
            }
        })
        .await;
        assert_ok!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_not_found_times_out() {
        let resource = ResourceRef::new("queue", "jobs");
        let err = retry_until_not_found(&resource, &policy(10, 3), || async { Ok(present("DELETING")) })
            .await
            .unwrap_err();
        match err {
            EngineError::Timeout { last_status, elapsed, .. } => {
                assert_eq!(last_status.unwrap().as_str(), "DELETING");
                assert_eq!(elapsed, Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_not_found_passes_other_errors() {
        let resource = ResourceRef::new("queue", "jobs");
        let err = retry_until_not_found(&resource, &policy(10, 1), || async {
            Err(RemoteError::api("AccessDenied", "no"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Remote { .. }));
    }
}
