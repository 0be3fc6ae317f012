use std::sync::Arc;
use std::time::Duration;

use converge_config::EngineConfig;
use converge_config::loader::from_toml_str;
use converge_core::{DesiredState, LifecycleStatus, ResourceRef};
use converge_engine::{DesiredResource, EngineError, Reconciler};
use converge_remote::{DeleteOutcome, DynRemote, RemoteError};
use converge_remote_memory::{InMemoryRemote, Operation, status};
use indexmap::IndexMap;
use serde_json::{Value, json};
use tokio::time::Instant;

fn config() -> EngineConfig {
    from_toml_str(
        r#"
        [retry]
        budget_ms = 30000
        interval_ms = 1000
        backoff = "fixed"
        transient_messages = ["cannot be assumed"]

        [wait]
        timeout_ms = 30000
        poll_interval_ms = 5000

        [batch]
        associate_max = 10
        disassociate_max = 10
        "#,
    )
    .unwrap()
}

fn ip_set() -> ResourceRef {
    ResourceRef::new("ip-set", "blocked")
}

fn state(pairs: &[(&str, Value)]) -> DesiredState<String, Value> {
    DesiredState::try_from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.clone()))).unwrap()
}

fn members(keys: &[&str]) -> DesiredState<String, Value> {
    state(&keys.iter().map(|k| (*k, json!({}))).collect::<Vec<_>>())
}

fn map(keys: &[&str]) -> IndexMap<String, Value> {
    keys.iter().map(|k| (k.to_string(), json!({}))).collect()
}

fn desired(member_keys: &[&str]) -> DesiredResource {
    DesiredResource::new(ip_set())
        .with_attributes(state(&[("description", json!("edge blocklist"))]))
        .with_members(members(member_keys))
}

#[tokio::test(start_paused = true)]
async fn test_create_then_converge_and_repeat_is_noop() {
    let remote = InMemoryRemote::new()
        .with_visibility_lag(2)
        .with_settle_reads(2);
    let reconciler = Reconciler::from_config(remote, &config());
    let target = desired(&["10.0.0.1/32", "10.0.0.2/32"]);

    let report = reconciler.reconcile(&target).await.unwrap();
    assert!(report.created);
    assert_eq!(report.member_changes.to_add.len(), 2);
    assert!(report.attribute_changes.is_empty());
    assert_eq!(report.steps_applied, 1);

    let stored = reconciler.remote().snapshot(&ip_set()).unwrap();
    assert_eq!(stored.status, LifecycleStatus::new(status::ACTIVE));
    assert_eq!(stored.token, report.token);
    assert_eq!(stored.attributes["description"], json!("edge blocklist"));
    assert_eq!(stored.members.len(), 2);

    let mutations_before = reconciler.remote().mutations().await.len();
    let again = reconciler.reconcile(&target).await.unwrap();
    assert!(again.is_noop());
    assert!(again.member_changes.is_empty());
    assert_eq!(reconciler.remote().mutations().await.len(), mutations_before);
}

#[tokio::test(start_paused = true)]
async fn test_existing_members_add_and_remove() {
    let remote = InMemoryRemote::new();
    remote.seed(
        ip_set(),
        [("description".to_string(), json!("edge blocklist"))].into_iter().collect(),
        map(&["b", "c", "d"]),
    );
    let reconciler = Reconciler::from_config(remote, &config());

    let report = reconciler.reconcile(&desired(&["a", "b", "c"])).await.unwrap();
    assert!(!report.created);
    assert_eq!(report.member_changes.to_add, vec!["a".to_string()]);
    assert_eq!(report.member_changes.to_remove, vec!["d".to_string()]);
    assert!(report.member_changes.to_modify.is_empty());

    let ops: Vec<Operation> = reconciler
        .remote()
        .mutations()
        .await
        .iter()
        .map(|r| r.operation)
        .collect();
    assert_eq!(ops, vec![Operation::Disassociate, Operation::Associate]);

    let stored = reconciler.remote().snapshot(&ip_set()).unwrap();
    let keys: Vec<&str> = stored.members.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["b", "c", "a"]);
}

#[tokio::test(start_paused = true)]
async fn test_tokens_chain_across_every_mutation() {
    let remote = InMemoryRemote::new().with_settle_reads(1);
    let seeded = remote.seed(ip_set(), IndexMap::new(), map(&["old-1", "old-2"]));
    let reconciler = Reconciler::from_config(remote, &config());

    let keys: Vec<String> = (0..25).map(|i| format!("10.0.{i}.0/24")).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let target = DesiredResource::new(ip_set())
        .with_attributes(state(&[
            ("description", json!("edge")),
            ("scope", json!("REGIONAL")),
        ]))
        .with_members(members(&key_refs));

    let report = reconciler.reconcile(&target).await.unwrap();
    // two updates, one disassociate, three associate chunks
    assert_eq!(report.calls, 6);

    let mutations = reconciler.remote().mutations().await;
    assert_eq!(mutations.len(), 6);
    assert_eq!(mutations[0].sent_token.as_ref(), Some(&seeded.token));
    for pair in mutations.windows(2) {
        assert!(pair[0].succeeded);
        assert_eq!(pair[1].sent_token, pair[0].returned_token);
    }
    let sizes: Vec<usize> = mutations[3..].iter().map(|r| r.items).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(mutations[5].returned_token.as_ref(), Some(&report.token));
}

#[tokio::test(start_paused = true)]
async fn test_partial_batch_failure_names_the_rejected_item() {
    let remote = InMemoryRemote::new();
    remote.seed(ip_set(), IndexMap::new(), IndexMap::new());
    remote.reject_member("m7", "InvalidParameterException", "malformed address");
    let reconciler = Reconciler::from_config(remote, &config());

    let keys: Vec<String> = (1..=15).map(|i| format!("m{i}")).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let target = DesiredResource::new(ip_set()).with_members(members(&key_refs));

    let err = reconciler.reconcile(&target).await.unwrap_err();
    let partial = err.partial_batch().unwrap();
    assert_eq!(partial.keys(), vec!["m7"]);
    assert_eq!(partial.unprocessed[0].code, "InvalidParameterException");
    assert!(err.to_string().contains("malformed address"));

    let mutations = reconciler.remote().mutations().await;
    assert_eq!(mutations.len(), 2);
    assert_eq!(mutations[1].items, 5);
    assert_eq!(reconciler.remote().snapshot(&ip_set()).unwrap().members.len(), 14);

    match err {
        EngineError::Mutation(failure) => {
            assert_eq!(failure.last_token, reconciler.remote().snapshot(&ip_set()).unwrap().token);
        }
        other => panic!("expected mutation failure, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_conflict_is_absorbed_by_one_refresh() {
    let remote = InMemoryRemote::new();
    remote.seed(ip_set(), IndexMap::new(), IndexMap::new());
    remote
        .fail_next(Operation::Update, RemoteError::conflict("stale", "fresh"))
        .await;
    let reconciler = Reconciler::from_config(remote, &config());

    let report = reconciler.reconcile(&desired(&[])).await.unwrap();
    assert_eq!(report.steps_applied, 1);
    let stored = reconciler.remote().snapshot(&ip_set()).unwrap();
    assert_eq!(stored.attributes["description"], json!("edge blocklist"));
}

#[tokio::test(start_paused = true)]
async fn test_second_conflict_is_fatal() {
    let remote = InMemoryRemote::new();
    remote.seed(ip_set(), IndexMap::new(), IndexMap::new());
    remote
        .fail_times(Operation::Update, 2, RemoteError::conflict("stale", "fresh"))
        .await;
    let reconciler = Reconciler::from_config(remote, &config());

    let err = reconciler.reconcile(&desired(&["a"])).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(err.to_string().contains("description"));
    // the member step after the failed update never ran
    let ops: Vec<Operation> = reconciler
        .remote()
        .mutations()
        .await
        .iter()
        .map(|r| r.operation)
        .collect();
    assert_eq!(ops, vec![Operation::Update, Operation::Update]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_create_error_is_retried() {
    let remote = InMemoryRemote::new();
    remote
        .fail_times(
            Operation::Create,
            2,
            RemoteError::api("InvalidParameterException", "role cannot be assumed by service"),
        )
        .await;
    let reconciler = Reconciler::from_config(remote, &config());

    let report = reconciler.reconcile(&desired(&[])).await.unwrap();
    assert!(report.created);
    let creates = reconciler
        .remote()
        .journal()
        .await
        .iter()
        .filter(|r| r.operation == Operation::Create)
        .count();
    assert_eq!(creates, 3);
}

#[tokio::test(start_paused = true)]
async fn test_creation_wait_times_out_within_bound() {
    let remote = InMemoryRemote::new().with_settle_reads(1_000);
    let reconciler = Reconciler::from_config(remote, &config());

    let start = Instant::now();
    let err = reconciler.reconcile(&desired(&[])).await.unwrap_err();
    match err {
        EngineError::Timeout {
            resource,
            last_status,
            elapsed,
            ..
        } => {
            assert_eq!(resource, ip_set());
            assert_eq!(last_status, Some(LifecycleStatus::new(status::CREATING)));
            assert_eq!(elapsed, Duration::from_secs(30));
        }
        other => panic!("expected timeout, got {other}"),
    }
    assert!(start.elapsed() <= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_destroy_is_idempotent() {
    let remote = InMemoryRemote::new().with_settle_reads(2);
    remote.seed(ip_set(), IndexMap::new(), IndexMap::new());
    let reconciler = Reconciler::from_config(remote, &config());

    assert_eq!(reconciler.destroy(&ip_set()).await.unwrap(), DeleteOutcome::Deleted);
    assert!(!reconciler.remote().contains(&ip_set()));
    assert_eq!(
        reconciler.destroy(&ip_set()).await.unwrap(),
        DeleteOutcome::AlreadyAbsent
    );
}

#[tokio::test(start_paused = true)]
async fn test_read_errors_pass_through_the_guard() {
    let remote = InMemoryRemote::new();
    remote
        .fail_next(Operation::Read, RemoteError::api("AccessDeniedException", "not authorized"))
        .await;
    let reconciler = Reconciler::from_config(remote, &config());

    let err = reconciler.reconcile(&desired(&[])).await.unwrap_err();
    assert!(matches!(err, EngineError::Remote { ref concern, .. } if concern == "read"));
    assert!(err.to_string().contains("not authorized"));
    assert!(!reconciler.remote().contains(&ip_set()));
}

#[tokio::test(start_paused = true)]
async fn test_cleared_attribute_converges_after_one_pass() {
    let memory = Arc::new(InMemoryRemote::new());
    memory.seed(
        ip_set(),
        [("description".to_string(), json!("old"))].into_iter().collect(),
        IndexMap::new(),
    );
    let remote: DynRemote = memory.clone();
    let reconciler = Reconciler::from_config(remote, &config());
    let target = DesiredResource::new(ip_set()).with_attributes(state(&[("description", Value::Null)]));

    let first = reconciler.reconcile(&target).await.unwrap();
    assert_eq!(first.calls, 1);
    assert_eq!(first.attribute_changes.to_modify, vec!["description".to_string()]);
    assert!(!memory.snapshot(&ip_set()).unwrap().attributes.contains_key("description"));

    for _ in 0..2 {
        let again = reconciler.reconcile(&target).await.unwrap();
        assert!(again.is_noop());
        assert!(again.attribute_changes.is_empty());
    }
    assert_eq!(memory.mutations().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_chunk_and_rejected_item_are_reported_together() {
    let remote = InMemoryRemote::new();
    remote.seed(ip_set(), IndexMap::new(), IndexMap::new());
    remote.reject_member("m7", "InvalidParameterException", "malformed address");
    remote
        .fail_nth(Operation::Associate, 2, RemoteError::api("ValidationException", "chunk 2 rejected"))
        .await;
    let reconciler = Reconciler::from_config(remote, &config());

    let keys: Vec<String> = (1..=15).map(|i| format!("m{i}")).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let target = DesiredResource::new(ip_set()).with_members(members(&key_refs));

    let err = reconciler.reconcile(&target).await.unwrap_err();
    let partial = err.partial_batch().unwrap();
    let mut expected = vec!["m7".to_string()];
    expected.extend((11..=15).map(|i| format!("m{i}")));
    assert_eq!(partial.keys(), expected);
    assert!(err.to_string().contains("malformed address"));
    assert!(err.to_string().contains("chunk 2 rejected"));
    assert_eq!(reconciler.remote().snapshot(&ip_set()).unwrap().members.len(), 9);

    // once the remote stops rejecting, the next pass adds only what is missing
    reconciler.remote().clear_rejections();
    let report = reconciler.reconcile(&target).await.unwrap();
    assert_eq!(report.member_changes.to_add.len(), 6);
    assert_eq!(report.calls, 1);
    assert_eq!(reconciler.remote().snapshot(&ip_set()).unwrap().members.len(), 15);
}

#[tokio::test(start_paused = true)]
async fn test_failure_status_during_update_wait_is_terminal() {
    let remote = Arc::new(InMemoryRemote::new().with_settle_reads(1_000));
    remote.seed(ip_set(), IndexMap::new(), IndexMap::new());
    let reconciler = Reconciler::from_config(Arc::clone(&remote), &config());

    let writer = Arc::clone(&remote);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        writer.set_status(&ip_set(), "FAILED");
    });

    let err = reconciler.reconcile(&desired(&[])).await.unwrap_err();
    match &err {
        EngineError::TerminalState { resource, status, .. } => {
            assert_eq!(resource, &ip_set());
            assert_eq!(status, &LifecycleStatus::new("FAILED"));
        }
        other => panic!("expected terminal state, got {other}"),
    }
    assert!(err.to_string().contains("ip-set/blocked"));
    assert!(err.to_string().contains("FAILED"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_status_during_creation_wait_is_unexpected() {
    let remote = Arc::new(InMemoryRemote::new().with_settle_reads(1_000));
    let reconciler = Reconciler::from_config(Arc::clone(&remote), &config());

    let writer = Arc::clone(&remote);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        writer.set_status(&ip_set(), "SUSPENDED");
    });

    let err = reconciler.reconcile(&desired(&[])).await.unwrap_err();
    match err {
        EngineError::UnexpectedState { resource, status, .. } => {
            assert_eq!(resource, ip_set());
            assert_eq!(status, LifecycleStatus::new("SUSPENDED"));
        }
        other => panic!("expected unexpected state, got {other}"),
    }
}
