use std::io::Write;

use converge_config::loader::{load_config, load_config_with_default_path};
use converge_config::{BackoffKind, ConfigError};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"
        [retry]
        budget_ms = 30000
        interval_ms = 250
        backoff = "fixed"
        transient_codes = ["ResourceInUseException"]
        transient_messages = ["propagation"]

        [wait]
        timeout_ms = 60000
        poll_interval_ms = 2000
        not_found_checks = 20

        [batch]
        associate_max = 50
        disassociate_max = 100

        [logging]
        level = "debug"
        "#,
    );

    let cfg = load_config(file.path().to_str()).unwrap();
    assert_eq!(cfg.retry.budget_ms, 30_000);
    assert_eq!(cfg.retry.backoff, BackoffKind::Fixed);
    assert_eq!(cfg.retry.transient_messages, vec!["propagation".to_string()]);
    assert_eq!(cfg.wait.timeout_ms, 60_000);
    assert_eq!(cfg.wait.not_found_checks, Some(20));
    assert_eq!(cfg.batch.disassociate_limit().get(), 100);
    assert_eq!(cfg.logging.level, "debug");
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let cfg = load_config_with_default_path(Some(&missing)).unwrap();
    assert_eq!(cfg.retry.budget_ms, 120_000);
    assert_eq!(cfg.batch.associate_max, 10);
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = write_config("[batch]\nassociate_max = 5000\n");
    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_environment_overrides_file() {
    let file = write_config("[wait]\ninitial_delay_ms = 100\n");
    // SAFETY: no other test in this binary reads or writes this variable.
    unsafe {
        std::env::set_var("CONVERGE__WAIT__INITIAL_DELAY_MS", "750");
    }
    let cfg = load_config(file.path().to_str());
    unsafe {
        std::env::remove_var("CONVERGE__WAIT__INITIAL_DELAY_MS");
    }
    assert_eq!(cfg.unwrap().wait.initial_delay_ms, 750);
}

#[test]
fn test_malformed_file_error_names_the_file() {
    let file = write_config("[retry\nbudget_ms = 1\n");
    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}
