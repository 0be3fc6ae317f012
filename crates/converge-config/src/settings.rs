use std::num::NonZeroUsize;
use std::time::Duration;

use converge_core::{Backoff, LifecycleStatus, RetryPolicy, WaitSpec};
use converge_remote::TransientClassifier;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Largest per-call item limit observed across control-plane batch APIs.
pub const MAX_BATCH_LIMIT: usize = 1600;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub wait: WaitSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Retry validations
        if self.retry.interval_ms == 0 {
            return Err(ConfigError::validation("retry.interval_ms must be > 0"));
        }
        if self.retry.backoff == BackoffKind::Exponential
            && self.retry.max_interval_ms < self.retry.interval_ms
        {
            return Err(ConfigError::validation(
                "retry.max_interval_ms must be >= retry.interval_ms",
            ));
        }
        // Wait validations
        if self.wait.timeout_ms == 0 {
            return Err(ConfigError::validation("wait.timeout_ms must be > 0"));
        }
        if self.wait.poll_interval_ms == 0 {
            return Err(ConfigError::validation("wait.poll_interval_ms must be > 0"));
        }
        if self.wait.poll_interval_ms > self.wait.timeout_ms {
            return Err(ConfigError::validation(
                "wait.poll_interval_ms must be <= wait.timeout_ms",
            ));
        }
        if self.wait.continuous_target_occurrence == 0 {
            return Err(ConfigError::validation(
                "wait.continuous_target_occurrence must be >= 1",
            ));
        }
        // Batch validations
        for (name, value) in [
            ("batch.associate_max", self.batch.associate_max),
            ("batch.disassociate_max", self.batch.disassociate_max),
        ] {
            if value == 0 || value > MAX_BATCH_LIMIT {
                return Err(ConfigError::validation(format!(
                    "{name} must be between 1 and {MAX_BATCH_LIMIT}"
                )));
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Time spent retrying transient errors before the final attempt.
    pub budget_ms: u64,
    /// Fixed interval, or the first interval for exponential backoff.
    pub interval_ms: u64,
    pub backoff: BackoffKind,
    pub max_interval_ms: u64,
    /// Service error codes that are always transient.
    pub transient_codes: Vec<String>,
    /// Message fragments that mark an error as transient.
    pub transient_messages: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            budget_ms: 120_000,
            interval_ms: 500,
            backoff: BackoffKind::Exponential,
            max_interval_ms: 10_000,
            transient_codes: vec![
                "ResourceInUseException".to_string(),
                "ThrottlingException".to_string(),
            ],
            transient_messages: Vec::new(),
        }
    }
}

impl RetrySettings {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn policy(&self) -> RetryPolicy {
        let interval = Duration::from_millis(self.interval_ms);
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(interval),
            BackoffKind::Exponential => Backoff::Exponential {
                initial: interval,
                max: Duration::from_millis(self.max_interval_ms),
                multiplier: 2,
            },
        };
        RetryPolicy::new(self.budget(), backoff)
    }

    pub fn classifier(&self) -> TransientClassifier {
        self.transient_messages.iter().fold(
            TransientClassifier::new().with_codes(self.transient_codes.iter().cloned()),
            |classifier, fragment| classifier.with_message_fragment(fragment.clone()),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WaitSettings {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub initial_delay_ms: u64,
    pub continuous_target_occurrence: u32,
    pub not_found_checks: Option<u32>,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 600_000,
            poll_interval_ms: 5_000,
            initial_delay_ms: 0,
            continuous_target_occurrence: 1,
            not_found_checks: None,
        }
    }
}

impl WaitSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Overlays the configured timing knobs onto a status shape.
    pub fn apply(&self, spec: WaitSpec) -> WaitSpec {
        let spec = spec
            .with_timeout(self.timeout())
            .with_poll_interval(self.poll_interval())
            .with_initial_delay(self.initial_delay())
            .with_continuous_target_occurrence(self.continuous_target_occurrence);
        match self.not_found_checks {
            Some(checks) => spec.with_not_found_checks(checks),
            None => spec,
        }
    }

    pub fn creation_spec<P, T, S>(&self, pending: P, target: T) -> WaitSpec
    where
        P: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: Into<LifecycleStatus>,
    {
        self.apply(WaitSpec::creation(pending, target))
    }

    pub fn deletion_spec<P, S>(&self, pending: P) -> WaitSpec
    where
        P: IntoIterator<Item = S>,
        S: Into<LifecycleStatus>,
    {
        self.apply(WaitSpec::deletion(pending))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchSettings {
    pub associate_max: usize,
    pub disassociate_max: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            associate_max: 10,
            disassociate_max: 10,
        }
    }
}

impl BatchSettings {
    pub fn associate_limit(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.associate_max).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn disassociate_limit(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.disassociate_max).unwrap_or(NonZeroUsize::MIN)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
