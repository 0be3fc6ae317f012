//! Configuration for the converge reconciliation engine.
//!
//! This crate provides:
//! - [`EngineConfig`]: typed retry, wait, batch and logging settings
//! - [`loader::load_config`]: TOML file plus `CONVERGE__*` environment overrides
//! - [`observability`]: tracing subscriber setup with a reloadable level
//!
//! Settings convert into the policy values the engine consumes
//! (`RetryPolicy`, `WaitSpec`, `TransientClassifier`, chunk limits), so the
//! engine itself never parses configuration.

pub mod loader;
pub mod observability;
pub mod settings;

pub use settings::{
    BackoffKind, BatchSettings, EngineConfig, LoggingConfig, RetrySettings, WaitSettings,
};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
