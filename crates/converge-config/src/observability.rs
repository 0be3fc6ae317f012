//! Tracing subscriber setup for processes embedding the engine.
//!
//! The configured level applies to the converge crates; every other target
//! logs at `warn`. `CONVERGE_LOG` takes a full filter directive and wins over
//! the configuration.
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::{ConfigError, LoggingConfig};

/// Environment variable holding a full `EnvFilter` directive.
pub const LOG_ENV_VAR: &str = "CONVERGE_LOG";

const ENGINE_TARGETS: [&str; 5] = [
    "converge_config",
    "converge_core",
    "converge_engine",
    "converge_remote",
    "converge_remote_memory",
];

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Filter logging the engine crates at `level` and everything else at `warn`.
pub fn engine_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    let level = level.trim().to_ascii_lowercase();
    let directives = ENGINE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .fold(String::from("warn"), |acc, directive| acc + "," + &directive);
    EnvFilter::try_new(&directives)
        .map_err(|e| ConfigError::parse(format!("invalid log level {level:?}: {e}")))
}

/// Installs the global subscriber. Returns `Ok(false)` when another
/// subscriber was already installed; the level can then not be reloaded.
pub fn init_from_config(logging: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = match std::env::var(LOG_ENV_VAR) {
        Ok(directives) => EnvFilter::try_new(&directives)
            .map_err(|e| ConfigError::parse(format!("{LOG_ENV_VAR}: {e}")))?,
        Err(_) => engine_filter(&logging.level)?,
    };

    let (reload_layer, handle) = reload::Layer::new(filter);
    let installed = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();
    if installed {
        let _ = FILTER_HANDLE.set(handle);
    }
    Ok(installed)
}

pub fn init_tracing() -> Result<bool, ConfigError> {
    init_from_config(&LoggingConfig::default())
}

/// Changes the engine level at runtime. Returns `Ok(false)` if the
/// subscriber was not installed by [`init_from_config`].
pub fn apply_logging_level(level: &str) -> Result<bool, ConfigError> {
    let filter = engine_filter(level)?;
    match FILTER_HANDLE.get() {
        Some(handle) => handle
            .reload(filter)
            .map(|()| true)
            .map_err(|e| ConfigError::parse(e.to_string())),
        None => Ok(false),
    }
}
