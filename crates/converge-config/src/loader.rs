use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use tracing::debug;

use crate::{ConfigError, EngineConfig, Result};

/// File picked up when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "converge.toml";

/// Prefix of environment overrides, e.g. `CONVERGE__RETRY__BUDGET_MS=30000`.
pub const ENV_PREFIX: &str = "CONVERGE";

/// Loads engine settings from an optional TOML file, then applies
/// `CONVERGE__<SECTION>__<KEY>` environment overrides and validates the result.
/// A missing file leaves the defaults in place.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    load_config_with_default_path(path)
}

pub fn load_config_with_default_path<P: AsRef<Path>>(path: Option<P>) -> Result<EngineConfig> {
    let file = config_file(path.as_ref().map(AsRef::as_ref));

    let mut builder = Config::builder();
    if let Some(file) = &file {
        builder = builder.add_source(File::from(file.as_path()).required(true));
    }
    let engine: EngineConfig = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
        .build()
        .and_then(|merged| merged.try_deserialize::<EngineConfig>())
        .map_err(|e| match &file {
            Some(file) => ConfigError::parse(format!("{}: {e}", file.display())),
            None => ConfigError::parse(format!("environment overrides: {e}")),
        })?;
    engine.validate()?;

    debug!(
        file = ?file,
        retry_budget_ms = engine.retry.budget_ms,
        wait_timeout_ms = engine.wait.timeout_ms,
        "Engine configuration loaded"
    );
    Ok(engine)
}

fn config_file(path: Option<&Path>) -> Option<PathBuf> {
    let candidate = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
    if candidate.is_file() {
        Some(candidate)
    } else {
        debug!(path = %candidate.display(), "No configuration file, using defaults");
        None
    }
}

/// Parses and validates settings from TOML text, without environment overrides.
pub fn from_toml_str(content: &str) -> Result<EngineConfig> {
    let cfg: EngineConfig =
        toml::from_str(content).map_err(|e| ConfigError::parse(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}
