//! Reading configuration from TOML text and files.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Parse and validate TOML text. No environment overrides are applied.
///
/// # Errors
///
/// Returns a parse or validation error.
pub fn from_toml_str(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: "<string>".to_owned(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Load a file, apply `ATTORN_*` overrides from the process environment,
/// and validate.
///
/// # Errors
///
/// Returns a read, parse, environment or validation error.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    load_file_with_env(path, &collect_env_vars())
}

/// [`load_file`] with an explicit environment.
///
/// # Errors
///
/// Returns a read, parse, environment or validation error.
pub fn load_file_with_env<S: ::std::hash::BuildHasher>(
    path: &Path,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<Config> {
    let content = read_bounded(path)?;
    let mut tree: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    let applied = apply_env_overrides(&mut tree, env_vars)?;
    if applied > 0 {
        debug!(count = applied, "applied environment overrides");
    }

    let config: Config = tree
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Read a file in one operation, then check its size.
fn read_bounded(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }
    Ok(content)
}
