//! `ATTORN_*` environment overrides.
//!
//! Overrides are applied to the parsed TOML tree before it is deserialized,
//! so a variable wins over the file for the field it names.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Kind of value a variable carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Int,
    Float,
    Bool,
    /// Comma-separated strings.
    List,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: Kind,
}

const fn map(var_name: &'static str, field_path: &'static str, kind: Kind) -> EnvMapping {
    EnvMapping {
        var_name,
        field_path,
        kind,
    }
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    map("ATTORN_ISSUER", "tokens.issuer", Kind::Str),
    map("ATTORN_ACCESS_TTL_SECS", "tokens.access_ttl_secs", Kind::Int),
    map("ATTORN_REFRESH_TTL_SECS", "tokens.refresh_ttl_secs", Kind::Int),
    map("ATTORN_ENCRYPT_AT_REST", "tokens.encrypt_at_rest", Kind::Bool),
    map("ATTORN_SIGNING_KEY_PATH", "keys.signing_key_path", Kind::Str),
    map("ATTORN_SEALING_KEY_PATH", "keys.sealing_key_path", Kind::Str),
    map("ATTORN_VALIDATE_ISSUER", "validation.validate_issuer", Kind::Bool),
    map("ATTORN_ALLOWED_ISSUERS", "validation.allowed_issuers", Kind::List),
    map("ATTORN_VALIDATE_AUDIENCE", "validation.validate_audience", Kind::Bool),
    map("ATTORN_ALLOWED_AUDIENCES", "validation.allowed_audiences", Kind::List),
    map("ATTORN_CLOCK_SKEW_SECS", "validation.clock_skew_secs", Kind::Int),
    map("ATTORN_MAX_CHAIN_DEPTH", "delegation.max_chain_depth", Kind::Int),
    map("ATTORN_POLICY_ALGORITHM", "policy.combining_algorithm", Kind::Str),
    map("ATTORN_DISTRIBUTED_ENABLED", "distributed.enabled", Kind::Bool),
    map("ATTORN_CACHE_TTL_SECS", "distributed.cache_ttl_secs", Kind::Int),
    map("ATTORN_NEGATIVE_TTL_SECS", "distributed.negative_ttl_secs", Kind::Int),
    map("ATTORN_RATE_PER_SUBJECT", "rate_limit.per_subject_rate", Kind::Float),
    map("ATTORN_RATE_BURST", "rate_limit.per_subject_burst", Kind::Int),
    map("ATTORN_MAX_IN_FLIGHT", "rate_limit.max_in_flight", Kind::Int),
    map("ATTORN_LOG_LEVEL", "logging.level", Kind::Str),
    map("ATTORN_LOG_FORMAT", "logging.format", Kind::Str),
    map("ATTORN_REQUEST_TIMEOUT_SECS", "timeouts.request_secs", Kind::Int),
];

/// Apply every known `ATTORN_*` variable in `env_vars` to `root`.
///
/// Returns the number applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] for a value that does not parse as the
/// field's type.
pub fn apply_env_overrides<S: ::std::hash::BuildHasher>(
    root: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;
    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let value = coerce(mapping, raw)?;
        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env override"
        );
        set_field(root, mapping.field_path, value);
        count = count.saturating_add(1);
    }
    Ok(count)
}

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    let invalid = |expected: &str| ConfigError::EnvError {
        var_name: mapping.var_name.to_owned(),
        message: format!("expected {expected}, got {raw:?}"),
    };
    let trimmed = raw.trim();
    Ok(match mapping.kind {
        Kind::Str => toml::Value::String(raw.to_owned()),
        Kind::Int => toml::Value::Integer(
            trimmed
                .parse::<i64>()
                .map_err(|_| invalid("an integer"))?,
        ),
        Kind::Float => toml::Value::Float(
            trimmed
                .parse::<f64>()
                .map_err(|_| invalid("a number"))?,
        ),
        Kind::Bool => toml::Value::Boolean(
            trimmed
                .parse::<bool>()
                .map_err(|_| invalid("true or false"))?,
        ),
        Kind::List => toml::Value::Array(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_owned()))
                .collect(),
        ),
    })
}

/// Set a dotted path, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let Some((parents, leaf)) = path.rsplit_once('.') else {
        if let Some(table) = root.as_table_mut() {
            table.insert(path.to_owned(), value);
        }
        return;
    };

    let mut current = root;
    for segment in parents.split('.') {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        let child = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        if !child.is_table() {
            *child = toml::Value::Table(toml::map::Map::new());
        }
        current = child;
    }
    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_overrides_file_value() {
        let mut root: toml::Value = toml::from_str("[tokens]\nissuer = \"file\"\n").unwrap();
        let env = make_env(&[
            ("ATTORN_ISSUER", "env"),
            ("ATTORN_MAX_CHAIN_DEPTH", "3"),
            ("ATTORN_ALLOWED_ISSUERS", "a, b,,c"),
            ("UNRELATED", "x"),
        ]);
        assert_eq!(apply_env_overrides(&mut root, &env).unwrap(), 3);

        assert_eq!(root["tokens"]["issuer"].as_str(), Some("env"));
        assert_eq!(root["delegation"]["max_chain_depth"].as_integer(), Some(3));
        let issuers: Vec<_> = root["validation"]["allowed_issuers"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert_eq!(issuers, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_bad_type_is_error() {
        let mut root = toml::Value::Table(toml::map::Map::new());
        let env = make_env(&[("ATTORN_ENCRYPT_AT_REST", "yes")]);
        let err = apply_env_overrides(&mut root, &env).unwrap_err();
        assert!(matches!(err, ConfigError::EnvError { var_name, .. } if var_name == "ATTORN_ENCRYPT_AT_REST"));
    }
}
