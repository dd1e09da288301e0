//! Configuration validation.
//!
//! Every failure here is fatal: the engine refuses to start on a config
//! that does not pass.

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest a rejection may be cached.
pub const MAX_NEGATIVE_TTL_SECS: u64 = 30;

/// Validate a deserialized configuration.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_keys(config)?;
    validate_settings(config)
}

/// Validate everything except key material, for callers that supply keys
/// directly.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_settings(config: &Config) -> ConfigResult<()> {
    validate_tokens(config)?;
    validate_validation(config)?;
    validate_delegation(config)?;
    validate_attestation(config)?;
    validate_policy(config)?;
    validate_distributed(config)?;
    validate_rate_limit(config)?;
    validate_logging(config)?;
    validate_timeouts(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_keys(config: &Config) -> ConfigResult<()> {
    let Some(path) = &config.keys.signing_key_path else {
        return Err(ConfigError::SigningKey {
            path: None,
            message: "keys.signing_key_path is not set".to_owned(),
        });
    };
    readable_file(path).map_err(|message| ConfigError::SigningKey {
        path: Some(path.clone()),
        message,
    })?;

    if config.tokens.encrypt_at_rest {
        let Some(sealing) = &config.keys.sealing_key_path else {
            return Err(invalid(
                "keys.sealing_key_path",
                "tokens.encrypt_at_rest requires a sealing key",
            ));
        };
        readable_file(sealing).map_err(|m| invalid("keys.sealing_key_path", m))?;
    }
    Ok(())
}

fn readable_file(path: &str) -> Result<(), String> {
    let meta = std::fs::metadata(Path::new(path)).map_err(|e| e.to_string())?;
    if meta.is_file() {
        Ok(())
    } else {
        Err("not a regular file".to_owned())
    }
}

fn validate_tokens(config: &Config) -> ConfigResult<()> {
    let t = &config.tokens;
    if t.issuer.trim().is_empty() {
        return Err(invalid("tokens.issuer", "issuer must not be empty"));
    }
    for (field, secs) in [
        ("tokens.access_ttl_secs", t.access_ttl_secs),
        ("tokens.refresh_ttl_secs", t.refresh_ttl_secs),
        ("tokens.id_ttl_secs", t.id_ttl_secs),
    ] {
        if secs == 0 {
            return Err(invalid(field, "token lifetime must be positive"));
        }
    }
    Ok(())
}

fn validate_validation(config: &Config) -> ConfigResult<()> {
    let v = &config.validation;
    if v.validate_issuer && v.allowed_issuers.is_empty() {
        return Err(invalid(
            "validation.allowed_issuers",
            "validate_issuer is enabled with no allowed issuers",
        ));
    }
    if v.validate_audience && v.allowed_audiences.is_empty() {
        return Err(invalid(
            "validation.allowed_audiences",
            "validate_audience is enabled with no allowed audiences",
        ));
    }
    Ok(())
}

fn validate_delegation(config: &Config) -> ConfigResult<()> {
    if config.delegation.max_chain_depth == 0 {
        return Err(invalid(
            "delegation.max_chain_depth",
            "max_chain_depth must be at least 1",
        ));
    }
    Ok(())
}

fn validate_attestation(config: &Config) -> ConfigResult<()> {
    let a = &config.attestation;
    if a.attesters.is_empty() {
        return Err(invalid(
            "attestation.attesters",
            "at least one attester is required",
        ));
    }
    if !matches!(
        a.attester_type.as_str(),
        "notary_public"
            | "legal_counsel"
            | "board_member"
            | "witness"
            | "digital_signature"
            | "biometric"
    ) {
        return Err(invalid(
            "attestation.attester_type",
            format!("unknown attester type '{}'", a.attester_type),
        ));
    }
    if !matches!(a.level.as_str(), "basic" | "enhanced" | "maximum") {
        return Err(invalid(
            "attestation.level",
            format!("unknown level '{}'; expected basic, enhanced or maximum", a.level),
        ));
    }
    if a.required_count > a.attesters.len() {
        return Err(invalid(
            "attestation.required_count",
            format!(
                "required_count {} exceeds the {} configured attesters",
                a.required_count,
                a.attesters.len()
            ),
        ));
    }
    Ok(())
}

fn validate_policy(config: &Config) -> ConfigResult<()> {
    let p = &config.policy;
    if !matches!(
        p.combining_algorithm.as_str(),
        "deny-overrides" | "permit-overrides" | "first-applicable"
    ) {
        return Err(invalid(
            "policy.combining_algorithm",
            format!(
                "unknown algorithm '{}'; expected deny-overrides, permit-overrides or first-applicable",
                p.combining_algorithm
            ),
        ));
    }
    if !matches!(p.default_effect.as_str(), "deny" | "permit") {
        return Err(invalid(
            "policy.default_effect",
            format!("unknown effect '{}'; expected deny or permit", p.default_effect),
        ));
    }
    Ok(())
}

fn validate_distributed(config: &Config) -> ConfigResult<()> {
    let d = &config.distributed;
    if d.negative_ttl_secs > MAX_NEGATIVE_TTL_SECS {
        return Err(invalid(
            "distributed.negative_ttl_secs",
            format!(
                "negative_ttl_secs {} exceeds the {MAX_NEGATIVE_TTL_SECS} second maximum",
                d.negative_ttl_secs
            ),
        ));
    }
    if d.enabled && d.cache_ttl_secs == 0 {
        return Err(invalid(
            "distributed.cache_ttl_secs",
            "cache_ttl_secs must be positive when the cache is enabled",
        ));
    }
    Ok(())
}

fn validate_rate_limit(config: &Config) -> ConfigResult<()> {
    let r = &config.rate_limit;
    if !r.per_subject_rate.is_finite() || r.per_subject_rate <= 0.0 {
        return Err(invalid(
            "rate_limit.per_subject_rate",
            "per_subject_rate must be a finite positive number",
        ));
    }
    if r.per_subject_burst == 0 {
        return Err(invalid(
            "rate_limit.per_subject_burst",
            "per_subject_burst must be at least 1",
        ));
    }
    if r.max_in_flight == 0 {
        return Err(invalid(
            "rate_limit.max_in_flight",
            "max_in_flight must be at least 1",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let format = config.logging.format.as_str();
    if !matches!(format, "pretty" | "compact" | "json") {
        return Err(invalid(
            "logging.format",
            format!("unknown format '{format}'; expected pretty, compact or json"),
        ));
    }
    Ok(())
}

fn validate_timeouts(config: &Config) -> ConfigResult<()> {
    if config.timeouts.request_secs == 0 {
        return Err(invalid(
            "timeouts.request_secs",
            "request_secs must be positive",
        ));
    }
    Ok(())
}
