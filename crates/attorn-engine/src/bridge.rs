//! Bridge from `attorn_config::Config` to domain types.
//!
//! The config crate has no dependencies on other internal crates. These
//! functions translate its sections into the settings each component takes,
//! so config-to-domain conversion happens exactly once, in one place.

use std::time::Duration;

use attorn_config::{Config, ConfigError, ConfigResult};
use attorn_delegation::{AttestationRequirement, DelegationConfig};
use attorn_distributed::DistributedConfig;
use attorn_policy::{CombiningAlgorithm, ContextCache, Effect};
use attorn_telemetry::{LogConfig, LogFormat};
use attorn_tokens::ValidationConfig;

use crate::rate_limit::RateLimitConfig;

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message,
    }
}

fn secs(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

/// Convert `[validation]` to [`ValidationConfig`].
#[must_use]
pub fn to_validation_config(cfg: &Config) -> ValidationConfig {
    let v = &cfg.validation;
    ValidationConfig {
        validate_signature: v.validate_signature,
        validate_issuer: v.validate_issuer,
        allowed_issuers: v.allowed_issuers.clone(),
        validate_audience: v.validate_audience,
        allowed_audiences: v.allowed_audiences.clone(),
        required_scopes: v.required_scopes.clone(),
        required_claims: Vec::new(),
        clock_skew: secs(v.clock_skew_secs),
    }
}

/// Default lifetimes of access, refresh and id tokens.
#[must_use]
pub fn token_ttls(cfg: &Config) -> (chrono::Duration, chrono::Duration, chrono::Duration) {
    let t = &cfg.tokens;
    (
        secs(t.access_ttl_secs),
        secs(t.refresh_ttl_secs),
        secs(t.id_ttl_secs),
    )
}

/// Convert `[delegation]` to [`DelegationConfig`].
#[must_use]
pub fn to_delegation_config(cfg: &Config) -> DelegationConfig {
    DelegationConfig {
        max_chain_depth: cfg.delegation.max_chain_depth,
    }
}

/// Convert `[attestation]` to the requirement every grant must meet.
#[must_use]
pub fn to_attestation_requirement(cfg: &Config) -> AttestationRequirement {
    let a = &cfg.attestation;
    let requirement = AttestationRequirement::new(&a.attester_type, &a.level, &a.attesters)
        .required(a.required_count);
    if a.multi_signature {
        requirement.multi_signature()
    } else {
        requirement
    }
}

/// Parse a combining algorithm name.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] for an unknown name.
pub fn to_combining_algorithm(name: &str) -> ConfigResult<CombiningAlgorithm> {
    match name {
        "deny-overrides" => Ok(CombiningAlgorithm::DenyOverrides),
        "permit-overrides" => Ok(CombiningAlgorithm::PermitOverrides),
        "first-applicable" => Ok(CombiningAlgorithm::FirstApplicable),
        other => Err(invalid(
            "policy.combining_algorithm",
            format!("unknown algorithm '{other}'"),
        )),
    }
}

/// Parse an effect name.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] for an unknown name.
pub fn to_effect(name: &str) -> ConfigResult<Effect> {
    match name {
        "deny" => Ok(Effect::Deny),
        "permit" => Ok(Effect::Permit),
        other => Err(invalid(
            "policy.default_effect",
            format!("unknown effect '{other}'"),
        )),
    }
}

/// Build the PDP context cache from `[policy]`.
#[must_use]
pub fn to_context_cache(cfg: &Config) -> ContextCache {
    ContextCache::new(
        Duration::from_secs(cfg.policy.context_cache_ttl_secs),
        cfg.policy.context_cache_max_entries,
    )
}

/// Convert `[distributed]` to [`DistributedConfig`], or `None` when the
/// caches are disabled.
#[must_use]
pub fn to_distributed_config(cfg: &Config) -> Option<DistributedConfig> {
    let d = &cfg.distributed;
    d.enabled.then(|| DistributedConfig {
        key_prefix: d.key_prefix.clone(),
        cache_ttl: Duration::from_secs(d.cache_ttl_secs),
        local_max_entries: d.local_max_entries,
        cache_negative: d.cache_negative,
        negative_ttl: Duration::from_secs(d.negative_ttl_secs),
        broadcast_capacity: d.broadcast_capacity,
    })
}

/// Convert `[rate_limit]` to [`RateLimitConfig`].
#[must_use]
pub fn to_rate_limit_config(cfg: &Config) -> RateLimitConfig {
    RateLimitConfig {
        per_subject_rate: cfg.rate_limit.per_subject_rate,
        per_subject_burst: cfg.rate_limit.per_subject_burst,
        max_in_flight: cfg.rate_limit.max_in_flight,
    }
}

/// Convert `[logging]` to [`LogConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] for an unknown format.
pub fn to_log_config(cfg: &Config) -> ConfigResult<LogConfig> {
    let format = match cfg.logging.format.as_str() {
        "pretty" => LogFormat::Pretty,
        "compact" => LogFormat::Compact,
        "json" => LogFormat::Json,
        other => {
            return Err(invalid(
                "logging.format",
                format!("unknown format '{other}'"),
            ));
        },
    };
    let mut log = LogConfig::new(&cfg.logging.level).with_format(format);
    for directive in &cfg.logging.directives {
        log = log.with_directive(directive);
    }
    Ok(log)
}

/// Request deadline from `[timeouts]`.
#[must_use]
pub fn request_timeout(cfg: &Config) -> Duration {
    Duration::from_secs(cfg.timeouts.request_secs)
}

/// Shutdown grace period from `[timeouts]`.
#[must_use]
pub fn shutdown_grace(cfg: &Config) -> Duration {
    Duration::from_secs(cfg.timeouts.shutdown_grace_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_translate() {
        let cfg = Config::default();

        let validation = to_validation_config(&cfg);
        assert!(validation.validate_signature);
        assert_eq!(validation.clock_skew, chrono::Duration::seconds(30));

        let (access, refresh, id) = token_ttls(&cfg);
        assert_eq!(access, chrono::Duration::hours(1));
        assert_eq!(refresh, chrono::Duration::days(30));
        assert_eq!(id, chrono::Duration::hours(1));

        assert_eq!(to_delegation_config(&cfg).max_chain_depth, 5);

        let requirement = to_attestation_requirement(&cfg);
        assert_eq!(requirement.attester_type, "digital_signature");
        assert_eq!(requirement.attesters, vec!["attorn".to_string()]);
        assert!(!requirement.multi_signature);

        let distributed = to_distributed_config(&cfg).unwrap();
        assert_eq!(distributed.key_prefix, "token:");
        assert_eq!(distributed.negative_ttl, Duration::from_secs(5));

        let limits = to_rate_limit_config(&cfg);
        assert_eq!(limits.per_subject_burst, 20);
        assert_eq!(limits.max_in_flight, 256);

        assert_eq!(to_context_cache(&cfg).ttl(), Duration::from_secs(60));
        assert_eq!(request_timeout(&cfg), Duration::from_secs(30));
        assert_eq!(shutdown_grace(&cfg), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(
            to_combining_algorithm("permit-overrides").unwrap(),
            CombiningAlgorithm::PermitOverrides
        );
        assert_eq!(
            to_combining_algorithm("first-applicable").unwrap(),
            CombiningAlgorithm::FirstApplicable
        );
        assert!(to_combining_algorithm("majority").is_err());
        assert_eq!(to_effect("permit").unwrap(), Effect::Permit);
        assert!(to_effect("maybe").is_err());
    }

    #[test]
    fn test_distributed_disabled() {
        let mut cfg = Config::default();
        cfg.distributed.enabled = false;
        assert!(to_distributed_config(&cfg).is_none());
    }

    #[test]
    fn test_log_config() {
        let mut cfg = Config::default();
        cfg.logging.format = "json".into();
        cfg.logging.directives = vec!["attorn_policy=debug".into()];
        let log = to_log_config(&cfg).unwrap();
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.directives, vec!["attorn_policy=debug".to_string()]);

        cfg.logging.format = "xml".into();
        assert!(to_log_config(&cfg).is_err());
    }

    #[test]
    fn test_multi_signature_requirement() {
        let mut cfg = Config::default();
        cfg.attestation.attesters = vec!["a".into(), "b".into(), "c".into()];
        cfg.attestation.required_count = 2;
        cfg.attestation.multi_signature = true;
        let requirement = to_attestation_requirement(&cfg);
        assert_eq!(requirement.required_count, 2);
        assert!(requirement.multi_signature);
    }
}
