//! Test fixtures for common types.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use attorn_config::Config;
use attorn_core::PowerType;
use attorn_crypto::KeyPair;
use attorn_delegation::{OwnerInfo, StaticRegistry, ValidityPeriod};
use attorn_engine::{Engine, EngineBuilder, GrantRequest};
use attorn_policy::{Policy, Rule};
use chrono::{Duration, Utc};
use tracing_subscriber::EnvFilter;

/// Principal registered by [`test_engine_builder`].
pub const TEST_PRINCIPAL: &str = "acme";

/// Delegate named by [`test_grant_request`].
pub const TEST_DELEGATE: &str = "agent-7";

/// Route `tracing` output to the test harness. Safe to call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Create a fresh signing key.
#[must_use]
pub fn test_keys() -> Arc<KeyPair> {
    Arc::new(KeyPair::generate())
}

/// Write `keys` as a raw secret key file under `dir`.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn write_key_file(dir: &Path, keys: &KeyPair) -> PathBuf {
    let path = dir.join("signing.key");
    std::fs::write(&path, keys.secret_key_bytes().as_slice()).expect("write key file");
    path
}

/// Default configuration with short request deadlines.
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.timeouts.request_secs = 5;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// The registered test principal.
#[must_use]
pub fn test_owner() -> OwnerInfo {
    OwnerInfo::new(TEST_PRINCIPAL, "organization")
}

/// A validity period that started a minute ago and lasts thirty days.
#[must_use]
pub fn test_validity() -> ValidityPeriod {
    ValidityPeriod::starting(Utc::now() - Duration::minutes(1), Duration::days(30))
}

/// A financial grant from [`TEST_PRINCIPAL`] to [`TEST_DELEGATE`].
#[must_use]
pub fn test_grant_request() -> GrantRequest {
    GrantRequest::new(
        test_owner(),
        TEST_DELEGATE,
        PowerType::financial_transactions(),
        test_validity(),
    )
}

/// A policy permitting every request.
#[must_use]
pub fn permit_all_policy() -> Policy {
    Policy::new("allow-all").rule(Rule::permit("everything"))
}

/// An engine builder with an injected key, [`TEST_PRINCIPAL`] registered,
/// and a permit-all policy.
#[must_use]
pub fn test_engine_builder() -> EngineBuilder {
    test_engine_builder_with(test_config())
}

/// Like [`test_engine_builder`], starting from `config`.
#[must_use]
pub fn test_engine_builder_with(config: Config) -> EngineBuilder {
    Engine::builder(config)
        .with_signing_key(test_keys())
        .with_registry(Arc::new(StaticRegistry::with_owners([TEST_PRINCIPAL])))
        .with_policy(permit_all_policy())
}
