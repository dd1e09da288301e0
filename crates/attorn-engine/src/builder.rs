//! Engine assembly.

use std::path::Path;
use std::sync::{Arc, Mutex};

use attorn_compliance::{ComplianceChecker, ComplianceSink, JurisdictionRegistry, MemoryComplianceSink};
use attorn_config::{Config, ConfigError, validate};
use attorn_core::{Clock, SystemClock};
use attorn_crypto::{KeyPair, SealingKey, Signer, Verifier};
use attorn_delegation::{AttestationService, DelegationManager, RegistryVerifier, UnimplementedRegistry};
use attorn_distributed::{
    DistributedValidator, KvSharedCache, SharedCache, StoreAuthenticator, TokenAuthenticator,
};
use attorn_policy::{
    DataSource, DecisionLog, EnforcementHandler, MemoryDecisionLog, Policy, PolicyDecisionPoint,
};
use attorn_storage::{KvStore, MemoryKvStore};
use attorn_tokens::{
    KvTokenStore, MemoryTokenStore, RevocationCheck, RevocationList, TokenIssuer, TokenStore,
    ValidationPipeline,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bridge;
use crate::engine::Engine;
use crate::error::EngineResult;
use crate::rate_limit::RateLimiter;
use crate::validator::Validator;

/// Assembles an [`Engine`] from configuration and injected collaborators.
///
/// Anything not injected is built from the configuration: the signing key
/// is loaded from `keys.signing_key_path`, tokens live in memory, the shared
/// cache is process-local, and compliance events are kept in memory. With
/// no registry injected, every grant fails with an explicit
/// `unimplemented` registry error.
#[derive(Debug)]
pub struct EngineBuilder {
    config: Config,
    keys: Option<Arc<KeyPair>>,
    sealing_key: Option<SealingKey>,
    token_kv: Option<Arc<dyn KvStore>>,
    shared_cache: Option<Arc<dyn SharedCache>>,
    registry: Option<Arc<dyn RegistryVerifier>>,
    policies: Vec<Policy>,
    data_sources: Vec<Arc<dyn DataSource>>,
    handlers: Vec<Arc<dyn EnforcementHandler>>,
    decision_log: Option<Arc<dyn DecisionLog>>,
    jurisdictions: JurisdictionRegistry,
    compliance_sink: Option<Arc<dyn ComplianceSink>>,
    clock: Arc<dyn Clock>,
}

impl EngineBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            keys: None,
            sealing_key: None,
            token_kv: None,
            shared_cache: None,
            registry: None,
            policies: Vec::new(),
            data_sources: Vec::new(),
            handlers: Vec::new(),
            decision_log: None,
            jurisdictions: JurisdictionRegistry::new(),
            compliance_sink: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sign and verify with `keys` instead of loading the configured file.
    #[must_use]
    pub fn with_signing_key(mut self, keys: Arc<KeyPair>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Seal stored tokens with `key` instead of the configured file.
    #[must_use]
    pub fn with_sealing_key(mut self, key: SealingKey) -> Self {
        self.sealing_key = Some(key);
        self
    }

    /// Persist tokens in `kv`.
    #[must_use]
    pub fn with_token_kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.token_kv = Some(kv);
        self
    }

    /// Share validation results through `cache`.
    #[must_use]
    pub fn with_shared_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Verify principals against `registry` before granting.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn RegistryVerifier>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a policy. Policies are evaluated in the order added.
    #[must_use]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Add a context data source.
    #[must_use]
    pub fn with_data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.data_sources.push(source);
        self
    }

    /// Add an enforcement handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn EnforcementHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Record decisions in `log` instead of the in-memory default.
    #[must_use]
    pub fn with_decision_log(mut self, log: Arc<dyn DecisionLog>) -> Self {
        self.decision_log = Some(log);
        self
    }

    /// Jurisdiction rules for compliance checks.
    #[must_use]
    pub fn with_jurisdictions(mut self, jurisdictions: JurisdictionRegistry) -> Self {
        self.jurisdictions = jurisdictions;
        self
    }

    /// Emit compliance events to `sink`.
    #[must_use]
    pub fn with_compliance_sink(mut self, sink: Arc<dyn ComplianceSink>) -> Self {
        self.compliance_sink = Some(sink);
        self
    }

    /// Use `clock` everywhere the engine reads the time.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and wire every component.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid config or missing key
    /// material, and propagates component construction errors.
    pub fn build(self) -> EngineResult<Engine> {
        let cfg = self.config;
        let clock = self.clock;

        let keys = if let Some(keys) = self.keys {
            validate::validate_settings(&cfg)?;
            keys
        } else {
            cfg.validate()?;
            let path = cfg
                .keys
                .signing_key_path
                .as_deref()
                .ok_or_else(|| ConfigError::SigningKey {
                    path: None,
                    message: "keys.signing_key_path is not set".to_owned(),
                })?;
            Arc::new(KeyPair::load_from_file(path)?)
        };
        let signer: Arc<dyn Signer> = keys.clone();
        let verifier: Arc<dyn Verifier> = keys.clone();
        let skew = bridge::to_validation_config(&cfg).clock_skew;

        let store: Arc<dyn TokenStore> = if cfg.tokens.encrypt_at_rest {
            let sealing = match self.sealing_key {
                Some(key) => key,
                None => load_sealing_key(&cfg)?,
            };
            let kv = match self.token_kv {
                Some(kv) => kv,
                None => Arc::new(MemoryKvStore::new()),
            };
            Arc::new(
                KvTokenStore::encrypted(kv, sealing)?
                    .with_clock(clock.clone())
                    .with_clock_skew(skew),
            )
        } else if let Some(kv) = self.token_kv {
            Arc::new(
                KvTokenStore::new(kv)?
                    .with_clock(clock.clone())
                    .with_clock_skew(skew),
            )
        } else {
            Arc::new(
                MemoryTokenStore::new()
                    .with_clock(clock.clone())
                    .with_clock_skew(skew),
            )
        };

        let revocations = Arc::new(RevocationList::new());
        let revocation_check: Arc<dyn RevocationCheck> = revocations.clone();
        let pipeline = ValidationPipeline::new(
            bridge::to_validation_config(&cfg),
            Some(verifier.clone()),
            revocation_check,
        )?
        .with_clock(clock.clone());
        let authenticator = StoreAuthenticator::new(pipeline.clone(), store.clone())
            .with_revocation_list(revocations.clone());
        let validator = match bridge::to_distributed_config(&cfg) {
            Some(distributed) => {
                let shared: Arc<dyn SharedCache> = match self.shared_cache {
                    Some(shared) => shared,
                    None => Arc::new(KvSharedCache::new(Arc::new(MemoryKvStore::new()))),
                };
                let base: Arc<dyn TokenAuthenticator> = Arc::new(authenticator);
                Validator::Cached(Arc::new(
                    DistributedValidator::new(base, shared, distributed).with_clock(clock.clone()),
                ))
            },
            None => Validator::Direct(authenticator),
        };

        let (access_ttl, refresh_ttl, id_ttl) = bridge::token_ttls(&cfg);
        let mut issuer = TokenIssuer::new(signer.clone(), &cfg.tokens.issuer)
            .with_ttls(access_ttl, refresh_ttl, id_ttl)
            .with_clock(clock.clone());
        for audience in &cfg.tokens.audience {
            issuer = issuer.with_audience(audience);
        }

        let attestation =
            Arc::new(AttestationService::new(signer, verifier).with_clock(clock.clone()));
        let delegations = Arc::new(
            DelegationManager::new(bridge::to_delegation_config(&cfg))
                .with_attestation_service(attestation.clone())
                .with_clock(clock.clone()),
        );

        let decision_log: Arc<dyn DecisionLog> = match self.decision_log {
            Some(log) => log,
            None => Arc::new(MemoryDecisionLog::new(cfg.policy.decision_log_capacity)),
        };
        let mut pdp = PolicyDecisionPoint::new(bridge::to_combining_algorithm(
            &cfg.policy.combining_algorithm,
        )?)
        .with_default_effect(bridge::to_effect(&cfg.policy.default_effect)?)
        .with_cache(bridge::to_context_cache(&cfg))
        .with_decision_log(decision_log)
        .with_clock(clock.clone());
        for name in &cfg.policy.required_attributes {
            pdp = pdp.require_attribute(name);
        }
        for source in self.data_sources {
            pdp = pdp.with_data_source(source);
        }
        for handler in self.handlers {
            pdp = pdp.with_handler(handler);
        }
        for policy in self.policies {
            pdp.add_policy(policy)?;
        }

        let sink: Arc<dyn ComplianceSink> = match self.compliance_sink {
            Some(sink) => sink,
            None => Arc::new(MemoryComplianceSink::new()),
        };
        let compliance = ComplianceChecker::new(self.jurisdictions, sink).with_clock(clock.clone());

        let registry: Arc<dyn RegistryVerifier> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(UnimplementedRegistry),
        };

        info!(
            issuer = %cfg.tokens.issuer,
            distributed = validator.cached().is_some(),
            encrypted = cfg.tokens.encrypt_at_rest,
            algorithm = %cfg.policy.combining_algorithm,
            "engine assembled"
        );

        Ok(Engine {
            issuer,
            access_ttl,
            pipeline,
            store,
            revocations,
            validator,
            delegations,
            attestation,
            requirement: bridge::to_attestation_requirement(&cfg),
            registry,
            pdp,
            compliance,
            limiter: RateLimiter::new(bridge::to_rate_limit_config(&cfg)),
            clock,
            cleanup_interval: std::time::Duration::from_secs(cfg.tokens.cleanup_interval_secs),
            request_timeout: bridge::request_timeout(&cfg),
            shutdown_grace: bridge::shutdown_grace(&cfg),
            shutdown: CancellationToken::new(),
            cleanup: Mutex::new(None),
        })
    }
}

fn load_sealing_key(cfg: &Config) -> EngineResult<SealingKey> {
    let invalid = |message: String| ConfigError::ValidationError {
        field: "keys.sealing_key_path".to_owned(),
        message,
    };
    let path = cfg
        .keys
        .sealing_key_path
        .as_deref()
        .ok_or_else(|| invalid("tokens.encrypt_at_rest requires a sealing key".to_owned()))?;
    let bytes = std::fs::read(Path::new(path)).map_err(|e| invalid(e.to_string()))?;
    Ok(SealingKey::from_bytes(&bytes)?)
}
