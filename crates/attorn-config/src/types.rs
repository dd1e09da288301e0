//! Configuration types for the Attorn engine.
//!
//! Nothing here depends on other internal crates. Every struct implements
//! [`Default`] with production defaults, so a bare `[section]` header in
//! TOML yields a working section. The engine converts these into domain
//! types at startup.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Token issuance and storage.
    pub tokens: TokensSection,
    /// Paths to key material.
    pub keys: KeysSection,
    /// Validation pipeline switches.
    pub validation: ValidationSection,
    /// Delegation graph limits.
    pub delegation: DelegationSection,
    /// Attestation required when granting.
    pub attestation: AttestationSection,
    /// Policy decision point settings.
    pub policy: PolicySection,
    /// Two-tier validation cache.
    pub distributed: DistributedSection,
    /// Request admission.
    pub rate_limit: RateLimitSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
    /// Timeout budgets.
    pub timeouts: TimeoutsSection,
}

// ---------------------------------------------------------------------------
// TokensSection
// ---------------------------------------------------------------------------

/// Token issuance and storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensSection {
    /// Value of the `iss` claim.
    pub issuer: String,
    /// Audiences stamped on issued tokens.
    pub audience: Vec<String>,
    /// Access token lifetime.
    pub access_ttl_secs: u64,
    /// Refresh token lifetime.
    pub refresh_ttl_secs: u64,
    /// Id token lifetime.
    pub id_ttl_secs: u64,
    /// Seal stored tokens with the key at `keys.sealing_key_path`.
    pub encrypt_at_rest: bool,
    /// Interval between expired-token sweeps. Zero disables the sweep.
    pub cleanup_interval_secs: u64,
}

impl Default for TokensSection {
    fn default() -> Self {
        Self {
            issuer: "attorn".to_owned(),
            audience: Vec::new(),
            access_ttl_secs: 3600,
            refresh_ttl_secs: 2_592_000,
            id_ttl_secs: 3600,
            encrypt_at_rest: false,
            cleanup_interval_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// KeysSection
// ---------------------------------------------------------------------------

/// Paths to key material. Keys are provisioned outside the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysSection {
    /// Raw 32-byte ed25519 secret used to sign tokens and attestations.
    pub signing_key_path: Option<String>,
    /// Raw 32-byte key used to seal tokens at rest.
    pub sealing_key_path: Option<String>,
}

// ---------------------------------------------------------------------------
// ValidationSection
// ---------------------------------------------------------------------------

/// Validation pipeline switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ValidationSection {
    /// Verify signatures.
    pub validate_signature: bool,
    /// Enforce `allowed_issuers`.
    pub validate_issuer: bool,
    /// Accepted issuers.
    pub allowed_issuers: Vec<String>,
    /// Enforce `allowed_audiences`.
    pub validate_audience: bool,
    /// Accepted audiences.
    pub allowed_audiences: Vec<String>,
    /// Scopes every token must carry.
    pub required_scopes: Vec<String>,
    /// Tolerance for expiry and not-before.
    pub clock_skew_secs: u64,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            validate_signature: true,
            validate_issuer: false,
            allowed_issuers: Vec::new(),
            validate_audience: false,
            allowed_audiences: Vec::new(),
            required_scopes: Vec::new(),
            clock_skew_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// DelegationSection
// ---------------------------------------------------------------------------

/// Delegation graph limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationSection {
    /// Longest permitted chain, and the fan-out limit per principal.
    pub max_chain_depth: usize,
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self { max_chain_depth: 5 }
    }
}

// ---------------------------------------------------------------------------
// AttestationSection
// ---------------------------------------------------------------------------

/// Attestation collected when granting a delegation. Every delegation is
/// stored with at least one attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationSection {
    /// Attester type, e.g. `notary_public`.
    pub attester_type: String,
    /// `basic`, `enhanced` or `maximum`.
    pub level: String,
    /// Attesters, in preference order.
    pub attesters: Vec<String>,
    /// How many must attest. Zero means all.
    pub required_count: usize,
    /// Require at least two attestations.
    pub multi_signature: bool,
}

impl Default for AttestationSection {
    fn default() -> Self {
        Self {
            attester_type: "digital_signature".to_owned(),
            level: "basic".to_owned(),
            attesters: vec!["attorn".to_owned()],
            required_count: 0,
            multi_signature: false,
        }
    }
}

// ---------------------------------------------------------------------------
// PolicySection
// ---------------------------------------------------------------------------

/// Policy decision point settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// `deny-overrides`, `permit-overrides` or `first-applicable`.
    pub combining_algorithm: String,
    /// `deny` or `permit`, used when no rule applies.
    pub default_effect: String,
    /// Lifetime of cached data-source context.
    pub context_cache_ttl_secs: u64,
    /// Bound on cached context entries. Zero disables the cache.
    pub context_cache_max_entries: usize,
    /// Decisions kept in the in-memory log.
    pub decision_log_capacity: usize,
    /// Attributes every request must carry after enrichment.
    pub required_attributes: Vec<String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            combining_algorithm: "deny-overrides".to_owned(),
            default_effect: "deny".to_owned(),
            context_cache_ttl_secs: 60,
            context_cache_max_entries: 10_000,
            decision_log_capacity: 1000,
            required_attributes: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// DistributedSection
// ---------------------------------------------------------------------------

/// Two-tier validation cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedSection {
    /// Route validation through the caches.
    pub enabled: bool,
    /// Prefix of shared-cache keys.
    pub key_prefix: String,
    /// Longest a positive result is cached.
    pub cache_ttl_secs: u64,
    /// Bound on the in-process tier.
    pub local_max_entries: usize,
    /// Cache rejections.
    pub cache_negative: bool,
    /// How long a rejection is cached. At most 30.
    pub negative_ttl_secs: u64,
    /// Revocation broadcast buffer.
    pub broadcast_capacity: usize,
}

impl Default for DistributedSection {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "token:".to_owned(),
            cache_ttl_secs: 300,
            local_max_entries: 10_000,
            cache_negative: true,
            negative_ttl_secs: 5,
            broadcast_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitSection
// ---------------------------------------------------------------------------

/// Request admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    /// Sustained requests per second per subject.
    pub per_subject_rate: f64,
    /// Burst allowance per subject.
    pub per_subject_burst: u32,
    /// Requests in flight across all subjects.
    pub max_in_flight: usize,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            per_subject_rate: 10.0,
            per_subject_burst: 20,
            max_in_flight: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global level filter.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    /// Per-crate directives (e.g. `["attorn_policy=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutsSection
// ---------------------------------------------------------------------------

/// Timeout budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    /// Longest an engine request may run.
    pub request_secs: u64,
    /// Longest background workers get to stop on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}
