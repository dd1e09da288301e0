//! The ordered token validation pipeline.
//!
//! Stages run in a fixed order and stop at the first failure:
//!
//! 1. signature
//! 2. expiry
//! 3. not-before
//! 4. issuer allow-list
//! 5. audience allow-list
//! 6. required scopes
//! 7. revocation status and blacklist
//! 8. custom claim requirements
//!
//! The pipeline holds no per-token state and never mutates the token.

use std::fmt;
use std::sync::Arc;

use attorn_core::{ClaimValue, Clock, SystemClock};
use attorn_crypto::Verifier;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TokenError, TokenResult, ValidationError};
use crate::revocation::RevocationCheck;
use crate::token::Token;
use crate::wire::{self, Claims};

/// Default tolerance applied to expiry and not-before.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::seconds(30);

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    /// Signature over the compact value.
    Signature,
    /// Expiry with skew.
    Expiry,
    /// Not-before with skew.
    NotBefore,
    /// Issuer allow-list.
    Issuer,
    /// Audience allow-list.
    Audience,
    /// Required scopes.
    Scopes,
    /// Revocation status and blacklist.
    Revocation,
    /// Custom claim requirements.
    Claims,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Signature => "signature",
            Self::Expiry => "expiry",
            Self::NotBefore => "not_before",
            Self::Issuer => "issuer",
            Self::Audience => "audience",
            Self::Scopes => "scopes",
            Self::Revocation => "revocation",
            Self::Claims => "claims",
        };
        f.write_str(name)
    }
}

/// How a custom claim is checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "snake_case")]
pub enum ClaimRule {
    /// The claim must exist.
    Present,
    /// The claim must equal the value.
    Equals(ClaimValue),
    /// The claim must equal one of the values.
    OneOf(Vec<ClaimValue>),
}

/// A required custom claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequirement {
    /// Claim name in the token's custom claims.
    pub name: String,
    /// Check applied to its value.
    pub rule: ClaimRule,
}

impl ClaimRequirement {
    /// Require `name` to be present.
    #[must_use]
    pub fn present(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rule: ClaimRule::Present,
        }
    }

    /// Require `name` to equal `value`.
    #[must_use]
    pub fn equals(name: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        Self {
            name: name.into(),
            rule: ClaimRule::Equals(value.into()),
        }
    }

    fn check(&self, token: &Token) -> Result<(), ValidationError> {
        let Some(actual) = token.metadata.claims.get(&self.name) else {
            return Err(ValidationError::MissingClaim {
                claim: self.name.clone(),
            });
        };
        let ok = match &self.rule {
            ClaimRule::Present => true,
            ClaimRule::Equals(expected) => actual == expected,
            ClaimRule::OneOf(allowed) => allowed.contains(actual),
        };
        if ok {
            Ok(())
        } else {
            Err(ValidationError::ClaimMismatch {
                claim: self.name.clone(),
                actual: actual.to_string(),
            })
        }
    }
}

/// What the pipeline checks.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Verify the signature and that the signed claims match the token.
    pub validate_signature: bool,
    /// Enforce `allowed_issuers`.
    pub validate_issuer: bool,
    /// Accepted issuers.
    pub allowed_issuers: Vec<String>,
    /// Enforce `allowed_audiences`.
    pub validate_audience: bool,
    /// Accepted audiences. A token passes if any of its audiences is listed.
    pub allowed_audiences: Vec<String>,
    /// Scopes every token must carry.
    pub required_scopes: Vec<String>,
    /// Custom claim checks.
    pub required_claims: Vec<ClaimRequirement>,
    /// Tolerance for expiry and not-before.
    pub clock_skew: Duration,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            validate_signature: true,
            validate_issuer: false,
            allowed_issuers: Vec::new(),
            validate_audience: false,
            allowed_audiences: Vec::new(),
            required_scopes: Vec::new(),
            required_claims: Vec::new(),
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

/// The eight-stage validator.
#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    config: ValidationConfig,
    verifier: Option<Arc<dyn Verifier>>,
    revocations: Arc<dyn RevocationCheck>,
    clock: Arc<dyn Clock>,
}

impl ValidationPipeline {
    /// Build a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Configuration`] if signature checks are on
    /// without a verifier, or if issuer or audience checks are on with an
    /// empty allow-list.
    pub fn new(
        config: ValidationConfig,
        verifier: Option<Arc<dyn Verifier>>,
        revocations: Arc<dyn RevocationCheck>,
    ) -> TokenResult<Self> {
        if config.validate_signature && verifier.is_none() {
            return Err(TokenError::Configuration(
                "signature validation enabled without a verifier".into(),
            ));
        }
        if config.validate_issuer && config.allowed_issuers.is_empty() {
            return Err(TokenError::Configuration(
                "issuer validation enabled with no allowed issuers".into(),
            ));
        }
        if config.validate_audience && config.allowed_audiences.is_empty() {
            return Err(TokenError::Configuration(
                "audience validation enabled with no allowed audiences".into(),
            ));
        }
        if config.clock_skew < Duration::zero() {
            return Err(TokenError::Configuration("negative clock skew".into()));
        }
        Ok(Self {
            config,
            verifier,
            revocations,
            clock: Arc::new(SystemClock),
        })
    }

    /// Use `clock` for "now".
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Run every stage against the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage.
    pub fn validate(&self, token: &Token) -> Result<(), ValidationError> {
        self.validate_at(token, self.clock.now())
    }

    /// Run every stage as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage.
    pub fn validate_at(&self, token: &Token, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let result = self.run(token, now);
        if let Err(e) = &result {
            debug!(
                token_id = %token.id,
                stage = %e.stage(),
                code = e.code(),
                "token failed validation"
            );
        }
        result
    }

    /// Decode a compact value, verify it, and run the remaining stages.
    ///
    /// # Errors
    ///
    /// Returns a malformed or signature error from decoding, then the error
    /// of the first failing stage.
    pub fn validate_value(&self, value: &str) -> Result<Token, ValidationError> {
        let token = match &self.verifier {
            Some(verifier) => wire::parse_token(value, verifier.as_ref())?,
            None => {
                let (header, claims) = wire::decode_unverified(value)?;
                claims.into_token(header.alg, value.to_string())?
            },
        };
        self.validate(&token)?;
        Ok(token)
    }

    fn run(&self, token: &Token, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.check_signature(token)?;

        let skew = self.config.clock_skew;
        if token.is_expired_at(now, skew) {
            return Err(ValidationError::Expired {
                token_id: token.id.to_string(),
                expired_at: token.expires_at,
            });
        }
        if token.is_premature_at(now, skew) {
            return Err(ValidationError::NotYetValid {
                token_id: token.id.to_string(),
                not_before: token.not_before,
            });
        }

        if self.config.validate_issuer && !self.config.allowed_issuers.contains(&token.issuer) {
            return Err(ValidationError::InvalidIssuer {
                issuer: token.issuer.clone(),
            });
        }

        if self.config.validate_audience
            && !token
                .audience
                .iter()
                .any(|aud| self.config.allowed_audiences.contains(aud))
        {
            return Err(ValidationError::InvalidAudience {
                audience: token.audience.clone(),
            });
        }

        let missing: Vec<String> = self
            .config
            .required_scopes
            .iter()
            .filter(|scope| !token.has_scope(scope))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::InsufficientScope { missing });
        }

        if token.is_revoked() {
            return Err(ValidationError::Revoked {
                token_id: token.id.to_string(),
            });
        }
        if self.revocations.is_revoked(&token.id, now) {
            return Err(ValidationError::Blacklisted {
                token_id: token.id.to_string(),
            });
        }

        for requirement in &self.config.required_claims {
            requirement.check(token)?;
        }
        Ok(())
    }

    fn check_signature(&self, token: &Token) -> Result<(), ValidationError> {
        if !self.config.validate_signature {
            return Ok(());
        }
        let Some(verifier) = &self.verifier else {
            return Err(ValidationError::InvalidSignature {
                token_id: token.id.to_string(),
            });
        };
        let (header, claims) = wire::decode(&token.value, verifier.as_ref())?;
        if header.alg != token.algorithm {
            return Err(ValidationError::InvalidClaims {
                reason: format!(
                    "header alg {} does not match token algorithm {}",
                    header.alg, token.algorithm
                ),
            });
        }
        if claims != Claims::from_token(token) {
            return Err(ValidationError::InvalidClaims {
                reason: "signed claims differ from token fields".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::{TokenIssuer, TokenRequest};
    use crate::revocation::RevocationList;
    use crate::token::RevocationStatus;
    use attorn_core::ManualClock;
    use attorn_crypto::KeyPair;

    struct Fixture {
        issuer: TokenIssuer,
        key: Arc<KeyPair>,
        revocations: Arc<RevocationList>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let key = Arc::new(KeyPair::generate());
        let clock = Arc::new(ManualClock::starting_now());
        let issuer = TokenIssuer::new(key.clone(), "https://issuer.example")
            .with_audience("payments")
            .with_clock(clock.clone());
        Fixture {
            issuer,
            key,
            revocations: Arc::new(RevocationList::new()),
            clock,
        }
    }

    fn pipeline(fx: &Fixture, config: ValidationConfig) -> ValidationPipeline {
        ValidationPipeline::new(config, Some(fx.key.clone()), fx.revocations.clone())
            .unwrap()
            .with_clock(fx.clock.clone())
    }

    fn access(fx: &Fixture) -> Token {
        fx.issuer
            .issue(TokenRequest::access("agent-7").scope("read").scope("write"))
            .unwrap()
    }

    #[test]
    fn test_valid_token_passes_and_is_idempotent() {
        let fx = fixture();
        let pipeline = pipeline(&fx, ValidationConfig::default());
        let token = access(&fx);
        assert!(pipeline.validate(&token).is_ok());
        assert!(pipeline.validate(&token).is_ok());
    }

    #[test]
    fn test_field_tampering_detected() {
        let fx = fixture();
        let pipeline = pipeline(&fx, ValidationConfig::default());
        let mut token = access(&fx);
        token.scopes.push("admin".into());
        let err = pipeline.validate(&token).unwrap_err();
        assert_eq!(err.code(), "invalid_claims");
        assert_eq!(err.stage(), ValidationStage::Signature);
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let fx = fixture();
        let pipeline = pipeline(&fx, ValidationConfig::default());
        let rogue = TokenIssuer::new(Arc::new(KeyPair::generate()), "https://issuer.example");
        let token = rogue.issue(TokenRequest::access("agent-7")).unwrap();
        assert_eq!(pipeline.validate(&token).unwrap_err().code(), "invalid_signature");
    }

    #[test]
    fn test_expiry_respects_skew() {
        let fx = fixture();
        let pipeline = pipeline(&fx, ValidationConfig::default());
        let token = access(&fx);

        let just_after = token.expires_at + Duration::seconds(10);
        assert!(pipeline.validate_at(&token, just_after).is_ok());

        let well_after = token.expires_at + Duration::seconds(31);
        assert_eq!(
            pipeline.validate_at(&token, well_after).unwrap_err().code(),
            "expired"
        );
    }

    #[test]
    fn test_not_before_respects_skew() {
        let fx = fixture();
        let pipeline = pipeline(&fx, ValidationConfig::default());
        let start = fx.clock.now() + Duration::minutes(10);
        let token = fx
            .issuer
            .issue(TokenRequest::access("agent-7").not_before(start))
            .unwrap();
        assert_eq!(pipeline.validate(&token).unwrap_err().code(), "not_yet_valid");
        assert!(
            pipeline
                .validate_at(&token, start - Duration::seconds(20))
                .is_ok()
        );
    }

    #[test]
    fn test_issuer_and_audience_allow_lists() {
        let fx = fixture();
        let token = access(&fx);

        let strict = pipeline(
            &fx,
            ValidationConfig {
                validate_issuer: true,
                allowed_issuers: vec!["https://other.example".into()],
                ..ValidationConfig::default()
            },
        );
        assert_eq!(strict.validate(&token).unwrap_err().code(), "invalid_issuer");

        let audience = pipeline(
            &fx,
            ValidationConfig {
                validate_audience: true,
                allowed_audiences: vec!["ledger".into()],
                ..ValidationConfig::default()
            },
        );
        assert_eq!(
            audience.validate(&token).unwrap_err().code(),
            "invalid_audience"
        );

        let both = pipeline(
            &fx,
            ValidationConfig {
                validate_issuer: true,
                allowed_issuers: vec!["https://issuer.example".into()],
                validate_audience: true,
                allowed_audiences: vec!["payments".into()],
                ..ValidationConfig::default()
            },
        );
        assert!(both.validate(&token).is_ok());
    }

    #[test]
    fn test_missing_scopes_listed() {
        let fx = fixture();
        let pipeline = pipeline(
            &fx,
            ValidationConfig {
                required_scopes: vec!["read".into(), "admin".into()],
                ..ValidationConfig::default()
            },
        );
        let err = pipeline.validate(&access(&fx)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientScope {
                missing: vec!["admin".into()]
            }
        );
    }

    #[test]
    fn test_revoked_and_blacklisted() {
        let fx = fixture();
        let pipeline = pipeline(&fx, ValidationConfig::default());

        let mut revoked = access(&fx);
        revoked.revocation = Some(RevocationStatus {
            revoked_at: fx.clock.now(),
            reason: "test".into(),
            revoked_by: "admin".into(),
        });
        assert_eq!(pipeline.validate(&revoked).unwrap_err().code(), "revoked");

        let listed = access(&fx);
        fx.revocations.revoke(listed.id.clone(), listed.expires_at);
        assert_eq!(pipeline.validate(&listed).unwrap_err().code(), "blacklisted");
    }

    #[test]
    fn test_custom_claims() {
        let fx = fixture();
        let pipeline = pipeline(
            &fx,
            ValidationConfig {
                required_claims: vec![ClaimRequirement::equals("tier", "gold")],
                ..ValidationConfig::default()
            },
        );
        let without = access(&fx);
        assert_eq!(pipeline.validate(&without).unwrap_err().code(), "missing_claim");

        let silver = fx
            .issuer
            .issue(TokenRequest::access("agent-7").claim("tier", "silver"))
            .unwrap();
        assert_eq!(pipeline.validate(&silver).unwrap_err().code(), "invalid_claim");

        let gold = fx
            .issuer
            .issue(TokenRequest::access("agent-7").claim("tier", "gold"))
            .unwrap();
        assert!(pipeline.validate(&gold).is_ok());
    }

    #[test]
    fn test_stage_order_short_circuits() {
        let fx = fixture();
        let pipeline = pipeline(
            &fx,
            ValidationConfig {
                required_scopes: vec!["admin".into()],
                ..ValidationConfig::default()
            },
        );
        // Expired and under-scoped: expiry runs first.
        let token = access(&fx);
        let later = token.expires_at + Duration::hours(1);
        assert_eq!(
            pipeline.validate_at(&token, later).unwrap_err().stage(),
            ValidationStage::Expiry
        );
    }

    #[test]
    fn test_validate_value_round_trip() {
        let fx = fixture();
        let pipeline = pipeline(&fx, ValidationConfig::default());
        let token = access(&fx);
        let parsed = pipeline.validate_value(&token.value).unwrap();
        assert_eq!(parsed.id, token.id);
        assert_eq!(
            pipeline.validate_value("garbage").unwrap_err().code(),
            "malformed"
        );
    }

    #[test]
    fn test_configuration_errors() {
        let revocations: Arc<dyn RevocationCheck> = Arc::new(RevocationList::new());
        assert!(matches!(
            ValidationPipeline::new(ValidationConfig::default(), None, revocations.clone()),
            Err(TokenError::Configuration(_))
        ));
        assert!(matches!(
            ValidationPipeline::new(
                ValidationConfig {
                    validate_signature: false,
                    validate_issuer: true,
                    ..ValidationConfig::default()
                },
                None,
                revocations.clone()
            ),
            Err(TokenError::Configuration(_))
        ));
        assert!(
            ValidationPipeline::new(
                ValidationConfig {
                    validate_signature: false,
                    ..ValidationConfig::default()
                },
                None,
                revocations
            )
            .is_ok()
        );
    }
}
