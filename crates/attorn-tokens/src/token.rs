//! The canonical token model.

use std::collections::BTreeMap;
use std::fmt;

use attorn_core::{ClaimMap, DelegationId, PowerType, Restrictions, TokenId};
use attorn_crypto::Algorithm;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Label under which the originating delegation is recorded.
pub const DELEGATION_LABEL: &str = "delegation_id";

/// Kind of token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Presented on every authorized request.
    Access,
    /// Exchanged for a fresh access token.
    Refresh,
    /// Identity assertion about the subject.
    Id,
}

impl TokenType {
    /// Lowercase name, as written into the `typ` claim.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Id => "id",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why and when a token was revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationStatus {
    /// When the revocation took effect.
    pub revoked_at: DateTime<Utc>,
    /// Free-form reason.
    pub reason: String,
    /// Who revoked it.
    pub revoked_by: String,
}

/// The power-of-attorney block carried by delegated tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerOfAttorney {
    /// Delegation this token was issued under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_id: Option<DelegationId>,
    /// The principal granting authority.
    pub principal_id: String,
    /// Category of authority.
    pub power_type: PowerType,
    /// Limits the agent must stay within.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrictions: Option<Restrictions>,
    /// Kind of AI agent holding the authority, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_type: Option<String>,
    /// Capabilities the agent declared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    /// Country code whose rules govern this authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
}

impl PowerOfAttorney {
    /// A bare grant from `principal_id` of `power_type`.
    #[must_use]
    pub fn new(principal_id: impl Into<String>, power_type: PowerType) -> Self {
        Self {
            delegation_id: None,
            principal_id: principal_id.into(),
            power_type,
            restrictions: None,
            ai_type: None,
            capabilities: Vec::new(),
            jurisdiction: None,
        }
    }

    /// Attach the originating delegation.
    #[must_use]
    pub fn with_delegation(mut self, id: DelegationId) -> Self {
        self.delegation_id = Some(id);
        self
    }

    /// Attach restrictions.
    #[must_use]
    pub fn with_restrictions(mut self, restrictions: Restrictions) -> Self {
        self.restrictions = Some(restrictions);
        self
    }

    /// Set the governing jurisdiction.
    #[must_use]
    pub fn with_jurisdiction(mut self, country: impl Into<String>) -> Self {
        self.jurisdiction = Some(country.into());
        self
    }

    /// Set the agent kind.
    #[must_use]
    pub fn with_ai_type(mut self, ai_type: impl Into<String>) -> Self {
        self.ai_type = Some(ai_type.into());
        self
    }
}

/// Opaque metadata signed into the `poa` claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Delegated authority, absent on plain tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_of_attorney: Option<PowerOfAttorney>,
    /// String labels used for filtering.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Typed custom claims.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claims: ClaimMap,
}

impl TokenMetadata {
    /// Whether nothing is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.power_of_attorney.is_none() && self.labels.is_empty() && self.claims.is_empty()
    }
}

/// A signed, time-bounded grant.
///
/// Everything except `revocation` and `last_used_at` is fixed at issuance
/// and mirrored in the signed `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Unique ID (`jti`).
    pub id: TokenId,
    /// Kind of token.
    pub token_type: TokenType,
    /// Who the token was issued to.
    pub subject: String,
    /// Who issued it.
    pub issuer: String,
    /// Intended recipients.
    pub audience: Vec<String>,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Earliest valid instant.
    pub not_before: DateTime<Utc>,
    /// Latest valid instant.
    pub expires_at: DateTime<Utc>,
    /// Signing algorithm.
    pub algorithm: Algorithm,
    /// Compact signed encoding.
    pub value: String,
    /// Set once the token is revoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<RevocationStatus>,
    /// Last successful store validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Signed metadata.
    #[serde(default)]
    pub metadata: TokenMetadata,
}

impl Token {
    /// Whether a revocation status is set.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revocation.is_some()
    }

    /// Whether `now` is past expiry, allowing `skew`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at
            .checked_add_signed(skew)
            .is_some_and(|limit| now > limit)
    }

    /// Whether `now` is before not-before, allowing `skew`.
    #[must_use]
    pub fn is_premature_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now.checked_add_signed(skew)
            .is_some_and(|shifted| shifted < self.not_before)
    }

    /// Whether the token is unrevoked and `not_before <= now <= expires_at`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && self.not_before <= now && now <= self.expires_at
    }

    /// Lifetime left at `now`, or `None` once expired.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.expires_at
            .signed_duration_since(now)
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }

    /// Whether `scope` was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// The power-of-attorney block, if any.
    #[must_use]
    pub fn power_of_attorney(&self) -> Option<&PowerOfAttorney> {
        self.metadata.power_of_attorney.as_ref()
    }

    /// The delegation this token was issued under, read from the labels.
    #[must_use]
    pub fn delegation_id(&self) -> Option<&str> {
        self.metadata.labels.get(DELEGATION_LABEL).map(String::as_str)
    }

    /// Metadata label by name.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metadata.labels.get(name).map(String::as_str)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// An unsigned token valid for an hour around `now`.
    pub(crate) fn token_at(now: DateTime<Utc>, subject: &str) -> Token {
        Token {
            id: TokenId::new(),
            token_type: TokenType::Access,
            subject: subject.to_string(),
            issuer: "https://issuer.example".to_string(),
            audience: vec!["payments".to_string()],
            scopes: vec!["read".to_string(), "write".to_string()],
            issued_at: now,
            not_before: now,
            expires_at: now + Duration::hours(1),
            algorithm: Algorithm::EdDSA,
            value: format!("value-{subject}"),
            revocation: None,
            last_used_at: None,
            metadata: TokenMetadata::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::token_at;
    use super::*;

    #[test]
    fn test_active_window_inclusive() {
        let now = Utc::now();
        let token = token_at(now, "agent");
        assert!(token.is_active_at(now));
        assert!(token.is_active_at(token.expires_at));
        assert!(!token.is_active_at(token.expires_at + Duration::seconds(1)));
        assert!(!token.is_active_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_skew_applies_both_ends() {
        let now = Utc::now();
        let token = token_at(now, "agent");
        let skew = Duration::seconds(30);
        assert!(!token.is_expired_at(token.expires_at + Duration::seconds(20), skew));
        assert!(token.is_expired_at(token.expires_at + Duration::seconds(31), skew));
        assert!(!token.is_premature_at(now - Duration::seconds(20), skew));
        assert!(token.is_premature_at(now - Duration::seconds(31), skew));
    }

    #[test]
    fn test_revoked_never_active() {
        let now = Utc::now();
        let mut token = token_at(now, "agent");
        token.revocation = Some(RevocationStatus {
            revoked_at: now,
            reason: "compromised".into(),
            revoked_by: "admin".into(),
        });
        assert!(!token.is_active_at(now));
    }

    #[test]
    fn test_remaining_lifetime() {
        let now = Utc::now();
        let token = token_at(now, "agent");
        assert_eq!(
            token.remaining_at(now),
            Some(std::time::Duration::from_secs(3600))
        );
        assert_eq!(token.remaining_at(token.expires_at), None);
    }

    #[test]
    fn test_metadata_serde_skips_empty() {
        let json = serde_json::to_string(&TokenMetadata::default()).unwrap();
        assert_eq!(json, "{}");

        let meta = TokenMetadata {
            power_of_attorney: Some(
                PowerOfAttorney::new("alice", PowerType::financial_transactions())
                    .with_jurisdiction("US"),
            ),
            ..TokenMetadata::default()
        };
        let back: TokenMetadata =
            serde_json::from_str(&serde_json::to_string(&meta).unwrap()).unwrap();
        assert_eq!(back, meta);
    }
}
