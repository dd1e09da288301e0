//! Delegation and attestation records.

use std::fmt;
use std::str::FromStr;

use attorn_core::{AttestationId, DelegationId, PowerType, Restrictions};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DelegationError;

/// Longest allowed validity period.
pub const MAX_VALIDITY: Duration = Duration::days(365);

/// How far in the future a delegation may start.
pub const MAX_START_AHEAD: Duration = Duration::hours(24);

/// When a delegation is in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityPeriod {
    /// First valid instant.
    pub start: DateTime<Utc>,
    /// Last valid instant.
    pub end: DateTime<Utc>,
}

impl ValidityPeriod {
    /// A period from `start` to `end`.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// A period starting at `start` and lasting `length`.
    #[must_use]
    pub fn starting(start: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start,
            end: start.checked_add_signed(length).unwrap_or(start),
        }
    }

    /// Whether `now` falls in `[start, end]`.
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }

    /// Check the period invariants as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationError::InvalidValidityPeriod`] naming the first
    /// broken invariant.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), DelegationError> {
        let fail = |reason: &str| {
            Err(DelegationError::InvalidValidityPeriod {
                reason: reason.to_string(),
            })
        };
        if self.end <= self.start {
            return fail("end must be after start");
        }
        if self.end.signed_duration_since(self.start) > MAX_VALIDITY {
            return fail("period cannot exceed 365 days");
        }
        if now
            .checked_add_signed(MAX_START_AHEAD)
            .is_some_and(|latest| self.start > latest)
        {
            return fail("start cannot be more than 24 hours in the future");
        }
        if self.end < now {
            return fail("end cannot be in the past");
        }
        Ok(())
    }
}

/// Delegation status. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    /// In force (subject to the validity period).
    Active,
    /// Permanently withdrawn.
    Revoked,
}

/// A grant of authority from a principal to a delegate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    /// Unique ID (`del_<hex>`).
    pub id: DelegationId,
    /// Who grants the authority.
    pub principal_id: String,
    /// Who receives it.
    pub delegate_id: String,
    /// Category of authority.
    pub power_type: PowerType,
    /// Scopes granted.
    pub scope: Vec<String>,
    /// Limits on the authority.
    #[serde(default)]
    pub restrictions: Restrictions,
    /// When the delegation is in force.
    pub validity: ValidityPeriod,
    /// Attestations backing the delegation.
    pub attestations: Vec<AttestationId>,
    /// Current status.
    pub status: DelegationStatus,
    /// When the record was stored.
    pub created_at: DateTime<Utc>,
    /// When it was revoked, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Delegation {
    /// A new active delegation with a fresh ID.
    #[must_use]
    pub fn new(
        principal_id: impl Into<String>,
        delegate_id: impl Into<String>,
        power_type: PowerType,
        validity: ValidityPeriod,
    ) -> Self {
        Self {
            id: DelegationId::generate(),
            principal_id: principal_id.into(),
            delegate_id: delegate_id.into(),
            power_type,
            scope: Vec::new(),
            restrictions: Restrictions::default(),
            validity,
            attestations: Vec::new(),
            status: DelegationStatus::Active,
            created_at: Utc::now(),
            revoked_at: None,
        }
    }

    /// Grant scopes.
    #[must_use]
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope.extend(scope.into_iter().map(Into::into));
        self
    }

    /// Set restrictions.
    #[must_use]
    pub fn with_restrictions(mut self, restrictions: Restrictions) -> Self {
        self.restrictions = restrictions;
        self
    }

    /// Attach attestations.
    #[must_use]
    pub fn with_attestations<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = AttestationId>,
    {
        self.attestations.extend(ids);
        self
    }

    /// Whether the status is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == DelegationStatus::Active
    }

    /// Whether active and `now` is inside the validity period.
    #[must_use]
    pub fn is_in_force_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.validity.contains(now)
    }
}

/// Kinds of attester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttesterType {
    /// Notary public. Attestations last longer.
    NotaryPublic,
    /// Legal counsel.
    LegalCounsel,
    /// Board member.
    BoardMember,
    /// Witness.
    Witness,
    /// Digital signature.
    DigitalSignature,
    /// Biometric confirmation.
    Biometric,
}

impl AttesterType {
    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotaryPublic => "notary_public",
            Self::LegalCounsel => "legal_counsel",
            Self::BoardMember => "board_member",
            Self::Witness => "witness",
            Self::DigitalSignature => "digital_signature",
            Self::Biometric => "biometric",
        }
    }

    /// How long an attestation of this type stays valid.
    #[must_use]
    pub fn max_age(self) -> Duration {
        match self {
            Self::NotaryPublic => Duration::days(90),
            _ => Duration::days(30),
        }
    }
}

impl FromStr for AttesterType {
    type Err = DelegationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notary_public" => Ok(Self::NotaryPublic),
            "legal_counsel" => Ok(Self::LegalCounsel),
            "board_member" => Ok(Self::BoardMember),
            "witness" => Ok(Self::Witness),
            "digital_signature" => Ok(Self::DigitalSignature),
            "biometric" => Ok(Self::Biometric),
            other => Err(DelegationError::InvalidAttesterType(other.to_string())),
        }
    }
}

impl fmt::Display for AttesterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assurance level of an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationLevel {
    /// Basic.
    Basic,
    /// Enhanced.
    Enhanced,
    /// Maximum.
    Maximum,
}

impl AttestationLevel {
    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Enhanced => "enhanced",
            Self::Maximum => "maximum",
        }
    }
}

impl FromStr for AttestationLevel {
    type Err = DelegationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "enhanced" => Ok(Self::Enhanced),
            "maximum" => Ok(Self::Maximum),
            other => Err(DelegationError::InvalidAttestationLevel(other.to_string())),
        }
    }
}

impl fmt::Display for AttestationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attestation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationStatus {
    /// Signed by the service.
    Verified,
}

/// An immutable third-party confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Unique ID (`att_<hex>`).
    pub id: AttestationId,
    /// Kind of attester.
    pub attester_type: AttesterType,
    /// Who attested.
    pub attester_id: String,
    /// Assurance level.
    pub level: AttestationLevel,
    /// When it was made, whole seconds.
    pub timestamp: DateTime<Utc>,
    /// Hex signature over [`signing_message`](Self::signing_message).
    pub signature: String,
    /// Status.
    pub status: AttestationStatus,
}

impl Attestation {
    /// The bytes the signature covers: `type|attester|level|timestamp`.
    #[must_use]
    pub fn signing_message(
        attester_type: AttesterType,
        attester_id: &str,
        level: AttestationLevel,
        timestamp: DateTime<Utc>,
    ) -> String {
        format!(
            "{attester_type}|{attester_id}|{level}|{}",
            timestamp.timestamp()
        )
    }

    /// Whether the attestation is past its type's maximum age at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) > self.attester_type.max_age()
    }
}
