//! Per-country jurisdiction rules and second-level approvals.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default lifetime of a second-level approval.
pub const DEFAULT_APPROVAL_DURATION: Duration = Duration::hours(24);

/// How many independent approvers an action needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    /// The requester alone.
    #[default]
    Single,
    /// One second approver.
    Dual,
    /// Two or more further approvers.
    Multi,
}

impl ApprovalLevel {
    /// Approvers needed beyond the requester.
    #[must_use]
    pub const fn additional_approvers(self) -> usize {
        match self {
            Self::Single => 0,
            Self::Dual => 1,
            Self::Multi => 2,
        }
    }
}

impl fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Single => "single",
            Self::Dual => "dual",
            Self::Multi => "multi",
        })
    }
}

/// A recorded approval by someone other than the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Identity of the approver.
    pub approver_id: String,
    /// Role the approver acted in.
    pub role: String,
    /// When the approval was given.
    pub approved_at: DateTime<Utc>,
}

impl Approval {
    /// An approval given at `approved_at`.
    #[must_use]
    pub fn new(
        approver_id: impl Into<String>,
        role: impl Into<String>,
        approved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            approver_id: approver_id.into(),
            role: role.into(),
            approved_at,
        }
    }

    /// Whether given no later than `now` and no earlier than `now - lifetime`.
    #[must_use]
    pub fn is_current(&self, now: DateTime<Utc>, lifetime: Duration) -> bool {
        self.approved_at <= now && now.signed_duration_since(self.approved_at) <= lifetime
    }
}

/// Rules for one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionRules {
    /// Country code.
    pub country: String,
    /// Approval level per action type. Unlisted actions need `single`.
    #[serde(default)]
    pub approval_levels: BTreeMap<String, ApprovalLevel>,
    /// Value limit per action type.
    #[serde(default)]
    pub value_limits: BTreeMap<String, f64>,
    /// Duties the requester must acknowledge.
    #[serde(default)]
    pub fiduciary_duties: Vec<String>,
    /// Roles that must be present among requester and approvers.
    #[serde(default)]
    pub required_roles: Vec<String>,
    /// How long an approval stays valid, in seconds.
    #[serde(default = "default_approval_secs")]
    pub approval_duration_secs: i64,
}

fn default_approval_secs() -> i64 {
    DEFAULT_APPROVAL_DURATION.num_seconds()
}

impl JurisdictionRules {
    /// Rules with no requirements.
    #[must_use]
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            approval_levels: BTreeMap::new(),
            value_limits: BTreeMap::new(),
            fiduciary_duties: Vec::new(),
            required_roles: Vec::new(),
            approval_duration_secs: default_approval_secs(),
        }
    }

    /// Require `level` for `action`.
    #[must_use]
    pub fn approval(mut self, action: impl Into<String>, level: ApprovalLevel) -> Self {
        self.approval_levels.insert(action.into(), level);
        self
    }

    /// Cap `action` at `max`.
    #[must_use]
    pub fn value_limit(mut self, action: impl Into<String>, max: f64) -> Self {
        self.value_limits.insert(action.into(), max);
        self
    }

    /// Add a fiduciary duty.
    #[must_use]
    pub fn duty(mut self, duty: impl Into<String>) -> Self {
        self.fiduciary_duties.push(duty.into());
        self
    }

    /// Add a required role.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.required_roles.push(role.into());
        self
    }

    /// Set the approval lifetime.
    #[must_use]
    pub fn approval_duration(mut self, lifetime: Duration) -> Self {
        self.approval_duration_secs = lifetime.num_seconds();
        self
    }

    /// Level required for `action`.
    #[must_use]
    pub fn level_for(&self, action: &str) -> ApprovalLevel {
        self.approval_levels.get(action).copied().unwrap_or_default()
    }

    /// Approval lifetime.
    #[must_use]
    pub fn approval_lifetime(&self) -> Duration {
        Duration::try_seconds(self.approval_duration_secs).unwrap_or(DEFAULT_APPROVAL_DURATION)
    }
}

/// Approvals that count toward a second-level requirement.
///
/// An approval counts when it is current, its approver and role both differ
/// from the requester's, and no counted approval already used that approver
/// or role.
pub(crate) fn qualifying_approvals<'a>(
    approvals: &'a [Approval],
    requester: &str,
    requester_role: Option<&str>,
    now: DateTime<Utc>,
    lifetime: Duration,
) -> Vec<&'a Approval> {
    let mut identities: HashSet<&str> = HashSet::from([requester]);
    let mut roles: HashSet<&str> = requester_role.into_iter().collect();
    let mut counted = Vec::new();
    for approval in approvals {
        if !approval.is_current(now, lifetime)
            || identities.contains(approval.approver_id.as_str())
            || roles.contains(approval.role.as_str())
        {
            continue;
        }
        identities.insert(&approval.approver_id);
        roles.insert(&approval.role);
        counted.push(approval);
    }
    counted
}

/// Rules by country code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JurisdictionRegistry {
    rules: HashMap<String, JurisdictionRules>,
}

impl JurisdictionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rules, replacing any for the same country.
    pub fn insert(&mut self, rules: JurisdictionRules) {
        self.rules.insert(rules.country.to_ascii_uppercase(), rules);
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, rules: JurisdictionRules) -> Self {
        self.insert(rules);
        self
    }

    /// Rules for `country`, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, country: &str) -> Option<&JurisdictionRules> {
        self.rules.get(&country.to_ascii_uppercase())
    }

    /// Number of registered countries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no country is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
