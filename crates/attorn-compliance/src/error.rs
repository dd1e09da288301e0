//! Compliance violations.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::jurisdiction::ApprovalLevel;

/// Why an action was found non-compliant.
///
/// Every variant is a violation; the checker has no other failure mode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComplianceError {
    /// The token is past its expiry.
    #[error("token expired: {token_id}")]
    TokenExpired {
        /// The token.
        token_id: String,
    },

    /// The amount is negative, infinite or not a number.
    #[error("invalid amount: {amount}")]
    InvalidAmount {
        /// Requested amount.
        amount: f64,
    },

    /// The amount exceeds the per-transaction limit.
    #[error("amount {amount} {currency} exceeds per-transaction limit {max}")]
    TransactionLimit {
        /// Requested amount.
        amount: f64,
        /// Configured limit.
        max: f64,
        /// Currency of both.
        currency: String,
    },

    /// The amount would push the day's total past the daily cap.
    #[error("amount {amount} {currency} on top of {spent} exceeds daily limit {max}")]
    DailyLimit {
        /// Already spent today.
        spent: f64,
        /// Requested amount.
        amount: f64,
        /// Configured cap.
        max: f64,
        /// Currency.
        currency: String,
    },

    /// The request is in a different currency from the limits.
    #[error("currency {actual} does not match limit currency {expected}")]
    CurrencyMismatch {
        /// Currency of the limits.
        expected: String,
        /// Currency of the request.
        actual: String,
    },

    /// The region is missing or not allowed.
    #[error("region not allowed: {}", .region.as_deref().unwrap_or("<unspecified>"))]
    RegionNotAllowed {
        /// Requested region.
        region: Option<String>,
    },

    /// The action falls outside every allowed time window.
    #[error("outside allowed time windows at {at}")]
    OutsideTimeWindow {
        /// When the action was attempted.
        at: DateTime<Utc>,
    },

    /// A named metric exceeds its limit.
    #[error("{name} = {value} exceeds limit {max}")]
    CustomLimit {
        /// Limit name.
        name: String,
        /// Reported value.
        value: f64,
        /// Configured limit.
        max: f64,
    },

    /// No rules are registered for the grant's jurisdiction.
    #[error("no rules for jurisdiction {country}")]
    UnknownJurisdiction {
        /// Country code.
        country: String,
    },

    /// Not enough valid second-level approvals.
    #[error("{required} approval required; {valid} valid approver(s) found")]
    ApprovalMissing {
        /// Level the jurisdiction requires for the action.
        required: ApprovalLevel,
        /// Qualifying approvals found.
        valid: usize,
    },

    /// The amount exceeds the jurisdiction's limit for the action.
    #[error("amount {amount} exceeds jurisdiction limit {max} for {action}")]
    JurisdictionValueLimit {
        /// The action.
        action: String,
        /// Requested amount.
        amount: f64,
        /// Configured limit.
        max: f64,
    },

    /// Fiduciary duties were not acknowledged.
    #[error("fiduciary duties not acknowledged: {}", .missing.join(", "))]
    FiduciaryDuties {
        /// Unacknowledged duties.
        missing: Vec<String>,
    },

    /// Required roles are not held by the requester or an approver.
    #[error("required roles missing: {}", .missing.join(", "))]
    MissingRoles {
        /// Missing roles.
        missing: Vec<String>,
    },
}

impl ComplianceError {
    /// Stable violation category, used in compliance events.
    #[must_use]
    pub fn violation_type(&self) -> &'static str {
        match self {
            Self::TokenExpired { .. } => "token_expired",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::TransactionLimit { .. }
            | Self::DailyLimit { .. }
            | Self::CurrencyMismatch { .. } => "value_limit",
            Self::RegionNotAllowed { .. } => "geographic",
            Self::OutsideTimeWindow { .. } => "time_window",
            Self::CustomLimit { .. } => "custom_limit",
            Self::UnknownJurisdiction { .. } | Self::JurisdictionValueLimit { .. } => "jurisdiction",
            Self::ApprovalMissing { .. } => "approval",
            Self::FiduciaryDuties { .. } => "fiduciary_duty",
            Self::MissingRoles { .. } => "role",
        }
    }

    /// The specific rules broken.
    #[must_use]
    pub fn violation_rules(&self) -> Vec<String> {
        match self {
            Self::TokenExpired { .. } => vec!["expires_at".into()],
            Self::InvalidAmount { .. } => vec!["amount".into()],
            Self::TransactionLimit { .. } => vec!["max_transaction_value".into()],
            Self::DailyLimit { .. } => vec!["daily_limit".into()],
            Self::CurrencyMismatch { .. } => vec!["currency".into()],
            Self::RegionNotAllowed { .. } => vec!["geographic_constraints".into()],
            Self::OutsideTimeWindow { .. } => vec!["time_constraints".into()],
            Self::CustomLimit { name, .. } => vec![name.clone()],
            Self::UnknownJurisdiction { country } => vec![format!("jurisdiction:{country}")],
            Self::ApprovalMissing { required, .. } => vec![format!("approval_level:{required}")],
            Self::JurisdictionValueLimit { action, .. } => vec![format!("value_limit:{action}")],
            Self::FiduciaryDuties { missing } | Self::MissingRoles { missing } => missing.clone(),
        }
    }
}

/// Result type for compliance checks.
pub type ComplianceResult<T> = Result<T, ComplianceError>;
