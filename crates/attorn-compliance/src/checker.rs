//! The compliance checker.
//!
//! # Check Order
//!
//! 1. The token is unexpired and any amount is finite and non-negative
//! 2. Restrictions carried in the power-of-attorney block: value limits,
//!    region, time windows, then custom limits
//! 3. Rules of the grant's jurisdiction: approvals, value limit per action,
//!    fiduciary duties, then required roles
//! 4. The daily spend is committed to the ledger
//!
//! An event is emitted to the sink for every check, compliant or not.

use std::collections::BTreeMap;
use std::sync::Arc;

use attorn_core::{Clock, Restrictions, SystemClock};
use attorn_tokens::Token;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ComplianceError, ComplianceResult};
use crate::jurisdiction::{Approval, JurisdictionRegistry, JurisdictionRules, qualifying_approvals};
use crate::ledger::SpendLedger;
use crate::sink::{ComplianceEvent, ComplianceSink};

/// An attempt to exercise delegated authority.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Action type, e.g. `wire_transfer`.
    pub action: String,
    /// Who is acting. Defaults to the token subject when empty.
    #[serde(default)]
    pub requester: String,
    /// Role the requester acts in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_role: Option<String>,
    /// Transaction value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Currency of `amount`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Region the action takes place in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Named metrics checked against custom limits.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Second-level approvals.
    #[serde(default)]
    pub approvals: Vec<Approval>,
    /// Fiduciary duties the requester acknowledges.
    #[serde(default)]
    pub acknowledged_duties: Vec<String>,
}

impl ActionRequest {
    /// A request for `action` with nothing else set.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Set the requester and role.
    #[must_use]
    pub fn by(mut self, requester: impl Into<String>, role: impl Into<String>) -> Self {
        self.requester = requester.into();
        self.requester_role = Some(role.into());
        self
    }

    /// Set the value and currency.
    #[must_use]
    pub fn amount(mut self, amount: f64, currency: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    /// Set the region.
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Report a metric.
    #[must_use]
    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Attach an approval.
    #[must_use]
    pub fn approval(mut self, approval: Approval) -> Self {
        self.approvals.push(approval);
        self
    }

    /// Acknowledge a fiduciary duty.
    #[must_use]
    pub fn acknowledge(mut self, duty: impl Into<String>) -> Self {
        self.acknowledged_duties.push(duty.into());
        self
    }
}

/// A daily spend that passed every check and is ready to commit.
struct PendingSpend {
    key: String,
    amount: f64,
    cap: f64,
    currency: String,
}

/// Applies restrictions and jurisdiction rules to actions.
#[derive(Debug)]
pub struct ComplianceChecker {
    jurisdictions: JurisdictionRegistry,
    ledger: SpendLedger,
    sink: Arc<dyn ComplianceSink>,
    clock: Arc<dyn Clock>,
}

impl ComplianceChecker {
    /// A checker emitting to `sink`.
    #[must_use]
    pub fn new(jurisdictions: JurisdictionRegistry, sink: Arc<dyn ComplianceSink>) -> Self {
        Self {
            jurisdictions,
            ledger: SpendLedger::new(),
            sink,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for expiry, windows and approvals.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The daily spend ledger.
    #[must_use]
    pub fn ledger(&self) -> &SpendLedger {
        &self.ledger
    }

    /// The registered jurisdiction rules.
    #[must_use]
    pub fn jurisdictions(&self) -> &JurisdictionRegistry {
        &self.jurisdictions
    }

    /// Check `request` under `token` and emit the outcome.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check(&self, token: &Token, request: &ActionRequest) -> ComplianceResult<()> {
        let now = self.clock.now();
        let outcome = self.evaluate(token, request, now);

        let event = ComplianceEvent {
            token_id: token.id.to_string(),
            action: request.action.clone(),
            timestamp: now,
            compliant: outcome.is_ok(),
            violation_type: outcome
                .as_ref()
                .err()
                .map(|e| e.violation_type().to_string()),
            violation_rules: outcome
                .as_ref()
                .err()
                .map(ComplianceError::violation_rules)
                .unwrap_or_default(),
            detail: outcome.as_ref().err().map(ToString::to_string),
        };
        match &outcome {
            Ok(()) => info!(token_id = %token.id, action = %request.action, "action compliant"),
            Err(e) => warn!(
                token_id = %token.id,
                action = %request.action,
                violation = e.violation_type(),
                error = %e,
                "compliance violation"
            ),
        }
        self.sink.emit(event);
        outcome
    }

    fn evaluate(&self, token: &Token, request: &ActionRequest, now: DateTime<Utc>) -> ComplianceResult<()> {
        if token.is_expired_at(now, Duration::zero()) {
            return Err(ComplianceError::TokenExpired {
                token_id: token.id.to_string(),
            });
        }

        if let Some(amount) = request.amount
            && (!amount.is_finite() || amount < 0.0)
        {
            return Err(ComplianceError::InvalidAmount { amount });
        }

        let poa = token.power_of_attorney();
        let ledger_key = token
            .delegation_id()
            .map_or_else(|| token.subject.clone(), str::to_string);

        let pending = match poa.and_then(|p| p.restrictions.as_ref()) {
            Some(restrictions) => self.check_restrictions(restrictions, request, &ledger_key, now)?,
            None => None,
        };

        if let Some(country) = poa.and_then(|p| p.jurisdiction.as_deref()) {
            let rules = self
                .jurisdictions
                .get(country)
                .ok_or_else(|| ComplianceError::UnknownJurisdiction {
                    country: country.to_string(),
                })?;
            let requester = if request.requester.is_empty() {
                token.subject.as_str()
            } else {
                request.requester.as_str()
            };
            check_jurisdiction(rules, request, requester, now)?;
        }

        if let Some(spend) = pending {
            self.ledger
                .try_record(&spend.key, now.date_naive(), spend.amount, spend.cap)
                .map_err(|spent| ComplianceError::DailyLimit {
                    spent,
                    amount: spend.amount,
                    max: spend.cap,
                    currency: spend.currency,
                })?;
        }
        Ok(())
    }

    fn check_restrictions(
        &self,
        restrictions: &Restrictions,
        request: &ActionRequest,
        ledger_key: &str,
        now: DateTime<Utc>,
    ) -> ComplianceResult<Option<PendingSpend>> {
        let mut pending = None;
        if let (Some(limits), Some(amount)) = (&restrictions.value_limits, request.amount) {
            if let Some(currency) = &request.currency
                && !currency.eq_ignore_ascii_case(&limits.currency)
            {
                return Err(ComplianceError::CurrencyMismatch {
                    expected: limits.currency.clone(),
                    actual: currency.clone(),
                });
            }
            if amount > limits.max_transaction_value {
                return Err(ComplianceError::TransactionLimit {
                    amount,
                    max: limits.max_transaction_value,
                    currency: limits.currency.clone(),
                });
            }
            let spent = self.ledger.spent(ledger_key, now.date_naive());
            if spent + amount > limits.daily_limit {
                return Err(ComplianceError::DailyLimit {
                    spent,
                    amount,
                    max: limits.daily_limit,
                    currency: limits.currency.clone(),
                });
            }
            pending = Some(PendingSpend {
                key: ledger_key.to_string(),
                amount,
                cap: limits.daily_limit,
                currency: limits.currency.clone(),
            });
        }

        if !restrictions.geographic_constraints.is_empty()
            && !request
                .region
                .as_deref()
                .is_some_and(|region| restrictions.allows_region(region))
        {
            return Err(ComplianceError::RegionNotAllowed {
                region: request.region.clone(),
            });
        }

        if let Some(windows) = &restrictions.time_constraints
            && !windows.permits(now)
        {
            return Err(ComplianceError::OutsideTimeWindow { at: now });
        }

        for (name, max) in &restrictions.custom_limits {
            if let Some(value) = request.metrics.get(name)
                && (value.is_nan() || value > max)
            {
                return Err(ComplianceError::CustomLimit {
                    name: name.clone(),
                    value: *value,
                    max: *max,
                });
            }
        }
        Ok(pending)
    }
}

fn check_jurisdiction(
    rules: &JurisdictionRules,
    request: &ActionRequest,
    requester: &str,
    now: DateTime<Utc>,
) -> ComplianceResult<()> {
    let level = rules.level_for(&request.action);
    let approvers = qualifying_approvals(
        &request.approvals,
        requester,
        request.requester_role.as_deref(),
        now,
        rules.approval_lifetime(),
    );
    if approvers.len() < level.additional_approvers() {
        return Err(ComplianceError::ApprovalMissing {
            required: level,
            valid: approvers.len(),
        });
    }

    if let (Some(max), Some(amount)) = (rules.value_limits.get(&request.action), request.amount)
        && amount > *max
    {
        return Err(ComplianceError::JurisdictionValueLimit {
            action: request.action.clone(),
            amount,
            max: *max,
        });
    }

    let missing_duties: Vec<String> = rules
        .fiduciary_duties
        .iter()
        .filter(|duty| !request.acknowledged_duties.contains(duty))
        .cloned()
        .collect();
    if !missing_duties.is_empty() {
        return Err(ComplianceError::FiduciaryDuties {
            missing: missing_duties,
        });
    }

    let missing_roles: Vec<String> = rules
        .required_roles
        .iter()
        .filter(|role| {
            request.requester_role.as_deref() != Some(role.as_str())
                && !approvers.iter().any(|a| &a.role == *role)
        })
        .cloned()
        .collect();
    if !missing_roles.is_empty() {
        return Err(ComplianceError::MissingRoles {
            missing: missing_roles,
        });
    }
    Ok(())
}
