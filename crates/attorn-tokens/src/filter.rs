//! Token listing filters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::token::{Token, TokenType};

/// How `scopes` in a filter are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMatch {
    /// The token must carry every listed scope.
    #[default]
    All,
    /// The token must carry at least one listed scope.
    Any,
}

/// Criteria for [`TokenStore::list`](crate::TokenStore::list).
///
/// Unset criteria match everything; set criteria are ANDed.
#[derive(Debug, Clone, Default)]
pub struct TokenFilter {
    /// Accepted token types. Empty accepts all.
    pub types: Vec<TokenType>,
    /// Exact subject.
    pub subject: Option<String>,
    /// Exact issuer.
    pub issuer: Option<String>,
    /// Scopes to match.
    pub scopes: Vec<String>,
    /// How `scopes` are matched.
    pub scope_match: ScopeMatch,
    /// Issued strictly after.
    pub issued_after: Option<DateTime<Utc>>,
    /// Issued strictly before.
    pub issued_before: Option<DateTime<Utc>>,
    /// Expires strictly after.
    pub expires_after: Option<DateTime<Utc>>,
    /// Expires strictly before.
    pub expires_before: Option<DateTime<Utc>>,
    /// Only tokens active at evaluation time.
    pub active_only: bool,
    /// Required label values.
    pub labels: BTreeMap<String, String>,
    /// Revoked (`Some(true)`) or unrevoked (`Some(false)`) only.
    pub revoked: Option<bool>,
}

impl TokenFilter {
    /// A filter matching every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token_type` (may be repeated).
    #[must_use]
    pub fn token_type(mut self, token_type: TokenType) -> Self {
        self.types.push(token_type);
        self
    }

    /// Match the subject exactly.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Match the issuer exactly.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Require all of `scopes`.
    #[must_use]
    pub fn all_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self.scope_match = ScopeMatch::All;
        self
    }

    /// Require any of `scopes`.
    #[must_use]
    pub fn any_scope<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self.scope_match = ScopeMatch::Any;
        self
    }

    /// Issued strictly after `at`.
    #[must_use]
    pub fn issued_after(mut self, at: DateTime<Utc>) -> Self {
        self.issued_after = Some(at);
        self
    }

    /// Issued strictly before `at`.
    #[must_use]
    pub fn issued_before(mut self, at: DateTime<Utc>) -> Self {
        self.issued_before = Some(at);
        self
    }

    /// Expiring strictly after `at`.
    #[must_use]
    pub fn expires_after(mut self, at: DateTime<Utc>) -> Self {
        self.expires_after = Some(at);
        self
    }

    /// Expiring strictly before `at`.
    #[must_use]
    pub fn expires_before(mut self, at: DateTime<Utc>) -> Self {
        self.expires_before = Some(at);
        self
    }

    /// Only tokens active now.
    #[must_use]
    pub fn active(mut self) -> Self {
        self.active_only = true;
        self
    }

    /// Require a label value.
    #[must_use]
    pub fn label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    /// Only revoked (`true`) or unrevoked (`false`) tokens.
    #[must_use]
    pub fn revoked(mut self, revoked: bool) -> Self {
        self.revoked = Some(revoked);
        self
    }

    /// Whether `token` satisfies every set criterion as of `now`.
    #[must_use]
    pub fn matches(&self, token: &Token, now: DateTime<Utc>) -> bool {
        if !self.types.is_empty() && !self.types.contains(&token.token_type) {
            return false;
        }
        if self.subject.as_ref().is_some_and(|s| *s != token.subject) {
            return false;
        }
        if self.issuer.as_ref().is_some_and(|i| *i != token.issuer) {
            return false;
        }
        if !self.scopes.is_empty() {
            let ok = match self.scope_match {
                ScopeMatch::All => self.scopes.iter().all(|s| token.has_scope(s)),
                ScopeMatch::Any => self.scopes.iter().any(|s| token.has_scope(s)),
            };
            if !ok {
                return false;
            }
        }
        if self.issued_after.is_some_and(|at| token.issued_at <= at)
            || self.issued_before.is_some_and(|at| token.issued_at >= at)
            || self.expires_after.is_some_and(|at| token.expires_at <= at)
            || self.expires_before.is_some_and(|at| token.expires_at >= at)
        {
            return false;
        }
        if self.active_only && !token.is_active_at(now) {
            return false;
        }
        if self.revoked.is_some_and(|r| r != token.is_revoked()) {
            return false;
        }
        self.labels
            .iter()
            .all(|(name, value)| token.label(name) == Some(value.as_str()))
    }
}
