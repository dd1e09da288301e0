//! Token issuance and refresh.

use std::sync::Arc;

use attorn_core::{ClaimValue, Clock, SystemClock, TokenId};
use attorn_crypto::Signer;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::{TokenError, TokenResult};
use crate::store::TokenStore;
use crate::token::{DELEGATION_LABEL, PowerOfAttorney, Token, TokenMetadata, TokenType};
use crate::wire::{self, Claims};

/// Default access token lifetime.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::hours(1);
/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::days(30);
/// Default id token lifetime.
pub const DEFAULT_ID_TTL: Duration = Duration::hours(1);

/// What to issue.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    token_type: TokenType,
    subject: String,
    scopes: Vec<String>,
    audience: Vec<String>,
    ttl: Option<Duration>,
    not_before: Option<DateTime<Utc>>,
    metadata: TokenMetadata,
}

impl TokenRequest {
    fn new(token_type: TokenType, subject: impl Into<String>) -> Self {
        Self {
            token_type,
            subject: subject.into(),
            scopes: Vec::new(),
            audience: Vec::new(),
            ttl: None,
            not_before: None,
            metadata: TokenMetadata::default(),
        }
    }

    /// An access token for `subject`.
    #[must_use]
    pub fn access(subject: impl Into<String>) -> Self {
        Self::new(TokenType::Access, subject)
    }

    /// A refresh token for `subject`.
    #[must_use]
    pub fn refresh(subject: impl Into<String>) -> Self {
        Self::new(TokenType::Refresh, subject)
    }

    /// An id token for `subject`.
    #[must_use]
    pub fn id(subject: impl Into<String>) -> Self {
        Self::new(TokenType::Id, subject)
    }

    /// Grant a scope.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Grant several scopes.
    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Add an audience. Overrides the issuer's default audience.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience.push(audience.into());
        self
    }

    /// Override the issuer's lifetime for this token type.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Delay validity until `at`.
    #[must_use]
    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }

    /// Attach delegated authority. A delegation ID is also written to the
    /// `delegation_id` label so tokens can be found by delegation.
    #[must_use]
    pub fn power_of_attorney(mut self, poa: PowerOfAttorney) -> Self {
        if let Some(id) = &poa.delegation_id {
            self.metadata
                .labels
                .insert(DELEGATION_LABEL.to_string(), id.to_string());
        }
        self.metadata.power_of_attorney = Some(poa);
        self
    }

    /// Set a metadata label.
    #[must_use]
    pub fn label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(name.into(), value.into());
        self
    }

    /// Set a custom claim.
    #[must_use]
    pub fn claim(mut self, name: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.metadata.claims.insert(name.into(), value.into());
        self
    }
}

/// A freshly issued access token and its refresh token.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Access token.
    pub access: Token,
    /// Refresh token.
    pub refresh: Token,
}

/// Mints signed tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    signer: Arc<dyn Signer>,
    issuer: String,
    audience: Vec<String>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    id_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Issue as `issuer`, signing with `signer`.
    #[must_use]
    pub fn new(signer: Arc<dyn Signer>, issuer: impl Into<String>) -> Self {
        Self {
            signer,
            issuer: issuer.into(),
            audience: Vec::new(),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            id_ttl: DEFAULT_ID_TTL,
            clock: Arc::new(SystemClock),
        }
    }

    /// Add a default audience for requests that set none.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience.push(audience.into());
        self
    }

    /// Set the default lifetimes.
    #[must_use]
    pub fn with_ttls(mut self, access: Duration, refresh: Duration, id: Duration) -> Self {
        self.access_ttl = access;
        self.refresh_ttl = refresh;
        self.id_ttl = id;
        self
    }

    /// Use `clock` for issue times.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The issuer name written into `iss`.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn default_ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
            TokenType::Id => self.id_ttl,
        }
    }

    /// Sign and return a new token.
    ///
    /// Times are truncated to whole seconds, matching the wire format.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidRequest`] for an empty subject, a
    /// non-positive lifetime, or a not-before at or after expiry. Signing
    /// failures are propagated.
    pub fn issue(&self, request: TokenRequest) -> TokenResult<Token> {
        if request.subject.is_empty() {
            return Err(TokenError::InvalidRequest("empty subject".into()));
        }
        let ttl = request
            .ttl
            .unwrap_or_else(|| self.default_ttl(request.token_type));
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidRequest("lifetime must be positive".into()));
        }

        let now = whole_seconds(self.clock.now())?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::InvalidRequest("lifetime out of range".into()))?;
        let not_before = match request.not_before {
            Some(at) => whole_seconds(at)?,
            None => now,
        };
        if not_before >= expires_at {
            return Err(TokenError::InvalidRequest(
                "not-before must precede expiry".into(),
            ));
        }

        let audience = if request.audience.is_empty() {
            self.audience.clone()
        } else {
            request.audience
        };
        let claims = Claims {
            jti: TokenId::new(),
            sub: request.subject,
            iss: self.issuer.clone(),
            aud: audience,
            iat: now.timestamp(),
            nbf: not_before.timestamp(),
            exp: expires_at.timestamp(),
            scp: request.scopes,
            typ: request.token_type,
            poa: request.metadata,
        };
        let value = wire::encode(&claims, self.signer.as_ref())?;
        let token = claims.into_token(self.signer.algorithm(), value)?;
        info!(
            token_id = %token.id,
            token_type = %token.token_type,
            subject = %token.subject,
            expires_at = %token.expires_at,
            "token issued"
        );
        Ok(token)
    }

    /// Issue an access token and a matching refresh token.
    ///
    /// # Errors
    ///
    /// See [`issue`](Self::issue).
    pub fn issue_pair(&self, request: TokenRequest) -> TokenResult<TokenPair> {
        let refresh = TokenRequest {
            token_type: TokenType::Refresh,
            ttl: None,
            ..request.clone()
        };
        Ok(TokenPair {
            access: self.issue(request)?,
            refresh: self.issue(refresh)?,
        })
    }

    /// Exchange a stored refresh token for a new pair.
    ///
    /// The refresh token is validated against `store`. The new access token
    /// is saved and the refresh token is rotated, which revokes the old one.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::WrongType`] for a non-refresh token and any
    /// store validation or rotation error.
    pub async fn refresh(&self, store: &dyn TokenStore, refresh_token: &Token) -> TokenResult<TokenPair> {
        if refresh_token.token_type != TokenType::Refresh {
            return Err(TokenError::WrongType {
                expected: TokenType::Refresh.to_string(),
                actual: refresh_token.token_type.to_string(),
            });
        }
        let current = store.validate(refresh_token).await?;

        let base = TokenRequest {
            token_type: TokenType::Access,
            subject: current.subject.clone(),
            scopes: current.scopes.clone(),
            audience: current.audience.clone(),
            ttl: None,
            not_before: None,
            metadata: current.metadata.clone(),
        };
        let pair = self.issue_pair(base)?;
        store.save(pair.access.id.as_str(), pair.access.clone()).await?;
        store.rotate(&current, pair.refresh.clone()).await?;
        info!(
            old = %current.id,
            access = %pair.access.id,
            refresh = %pair.refresh.id,
            "refresh token rotated"
        );
        Ok(pair)
    }
}

fn whole_seconds(at: DateTime<Utc>) -> TokenResult<DateTime<Utc>> {
    DateTime::from_timestamp(at.timestamp(), 0)
        .ok_or_else(|| TokenError::InvalidRequest("timestamp out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;
    use attorn_core::{DelegationId, ManualClock, PowerType};
    use attorn_crypto::KeyPair;

    fn issuer() -> (TokenIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let issuer = TokenIssuer::new(Arc::new(KeyPair::generate()), "https://issuer.example")
            .with_audience("payments")
            .with_clock(clock.clone());
        (issuer, clock)
    }

    #[test]
    fn test_issue_defaults() {
        let (issuer, _) = issuer();
        let token = issuer
            .issue(TokenRequest::access("agent-7").scope("read"))
            .unwrap();
        assert_eq!(token.token_type, TokenType::Access);
        assert_eq!(token.audience, vec!["payments"]);
        assert_eq!(token.expires_at - token.issued_at, DEFAULT_ACCESS_TTL);
        assert_eq!(token.not_before, token.issued_at);
        assert_eq!(token.issued_at.timestamp_subsec_nanos(), 0);
        assert!(token.revocation.is_none());
    }

    #[test]
    fn test_issue_rejects_bad_requests() {
        let (issuer, clock) = issuer();
        assert!(matches!(
            issuer.issue(TokenRequest::access("")),
            Err(TokenError::InvalidRequest(_))
        ));
        assert!(matches!(
            issuer.issue(TokenRequest::access("a").ttl(Duration::zero())),
            Err(TokenError::InvalidRequest(_))
        ));
        let late = clock.now() + Duration::hours(2);
        assert!(matches!(
            issuer.issue(TokenRequest::access("a").not_before(late)),
            Err(TokenError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_power_of_attorney_labels_delegation() {
        let (issuer, _) = issuer();
        let delegation = DelegationId::generate();
        let poa = PowerOfAttorney::new("alice", PowerType::financial_transactions())
            .with_delegation(delegation.clone());
        let token = issuer
            .issue(TokenRequest::access("agent-7").power_of_attorney(poa))
            .unwrap();
        assert_eq!(token.delegation_id(), Some(delegation.as_str()));
        assert_eq!(
            token.power_of_attorney().unwrap().principal_id,
            "alice".to_string()
        );
    }

    #[tokio::test]
    async fn test_refresh_rotates_pair() {
        let (issuer, _) = issuer();
        let store = MemoryTokenStore::new();
        let pair = issuer
            .issue_pair(TokenRequest::access("agent-7").scope("read"))
            .unwrap();
        assert_eq!(pair.refresh.token_type, TokenType::Refresh);
        store
            .save(pair.refresh.id.as_str(), pair.refresh.clone())
            .await
            .unwrap();

        let next = issuer.refresh(&store, &pair.refresh).await.unwrap();
        assert_eq!(next.access.scopes, vec!["read"]);
        assert!(store.validate(&next.access).await.is_ok());
        assert!(store.validate(&next.refresh).await.is_ok());

        // The old refresh token is spent.
        assert!(matches!(
            issuer.refresh(&store, &pair.refresh).await,
            Err(TokenError::Revoked { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_requires_refresh_type() {
        let (issuer, _) = issuer();
        let store = MemoryTokenStore::new();
        let access = issuer.issue(TokenRequest::access("agent-7")).unwrap();
        assert!(matches!(
            issuer.refresh(&store, &access).await,
            Err(TokenError::WrongType { .. })
        ));
    }
}
