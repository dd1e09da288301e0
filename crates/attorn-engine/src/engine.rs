//! The authorization engine.
//!
//! # Request Flow
//!
//! Every request is admitted through the global in-flight cap, runs under
//! the request deadline, and is refused once shutdown begins.
//!
//! `authorize` then runs, failing on the first refusal:
//! 1. Token validation (cached when the distributed tier is enabled)
//! 2. The subject's rate limit
//! 3. The delegation the token was issued under: active, held by the token
//!    subject, and covering the action
//! 4. The policy decision point
//! 5. Compliance rules of the power of attorney and its jurisdiction
//!
//! `grant` verifies the principal with the registry, collects attestations,
//! stores the delegation, then issues and saves an access and refresh pair.
//! If issuing fails the stored delegation is revoked again.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use attorn_compliance::ComplianceChecker;
use attorn_config::Config;
use attorn_core::{ClaimValue, Clock, DelegationId, TokenId};
use attorn_delegation::{
    AttestationRequirement, AttestationService, Delegation, DelegationError, DelegationManager,
    RegistryVerifier,
};
use attorn_policy::{AccessRequest, PolicyDecisionPoint};
use attorn_telemetry::RequestContext;
use attorn_tokens::{
    CleanupWorker, DELEGATION_LABEL, PowerOfAttorney, RevocationList, Token, TokenError,
    TokenFilter, TokenIssuer, TokenPair, TokenRequest, TokenStore, TokenType, ValidationPipeline,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::builder::EngineBuilder;
use crate::error::{EngineError, EngineResult};
use crate::rate_limit::RateLimiter;
use crate::request::{AuthorizeRequest, Authorization, Grant, GrantRequest};
use crate::validator::Validator;

/// Scopes of the presented token.
pub const ATTR_SCOPES: &str = "token.scopes";
/// Principal of the power of attorney.
pub const ATTR_PRINCIPAL: &str = "poa.principal";
/// Power type of the power of attorney.
pub const ATTR_POWER_TYPE: &str = "poa.power_type";
/// Jurisdiction of the power of attorney.
pub const ATTR_JURISDICTION: &str = "poa.jurisdiction";
/// Kind of agent holding the power of attorney.
pub const ATTR_AI_TYPE: &str = "poa.ai_type";
/// Delegation the token was issued under.
pub const ATTR_DELEGATION: &str = "delegation_id";
/// Transaction value of the action.
pub const ATTR_AMOUNT: &str = "amount";

/// Reason prefix recorded on tokens revoked with their delegation.
const CASCADE_REASON: &str = "delegation revoked";

/// Grants, validates and authorizes delegated authority.
///
/// Build one with [`Engine::builder`]. Call [`start`](Self::start) inside a
/// tokio runtime to run background cleanup, and [`shutdown`](Self::shutdown)
/// to stop it.
#[derive(Debug)]
pub struct Engine {
    pub(crate) issuer: TokenIssuer,
    pub(crate) access_ttl: chrono::Duration,
    pub(crate) pipeline: ValidationPipeline,
    pub(crate) store: Arc<dyn TokenStore>,
    pub(crate) revocations: Arc<RevocationList>,
    pub(crate) validator: Validator,
    pub(crate) delegations: Arc<DelegationManager>,
    pub(crate) attestation: Arc<AttestationService>,
    pub(crate) requirement: AttestationRequirement,
    pub(crate) registry: Arc<dyn RegistryVerifier>,
    pub(crate) pdp: PolicyDecisionPoint,
    pub(crate) compliance: ComplianceChecker,
    pub(crate) limiter: RateLimiter,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) cleanup_interval: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) shutdown_grace: Duration,
    pub(crate) shutdown: CancellationToken,
    pub(crate) cleanup: Mutex<Option<CleanupWorker>>,
}

impl Engine {
    /// Start assembling an engine from `config`.
    #[must_use]
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// An engine built purely from `config`.
    ///
    /// # Errors
    ///
    /// See [`EngineBuilder::build`].
    pub fn from_config(config: Config) -> EngineResult<Self> {
        EngineBuilder::new(config).build()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Spawn the expired-token sweep. Calling it again does nothing.
    pub fn start(&self) {
        if self.cleanup_interval.is_zero() || self.shutdown.is_cancelled() {
            return;
        }
        let mut slot = self.cleanup.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(CleanupWorker::spawn(
                Arc::clone(&self.store),
                Some(Arc::clone(&self.revocations)),
                self.cleanup_interval,
            ));
            info!(interval_secs = self.cleanup_interval.as_secs(), "engine started");
        }
    }

    /// Refuse new requests and stop background work within the grace
    /// period. Returns `false` if the cleanup task had to be aborted.
    pub async fn shutdown(&self) -> bool {
        self.shutdown.cancel();
        self.limiter.close();
        let worker = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let clean = match worker {
            Some(worker) => worker.shutdown(self.shutdown_grace).await,
            None => true,
        };
        info!(clean, "engine stopped");
        clean
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // -----------------------------------------------------------------------
    // Flows
    // -----------------------------------------------------------------------

    /// Delegate authority and issue tokens for it.
    ///
    /// # Errors
    ///
    /// Returns the registry, attestation or delegation error that refused
    /// the grant, or the issuing error. Nothing stays in force on failure.
    pub async fn grant(&self, request: GrantRequest) -> EngineResult<Grant> {
        let context = RequestContext::new("engine")
            .with_operation("grant")
            .with_subject(request.principal.owner_id.clone());
        self.bounded(context, "grant", self.grant_inner(request))
            .await
    }

    /// Decide whether the holder of a token may perform an action.
    ///
    /// # Errors
    ///
    /// Returns the first refusal: an invalid token, rate limiting, an
    /// inactive or mismatched delegation, a policy deny, or a compliance
    /// violation.
    pub async fn authorize(&self, request: &AuthorizeRequest) -> EngineResult<Authorization> {
        let context = RequestContext::new("engine").with_operation("authorize");
        self.bounded(context, "authorize", self.authorize_inner(request))
            .await
    }

    /// Exchange a refresh token for a new pair, rotating the old one.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad token, a token error for a
    /// non-refresh token, or [`EngineError::DelegationInactive`] if its
    /// delegation was revoked.
    pub async fn refresh(&self, value: &str) -> EngineResult<TokenPair> {
        let context = RequestContext::new("engine").with_operation("refresh");
        self.bounded(context, "refresh", self.refresh_inner(value))
            .await
    }

    /// Revoke one token everywhere it may be cached.
    ///
    /// # Errors
    ///
    /// Returns a decoding error for an unreadable value, or the failed
    /// revocation steps. Retrying is safe.
    pub async fn revoke_token(&self, value: &str, reason: &str) -> EngineResult<()> {
        let context = RequestContext::new("engine").with_operation("revoke_token");
        self.bounded(context, "revoke_token", self.validator.revoke(value, reason))
            .await
    }

    /// Revoke a delegation and every unrevoked token issued under it.
    ///
    /// Revocation is terminal. The delegation is revoked even if some of
    /// its tokens cannot be; those are refused at authorization anyway.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationError::NotFound`] for an unknown ID, or
    /// [`EngineError::CascadeIncomplete`] naming tokens left unrevoked.
    pub async fn revoke_delegation(
        &self,
        id: &DelegationId,
        reason: &str,
    ) -> EngineResult<Delegation> {
        let context = RequestContext::new("engine").with_operation("revoke_delegation");
        self.bounded(
            context,
            "revoke_delegation",
            self.revoke_delegation_inner(id, reason),
        )
        .await
    }

    /// Receive IDs of tokens this engine revokes, for peer engines to
    /// evict. `None` when the distributed tier is disabled.
    #[must_use]
    pub fn subscribe_revocations(&self) -> Option<broadcast::Receiver<TokenId>> {
        self.validator.subscribe()
    }

    /// Evict tokens revoked by a peer from the local cache. `None` when the
    /// distributed tier is disabled.
    #[must_use]
    pub fn follow_revocations(
        &self,
        rx: broadcast::Receiver<TokenId>,
    ) -> Option<JoinHandle<()>> {
        self.validator.follow(rx)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The delegation graph.
    #[must_use]
    pub fn delegations(&self) -> &Arc<DelegationManager> {
        &self.delegations
    }

    /// Attestations collected for grants.
    #[must_use]
    pub fn attestations(&self) -> &Arc<AttestationService> {
        &self.attestation
    }

    /// The token store.
    #[must_use]
    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// The policy decision point.
    #[must_use]
    pub fn policy(&self) -> &PolicyDecisionPoint {
        &self.pdp
    }

    /// The compliance checker.
    #[must_use]
    pub fn compliance(&self) -> &ComplianceChecker {
        &self.compliance
    }

    /// Request admission.
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The local validation cache, when the distributed tier is enabled.
    #[must_use]
    pub fn local_cache(&self) -> Option<&attorn_distributed::LocalCache> {
        self.validator.cached().map(|v| v.local_cache())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Admit `work`, bound it by the request deadline and run it in the
    /// request's span.
    async fn bounded<T, F>(
        &self,
        context: RequestContext,
        operation: &'static str,
        work: F,
    ) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        let deadline = self.request_timeout;
        let admitted = async {
            let _slot = self.limiter.acquire().await?;
            work.await
        };
        let outcome = async {
            tokio::select! {
                () = self.shutdown.cancelled() => Err(EngineError::ShuttingDown),
                result = tokio::time::timeout(deadline, admitted) => {
                    result.unwrap_or_else(|_| Err(EngineError::Timeout {
                        operation,
                        timeout_secs: deadline.as_secs(),
                    }))
                },
            }
        }
        .instrument(context.span())
        .await;

        match &outcome {
            Ok(_) => debug!(
                request_id = %context.request_id,
                operation,
                elapsed_ms = context.elapsed_ms(),
                "request completed"
            ),
            Err(e) if e.is_denial() => info!(
                request_id = %context.request_id,
                operation,
                code = e.code(),
                error = %e,
                "request refused"
            ),
            Err(e) => warn!(
                request_id = %context.request_id,
                operation,
                code = e.code(),
                error = %e,
                "request failed"
            ),
        }
        outcome
    }

    async fn grant_inner(&self, request: GrantRequest) -> EngineResult<Grant> {
        let principal_id = request.principal.owner_id.clone();
        self.limiter.check(&principal_id)?;

        self.registry
            .verify(&request.principal)
            .await
            .map_err(DelegationError::from)?;
        let attestations = self
            .attestation
            .process_requirement(&self.requirement)
            .await?;

        let delegation = Delegation::new(
            &principal_id,
            &request.delegate,
            request.power_type.clone(),
            request.validity,
        )
        .with_scope(request.scope.iter().cloned())
        .with_restrictions(request.restrictions.clone())
        .with_attestations(attestations.into_iter().map(|a| a.id));
        let delegation = self.delegations.store_delegation(delegation).await?;

        match self.issue_for(&delegation, &request).await {
            Ok(pair) => {
                info!(
                    delegation_id = %delegation.id,
                    principal = %delegation.principal_id,
                    delegate = %delegation.delegate_id,
                    access = %pair.access.id,
                    "authority granted"
                );
                Ok(Grant {
                    delegation,
                    access: pair.access,
                    refresh: pair.refresh,
                })
            },
            Err(e) => {
                if let Err(undo) = self.delegations.revoke_delegation(&delegation.id).await {
                    warn!(delegation_id = %delegation.id, error = %undo, "could not withdraw delegation after failed issue");
                }
                Err(e)
            },
        }
    }

    async fn issue_for(
        &self,
        delegation: &Delegation,
        request: &GrantRequest,
    ) -> EngineResult<TokenPair> {
        let now = self.clock.now();
        let mut poa = PowerOfAttorney::new(&delegation.principal_id, delegation.power_type.clone())
            .with_delegation(delegation.id.clone());
        if !delegation.restrictions.is_empty() {
            poa = poa.with_restrictions(delegation.restrictions.clone());
        }
        if let Some(country) = &request.jurisdiction {
            poa = poa.with_jurisdiction(country);
        }
        if let Some(ai_type) = &request.ai_type {
            poa = poa.with_ai_type(ai_type);
        }
        poa.capabilities.clone_from(&request.capabilities);

        // Access tokens never outlive the delegation.
        let remaining = delegation.validity.end.signed_duration_since(now);
        let mut token_request = TokenRequest::access(&delegation.delegate_id)
            .scopes(delegation.scope.iter().cloned())
            .ttl(remaining.min(self.access_ttl))
            .power_of_attorney(poa);
        if delegation.validity.start > now {
            token_request = token_request.not_before(delegation.validity.start);
        }

        let pair = self.issuer.issue_pair(token_request)?;
        self.store
            .save(pair.access.id.as_str(), pair.access.clone())
            .await?;
        if let Err(e) = self
            .store
            .save(pair.refresh.id.as_str(), pair.refresh.clone())
            .await
        {
            if let Err(undo) = self.store.delete(pair.access.id.as_str()).await {
                warn!(token_id = %pair.access.id, error = %undo, "could not remove access token after failed save");
            }
            return Err(e.into());
        }
        Ok(pair)
    }

    async fn authorize_inner(&self, request: &AuthorizeRequest) -> EngineResult<Authorization> {
        let token = self.validator.validate(&request.token).await?;
        if token.token_type != TokenType::Access {
            return Err(TokenError::WrongType {
                expected: TokenType::Access.to_string(),
                actual: token.token_type.to_string(),
            }
            .into());
        }
        self.limiter.check(&token.subject)?;

        let action = request.action.action.as_str();
        let delegation_id = match token.delegation_id() {
            Some(raw) => Some(self.check_delegation(raw, &token, action).await?),
            None => None,
        };

        let access = access_request(&token, request);
        let decision = self.pdp.authorize_request(&access).await?;
        if !decision.is_permit() {
            return Err(EngineError::Denied {
                subject: decision.subject,
                resource: decision.resource,
                action: decision.action,
                policy_id: decision.policy_id,
                rule_id: decision.rule_id,
            });
        }

        self.compliance.check(&token, &request.action)?;

        info!(
            token_id = %token.id,
            subject = %token.subject,
            resource = %request.resource,
            action,
            "request authorized"
        );
        Ok(Authorization {
            token_id: token.id,
            subject: token.subject,
            delegation_id,
            decision,
        })
    }

    async fn refresh_inner(&self, value: &str) -> EngineResult<TokenPair> {
        let token = self.pipeline.validate_value(value)?;
        self.limiter.check(&token.subject)?;
        if let Some(raw) = token.delegation_id() {
            let delegation = self
                .delegations
                .get_delegation(&DelegationId::parse(raw)?)
                .await?;
            if !delegation.is_active() {
                return Err(EngineError::DelegationInactive {
                    delegation_id: delegation.id.to_string(),
                });
            }
        }
        Ok(self.issuer.refresh(self.store.as_ref(), &token).await?)
    }

    async fn revoke_delegation_inner(
        &self,
        id: &DelegationId,
        reason: &str,
    ) -> EngineResult<Delegation> {
        let delegation = self.delegations.revoke_delegation(id).await?;
        let issued = self
            .store
            .list(
                &TokenFilter::new()
                    .label(DELEGATION_LABEL, id.as_str())
                    .revoked(false),
            )
            .await?;

        let why = format!("{CASCADE_REASON}: {reason}");
        let mut failed = Vec::new();
        for token in &issued {
            if let Err(e) = self.validator.revoke(&token.value, &why).await {
                warn!(token_id = %token.id, delegation_id = %id, error = %e, "cascade revocation failed");
                failed.push(token.id.to_string());
            }
        }
        if failed.is_empty() {
            info!(delegation_id = %id, tokens = issued.len(), reason, "delegation revoked");
            Ok(delegation)
        } else {
            Err(EngineError::CascadeIncomplete {
                delegation_id: id.to_string(),
                failed,
            })
        }
    }

    async fn check_delegation(
        &self,
        raw: &str,
        token: &Token,
        action: &str,
    ) -> EngineResult<DelegationId> {
        let id = DelegationId::parse(raw)?;
        let delegation = self.delegations.get_delegation(&id).await?;
        if !delegation.is_active() {
            return Err(EngineError::DelegationInactive {
                delegation_id: id.to_string(),
            });
        }
        if delegation.delegate_id != token.subject {
            return Err(EngineError::DelegateMismatch {
                delegation_id: id.to_string(),
                subject: token.subject.clone(),
            });
        }
        if !delegation.scope.is_empty() && !delegation.scope.iter().any(|s| s == action) {
            return Err(EngineError::OutOfScope {
                delegation_id: id.to_string(),
                action: action.to_string(),
            });
        }
        Ok(id)
    }
}

/// The policy request for `request`, with attributes derived from the
/// token. Token-derived attributes replace caller attributes of the same
/// name.
fn access_request(token: &Token, request: &AuthorizeRequest) -> AccessRequest {
    let mut access = AccessRequest::new(
        token.subject.clone(),
        request.resource.clone(),
        request.action.action.clone(),
    );
    access.attributes.clone_from(&request.attributes);

    let attrs = &mut access.attributes;
    attrs.insert(
        ATTR_SCOPES.to_string(),
        ClaimValue::List(
            token
                .scopes
                .iter()
                .map(|s| ClaimValue::String(s.clone()))
                .collect(),
        ),
    );
    if let Some(amount) = request.action.amount {
        attrs.insert(ATTR_AMOUNT.to_string(), ClaimValue::Float(amount));
    }
    if let Some(id) = token.delegation_id() {
        attrs.insert(ATTR_DELEGATION.to_string(), id.into());
    }
    if let Some(poa) = token.power_of_attorney() {
        attrs.insert(ATTR_PRINCIPAL.to_string(), poa.principal_id.as_str().into());
        attrs.insert(ATTR_POWER_TYPE.to_string(), poa.power_type.as_str().into());
        if let Some(country) = &poa.jurisdiction {
            attrs.insert(ATTR_JURISDICTION.to_string(), country.as_str().into());
        }
        if let Some(ai_type) = &poa.ai_type {
            attrs.insert(ATTR_AI_TYPE.to_string(), ai_type.as_str().into());
        }
    }
    access
}
