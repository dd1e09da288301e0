//! Requests and results of the engine's flows.

use attorn_compliance::ActionRequest;
use attorn_core::{ClaimMap, ClaimValue, DelegationId, PowerType, Restrictions, TokenId};
use attorn_delegation::{Delegation, OwnerInfo, ValidityPeriod};
use attorn_policy::Decision;
use attorn_tokens::Token;

/// A principal's request to delegate authority to an agent.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    /// The principal, as presented to the registry.
    pub principal: OwnerInfo,
    /// Who receives the authority.
    pub delegate: String,
    /// Category of authority.
    pub power_type: PowerType,
    /// When the delegation is in force.
    pub validity: ValidityPeriod,
    /// Actions the delegate may take. Empty grants every action.
    pub scope: Vec<String>,
    /// Limits carried into issued tokens.
    pub restrictions: Restrictions,
    /// Country whose rules govern the authority.
    pub jurisdiction: Option<String>,
    /// Kind of AI agent receiving the authority.
    pub ai_type: Option<String>,
    /// Capabilities the agent declared.
    pub capabilities: Vec<String>,
}

impl GrantRequest {
    /// A grant with no scope, restrictions or jurisdiction.
    #[must_use]
    pub fn new(
        principal: OwnerInfo,
        delegate: impl Into<String>,
        power_type: PowerType,
        validity: ValidityPeriod,
    ) -> Self {
        Self {
            principal,
            delegate: delegate.into(),
            power_type,
            validity,
            scope: Vec::new(),
            restrictions: Restrictions::default(),
            jurisdiction: None,
            ai_type: None,
            capabilities: Vec::new(),
        }
    }

    /// Limit the grant to `scope`.
    #[must_use]
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope.extend(scope.into_iter().map(Into::into));
        self
    }

    /// Attach restrictions.
    #[must_use]
    pub fn with_restrictions(mut self, restrictions: Restrictions) -> Self {
        self.restrictions = restrictions;
        self
    }

    /// Govern the grant by `country`'s rules.
    #[must_use]
    pub fn with_jurisdiction(mut self, country: impl Into<String>) -> Self {
        self.jurisdiction = Some(country.into());
        self
    }

    /// Record the kind of agent.
    #[must_use]
    pub fn with_ai_type(mut self, ai_type: impl Into<String>) -> Self {
        self.ai_type = Some(ai_type.into());
        self
    }

    /// Record a declared capability.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

/// The result of a successful grant.
#[derive(Debug, Clone)]
pub struct Grant {
    /// The stored delegation.
    pub delegation: Delegation,
    /// Access token carrying the power of attorney.
    pub access: Token,
    /// Refresh token for the same delegation.
    pub refresh: Token,
}

/// An attempt to use delegated authority.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Presented token value.
    pub token: String,
    /// Resource acted on.
    pub resource: String,
    /// The action, with the details compliance rules need.
    pub action: ActionRequest,
    /// Caller-supplied attributes for policy evaluation.
    pub attributes: ClaimMap,
}

impl AuthorizeRequest {
    /// A request to perform `action` on `resource`.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            resource: resource.into(),
            action: ActionRequest::new(action),
            attributes: ClaimMap::new(),
        }
    }

    /// Replace the action details.
    #[must_use]
    pub fn with_action(mut self, action: ActionRequest) -> Self {
        self.action = action;
        self
    }

    /// Add a policy attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A permitted request.
#[derive(Debug, Clone)]
pub struct Authorization {
    /// The token that authorized it.
    pub token_id: TokenId,
    /// Who acted.
    pub subject: String,
    /// The delegation exercised, if the token carries one.
    pub delegation_id: Option<DelegationId>,
    /// The permit decision.
    pub decision: Decision,
}
