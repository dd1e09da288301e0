//! The policy decision point.
//!
//! # Authorization Order
//!
//! 1. Gather attributes from every data source, through the [`ContextCache`]
//! 2. Enrich them with the mapping rules
//! 3. Check required attributes
//! 4. Evaluate each rule of each matching policy into a decision
//! 5. Reduce the decisions with the combining algorithm, or fall back to the
//!    default effect
//! 6. Record the final decision in the [`DecisionLog`]
//! 7. Run the enforcement handlers

use std::sync::Arc;

use attorn_core::{ClaimMap, ClaimValue, Clock, SystemClock};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cache::ContextCache;
use crate::combinator::CombiningAlgorithm;
use crate::enforcement::{DecisionLog, EnforcementHandler, MemoryDecisionLog};
use crate::enrichment::{MappingRule, enrich};
use crate::error::{PolicyError, PolicyResult};
use crate::model::{AccessRequest, ConditionEvaluator, ConditionRegistry, Decision, Effect, Policy};
use crate::source::DataSource;

/// Evaluates policies against requests.
#[derive(Debug)]
pub struct PolicyDecisionPoint {
    policies: Vec<Policy>,
    algorithm: CombiningAlgorithm,
    default_effect: Effect,
    sources: Vec<Arc<dyn DataSource>>,
    cache: ContextCache,
    mapping_rules: Vec<MappingRule>,
    required_attributes: Vec<String>,
    conditions: ConditionRegistry,
    log: Arc<dyn DecisionLog>,
    handlers: Vec<Arc<dyn EnforcementHandler>>,
    clock: Arc<dyn Clock>,
}

impl Default for PolicyDecisionPoint {
    fn default() -> Self {
        Self::new(CombiningAlgorithm::default())
    }
}

impl PolicyDecisionPoint {
    /// An empty decision point that denies by default.
    #[must_use]
    pub fn new(algorithm: CombiningAlgorithm) -> Self {
        Self {
            policies: Vec::new(),
            algorithm,
            default_effect: Effect::Deny,
            sources: Vec::new(),
            cache: ContextCache::default(),
            mapping_rules: Vec::new(),
            required_attributes: Vec::new(),
            conditions: ConditionRegistry::new(),
            log: Arc::new(MemoryDecisionLog::default()),
            handlers: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Effect when no rule applies.
    #[must_use]
    pub fn with_default_effect(mut self, effect: Effect) -> Self {
        self.default_effect = effect;
        self
    }

    /// Add a policy after checking it.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPolicy`] for a malformed policy or a
    /// duplicate policy ID.
    pub fn add_policy(&mut self, policy: Policy) -> PolicyResult<()> {
        policy.check()?;
        if self.policies.iter().any(|p| p.id == policy.id) {
            return Err(PolicyError::InvalidPolicy {
                policy_id: policy.id,
                reason: "duplicate policy id".into(),
            });
        }
        self.policies.push(policy);
        Ok(())
    }

    /// Builder form of [`add_policy`](Self::add_policy).
    ///
    /// # Errors
    ///
    /// As [`add_policy`](Self::add_policy).
    pub fn with_policy(mut self, policy: Policy) -> PolicyResult<Self> {
        self.add_policy(policy)?;
        Ok(self)
    }

    /// Consult `source` on every request.
    #[must_use]
    pub fn with_data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Replace the context cache.
    #[must_use]
    pub fn with_cache(mut self, cache: ContextCache) -> Self {
        self.cache = cache;
        self
    }

    /// Add an enrichment rule.
    #[must_use]
    pub fn with_mapping_rule(mut self, rule: MappingRule) -> Self {
        self.mapping_rules.push(rule);
        self
    }

    /// Fail authorization when `name` is absent after enrichment.
    #[must_use]
    pub fn require_attribute(mut self, name: impl Into<String>) -> Self {
        self.required_attributes.push(name.into());
        self
    }

    /// Register a custom condition.
    #[must_use]
    pub fn with_condition(
        mut self,
        name: impl Into<String>,
        evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        self.conditions.insert(name.into(), evaluator);
        self
    }

    /// Replace the decision log.
    #[must_use]
    pub fn with_decision_log(mut self, log: Arc<dyn DecisionLog>) -> Self {
        self.log = log;
        self
    }

    /// Add an enforcement handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn EnforcementHandler>) -> Self {
        self.handlers.push(handler);
        // Stable: equal priorities keep registration order.
        self.handlers
            .sort_by_key(|h| std::cmp::Reverse(h.priority()));
        self
    }

    /// Use `clock` for decision timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The configured policies.
    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// The combining algorithm.
    #[must_use]
    pub fn algorithm(&self) -> CombiningAlgorithm {
        self.algorithm
    }

    /// The context cache.
    #[must_use]
    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    /// Authorize a bare request triple.
    ///
    /// # Errors
    ///
    /// See [`authorize_request`](Self::authorize_request).
    pub async fn authorize(
        &self,
        subject: &str,
        resource: &str,
        action: &str,
    ) -> PolicyResult<Decision> {
        self.authorize_request(&AccessRequest::new(subject, resource, action))
            .await
    }

    /// Authorize a request. A deny is a successful evaluation; errors mean
    /// no decision could be reached or enforcement failed.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::DataSource`], [`PolicyError::MissingAttribute`]
    /// or [`PolicyError::Enforcement`].
    pub async fn authorize_request(&self, request: &AccessRequest) -> PolicyResult<Decision> {
        let now = self.clock.now();
        let mut attributes = self.gather(request, now).await?;
        enrich(&mut attributes, &self.mapping_rules, &self.conditions);

        if let Some(name) = self
            .required_attributes
            .iter()
            .find(|name| !attributes.contains_key(name.as_str()))
        {
            return Err(PolicyError::MissingAttribute { name: name.clone() });
        }

        let decisions = self.evaluate(request, &attributes, now);
        let (effect, policy_id, rule_id) = match self.algorithm.combine(&decisions) {
            Some((effect, index)) => {
                let decided = decisions.get(index);
                (
                    effect,
                    decided.and_then(|d| d.policy_id.clone()),
                    decided.and_then(|d| d.rule_id.clone()),
                )
            },
            None => (self.default_effect, None, None),
        };

        let decision = Decision {
            effect,
            subject: request.subject.clone(),
            resource: request.resource.clone(),
            action: request.action.clone(),
            timestamp: now,
            attributes,
            policy_id,
            rule_id,
        };
        self.log.record(&decision);

        for handler in &self.handlers {
            handler
                .enforce(&decision)
                .await
                .map_err(|e| PolicyError::Enforcement {
                    handler_id: handler.id().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(decision)
    }

    async fn gather(&self, request: &AccessRequest, now: DateTime<Utc>) -> PolicyResult<ClaimMap> {
        let mut attributes = request.attributes.clone();
        for source in &self.sources {
            let key = ContextCache::key(
                source.id(),
                &request.subject,
                &request.resource,
                &request.action,
            );
            let fetched = if let Some(cached) = self.cache.get(&key) {
                cached
            } else {
                let fetched = source
                    .fetch(&request.subject, &request.resource, &request.action)
                    .await
                    .inspect_err(|e| {
                        warn!(source = source.id(), error = %e, "data source failed");
                    })?;
                self.cache.insert(key, fetched.clone());
                fetched
            };
            attributes.extend(fetched);
        }
        attributes.insert("subject".into(), ClaimValue::from(request.subject.as_str()));
        attributes.insert("resource".into(), ClaimValue::from(request.resource.as_str()));
        attributes.insert("action".into(), ClaimValue::from(request.action.as_str()));
        attributes.insert("timestamp".into(), ClaimValue::Int(now.timestamp()));
        Ok(attributes)
    }

    fn evaluate(&self, request: &AccessRequest, attributes: &ClaimMap, now: DateTime<Utc>) -> Vec<Decision> {
        let mut decisions = Vec::new();
        for policy in &self.policies {
            if !policy.applies_to(&request.subject, &request.resource, &request.action) {
                continue;
            }
            for rule in policy.ordered_rules() {
                match rule.condition.evaluate(attributes, &self.conditions) {
                    Ok(true) => decisions.push(Decision {
                        effect: rule.effect,
                        subject: request.subject.clone(),
                        resource: request.resource.clone(),
                        action: request.action.clone(),
                        timestamp: now,
                        attributes: ClaimMap::new(),
                        policy_id: Some(policy.id.clone()),
                        rule_id: Some(rule.id.clone()),
                    }),
                    Ok(false) => {},
                    Err(e) => {
                        debug!(
                            policy_id = %policy.id,
                            rule_id = %rule.id,
                            error = %e,
                            "rule dropped"
                        );
                    },
                }
            }
        }
        decisions
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::model::{Condition, Rule};
    use crate::source::StaticSource;
    use async_trait::async_trait;

    fn pdp(algorithm: CombiningAlgorithm) -> PolicyDecisionPoint {
        PolicyDecisionPoint::new(algorithm)
            .with_policy(
                Policy::new("payments")
                    .resource("payments/*")
                    .rule(Rule::deny("over-limit").when(Condition::AtLeast {
                        attribute: "amount".into(),
                        limit: 10_000.0,
                    }))
                    .rule(Rule::permit("agents").when(Condition::equals("kind", "agent"))),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_deny_when_nothing_matches() {
        let pdp = pdp(CombiningAlgorithm::DenyOverrides);
        let decision = pdp.authorize("agent-7", "ledger/1", "read").await.unwrap();
        assert_eq!(decision.effect, Effect::Deny);
        assert!(decision.rule_id.is_none());
    }

    #[tokio::test]
    async fn test_combinators_over_rules() {
        let request = AccessRequest::new("agent-7", "payments/1", "initiate")
            .attribute("amount", 20_000i64)
            .attribute("kind", "agent");

        let deny = pdp(CombiningAlgorithm::DenyOverrides)
            .authorize_request(&request)
            .await
            .unwrap();
        assert_eq!(deny.effect, Effect::Deny);
        assert_eq!(deny.rule_id.as_deref(), Some("over-limit"));

        let permit = pdp(CombiningAlgorithm::PermitOverrides)
            .authorize_request(&request)
            .await
            .unwrap();
        assert_eq!(permit.effect, Effect::Permit);
        assert_eq!(permit.rule_id.as_deref(), Some("agents"));

        let first = pdp(CombiningAlgorithm::FirstApplicable)
            .authorize_request(&request)
            .await
            .unwrap();
        assert_eq!(first.effect, Effect::Deny);
    }

    #[tokio::test]
    async fn test_condition_error_drops_rule_and_falls_to_default() {
        let pdp = PolicyDecisionPoint::default()
            .with_policy(
                Policy::new("p").rule(Rule::permit("needs-amount").when(Condition::at_most("amount", 5.0))),
            )
            .unwrap();
        let decision = pdp.authorize("a", "r", "x").await.unwrap();
        assert_eq!(decision.effect, Effect::Deny);
    }

    #[tokio::test]
    async fn test_sources_cached_and_enriched() {
        #[derive(Debug, Default)]
        struct Counting(AtomicUsize);

        #[async_trait]
        impl DataSource for Counting {
            fn id(&self) -> &str {
                "counting"
            }
            async fn fetch(&self, _: &str, _: &str, _: &str) -> PolicyResult<ClaimMap> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(ClaimMap::from([("org.tier".to_string(), ClaimValue::from("gold"))]))
            }
        }

        let counting = Arc::new(Counting::default());
        let pdp = PolicyDecisionPoint::default()
            .with_data_source(counting.clone())
            .with_mapping_rule(MappingRule::new("tier").map("org.tier", "tier"))
            .require_attribute("tier")
            .with_policy(Policy::new("gold").rule(Rule::permit("gold").when(Condition::equals("tier", "gold"))))
            .unwrap();

        for _ in 0..3 {
            assert!(pdp.authorize("a", "r", "x").await.unwrap().is_permit());
        }
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
        assert_eq!(pdp.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_required_attribute() {
        let pdp = PolicyDecisionPoint::default()
            .with_data_source(Arc::new(StaticSource::new("static").with("a", 1i64)))
            .require_attribute("jurisdiction");
        assert_eq!(
            pdp.authorize("s", "r", "x").await.unwrap_err(),
            PolicyError::MissingAttribute {
                name: "jurisdiction".into()
            }
        );
    }

    #[tokio::test]
    async fn test_source_failure_fails_request() {
        #[derive(Debug)]
        struct Down;

        #[async_trait]
        impl DataSource for Down {
            fn id(&self) -> &str {
                "down"
            }
            async fn fetch(&self, _: &str, _: &str, _: &str) -> PolicyResult<ClaimMap> {
                Err(PolicyError::DataSource {
                    source_id: "down".into(),
                    reason: "timeout".into(),
                })
            }
        }

        let pdp = PolicyDecisionPoint::default()
            .with_default_effect(Effect::Permit)
            .with_data_source(Arc::new(Down));
        assert!(pdp.authorize("s", "r", "x").await.is_err());
    }

    #[derive(Debug)]
    struct Recording {
        id: &'static str,
        priority: i32,
        fail: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EnforcementHandler for Recording {
        fn id(&self) -> &str {
            self.id
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        async fn enforce(&self, _decision: &Decision) -> PolicyResult<()> {
            self.calls.lock().unwrap().push(self.id);
            if self.fail {
                Err(PolicyError::Unimplemented("refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_priority_order_and_abort() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let handler = |id, priority, fail| {
            Arc::new(Recording {
                id,
                priority,
                fail,
                calls: Arc::clone(&calls),
            })
        };
        let log = Arc::new(MemoryDecisionLog::default());
        let pdp = PolicyDecisionPoint::default()
            .with_decision_log(log.clone())
            .with_handler(handler("low", 1, false))
            .with_handler(handler("failing", 5, true))
            .with_handler(handler("high", 10, false));

        let err = pdp.authorize("s", "r", "x").await.unwrap_err();
        assert_eq!(
            err,
            PolicyError::Enforcement {
                handler_id: "failing".into(),
                reason: "not implemented: refused".into()
            }
        );
        assert_eq!(*calls.lock().unwrap(), vec!["high", "failing"]);
        // Logged before enforcement ran.
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_duplicate_policy_rejected() {
        let mut pdp = PolicyDecisionPoint::default();
        pdp.add_policy(Policy::new("p")).unwrap();
        assert!(pdp.add_policy(Policy::new("p")).is_err());
    }
}
