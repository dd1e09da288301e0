//! Policies, rules, conditions and decisions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use attorn_core::{ClaimMap, ClaimValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// Wildcard pattern matching any identifier.
pub const WILDCARD: &str = "*";

/// Outcome of a rule or of a whole evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Allow the action.
    Permit,
    /// Refuse the action.
    Deny,
}

impl Effect {
    /// Whether this is [`Effect::Permit`].
    #[must_use]
    pub fn is_permit(self) -> bool {
        self == Self::Permit
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permit => f.write_str("permit"),
            Self::Deny => f.write_str("deny"),
        }
    }
}

/// Evaluates a named custom condition.
pub trait ConditionEvaluator: Send + Sync + fmt::Debug {
    /// Whether the condition holds for `attributes`.
    ///
    /// # Errors
    ///
    /// Returns an error when the attributes do not allow a decision; the
    /// enclosing rule is then dropped.
    fn evaluate(&self, attributes: &ClaimMap) -> PolicyResult<bool>;
}

/// Registered custom conditions by name.
pub type ConditionRegistry = HashMap<String, Arc<dyn ConditionEvaluator>>;

/// When a rule applies.
///
/// Comparisons against a missing attribute, or one of the wrong type, are
/// errors rather than `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Always applies.
    Always,
    /// The attribute exists.
    Present {
        /// Attribute name.
        attribute: String,
    },
    /// The attribute equals `value`.
    Equals {
        /// Attribute name.
        attribute: String,
        /// Expected value.
        value: ClaimValue,
    },
    /// The attribute equals one of `values`.
    OneOf {
        /// Attribute name.
        attribute: String,
        /// Accepted values.
        values: Vec<ClaimValue>,
    },
    /// The attribute is a list containing `value`.
    Contains {
        /// Attribute name.
        attribute: String,
        /// Required item.
        value: ClaimValue,
    },
    /// The numeric attribute is at most `limit`.
    AtMost {
        /// Attribute name.
        attribute: String,
        /// Upper bound, inclusive.
        limit: f64,
    },
    /// The numeric attribute is at least `limit`.
    AtLeast {
        /// Attribute name.
        attribute: String,
        /// Lower bound, inclusive.
        limit: f64,
    },
    /// Every nested condition holds.
    All {
        /// Nested conditions.
        conditions: Vec<Condition>,
    },
    /// Some nested condition holds.
    Any {
        /// Nested conditions.
        conditions: Vec<Condition>,
    },
    /// The nested condition does not hold.
    Not {
        /// Nested condition.
        condition: Box<Condition>,
    },
    /// A registered [`ConditionEvaluator`].
    Custom {
        /// Registered name.
        name: String,
    },
}

impl Condition {
    /// `attribute == value`.
    #[must_use]
    pub fn equals(attribute: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        Self::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// `attribute` exists.
    #[must_use]
    pub fn present(attribute: impl Into<String>) -> Self {
        Self::Present {
            attribute: attribute.into(),
        }
    }

    /// `attribute <= limit`.
    #[must_use]
    pub fn at_most(attribute: impl Into<String>, limit: f64) -> Self {
        Self::AtMost {
            attribute: attribute.into(),
            limit,
        }
    }

    /// Evaluate against `attributes`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Condition`] when an attribute is missing or
    /// mistyped, or a custom condition is unknown or fails.
    pub fn evaluate(&self, attributes: &ClaimMap, custom: &ConditionRegistry) -> PolicyResult<bool> {
        match self {
            Self::Always => Ok(true),
            Self::Present { attribute } => Ok(attributes.contains_key(attribute)),
            Self::Equals { attribute, value } => Ok(lookup(attributes, attribute)? == value),
            Self::OneOf { attribute, values } => {
                let actual = lookup(attributes, attribute)?;
                Ok(values.iter().any(|v| v == actual))
            },
            Self::Contains { attribute, value } => {
                let actual = lookup(attributes, attribute)?;
                let items = actual.as_list().ok_or_else(|| {
                    PolicyError::condition(format!(
                        "attribute {attribute} is {}, not a list",
                        actual.type_name()
                    ))
                })?;
                Ok(items.contains(value))
            },
            Self::AtMost { attribute, limit } => Ok(number(attributes, attribute)? <= *limit),
            Self::AtLeast { attribute, limit } => Ok(number(attributes, attribute)? >= *limit),
            Self::All { conditions } => {
                for condition in conditions {
                    if !condition.evaluate(attributes, custom)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            },
            Self::Any { conditions } => {
                for condition in conditions {
                    if condition.evaluate(attributes, custom)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            },
            Self::Not { condition } => Ok(!condition.evaluate(attributes, custom)?),
            Self::Custom { name } => custom
                .get(name)
                .ok_or_else(|| PolicyError::condition(format!("unknown custom condition {name}")))?
                .evaluate(attributes),
        }
    }
}

fn lookup<'a>(attributes: &'a ClaimMap, name: &str) -> PolicyResult<&'a ClaimValue> {
    attributes
        .get(name)
        .ok_or_else(|| PolicyError::condition(format!("attribute {name} missing")))
}

fn number(attributes: &ClaimMap, name: &str) -> PolicyResult<f64> {
    let value = lookup(attributes, name)?;
    value.as_float().ok_or_else(|| {
        PolicyError::condition(format!("attribute {name} is {}, not a number", value.type_name()))
    })
}

/// A condition with an effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Identifier, unique within its policy.
    pub id: String,
    /// When the rule applies.
    pub condition: Condition,
    /// What it decides.
    pub effect: Effect,
    /// Higher runs first within a policy.
    #[serde(default)]
    pub priority: i32,
}

impl Rule {
    /// A rule that always applies.
    #[must_use]
    pub fn new(id: impl Into<String>, effect: Effect) -> Self {
        Self {
            id: id.into(),
            condition: Condition::Always,
            effect,
            priority: 0,
        }
    }

    /// A permitting rule.
    #[must_use]
    pub fn permit(id: impl Into<String>) -> Self {
        Self::new(id, Effect::Permit)
    }

    /// A denying rule.
    #[must_use]
    pub fn deny(id: impl Into<String>) -> Self {
        Self::new(id, Effect::Deny)
    }

    /// Apply only when `condition` holds.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Rules scoped to subjects, resources and actions by pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Subject pattern: an exact ID or `*`.
    #[serde(default = "wildcard")]
    pub subject: String,
    /// Resource pattern: an exact ID, `*`, or `prefix/*`.
    #[serde(default = "wildcard")]
    pub resource: String,
    /// Action pattern: an exact ID or `*`.
    #[serde(default = "wildcard")]
    pub action: String,
    /// Rules, evaluated highest priority first.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn wildcard() -> String {
    WILDCARD.to_string()
}

impl Policy {
    /// A policy matching every request, with no rules.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            subject: wildcard(),
            resource: wildcard(),
            action: wildcard(),
            rules: Vec::new(),
        }
    }

    /// Restrict to a subject pattern.
    #[must_use]
    pub fn subject(mut self, pattern: impl Into<String>) -> Self {
        self.subject = pattern.into();
        self
    }

    /// Restrict to a resource pattern.
    #[must_use]
    pub fn resource(mut self, pattern: impl Into<String>) -> Self {
        self.resource = pattern.into();
        self
    }

    /// Restrict to an action pattern.
    #[must_use]
    pub fn action(mut self, pattern: impl Into<String>) -> Self {
        self.action = pattern.into();
        self
    }

    /// Add a rule.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Whether the policy applies to the request triple.
    #[must_use]
    pub fn applies_to(&self, subject: &str, resource: &str, action: &str) -> bool {
        id_matches(&self.subject, subject)
            && resource_matches(&self.resource, resource)
            && id_matches(&self.action, action)
    }

    /// Rules in evaluation order. Ties keep declaration order.
    pub(crate) fn ordered_rules(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
        rules
    }

    /// Reject empty IDs and duplicate rule IDs.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPolicy`].
    pub fn check(&self) -> PolicyResult<()> {
        let invalid = |reason: String| PolicyError::InvalidPolicy {
            policy_id: self.id.clone(),
            reason,
        };
        if self.id.is_empty() {
            return Err(invalid("policy id is empty".into()));
        }
        for pattern in [&self.subject, &self.resource, &self.action] {
            if pattern.is_empty() {
                return Err(invalid("pattern is empty".into()));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(invalid(format!("duplicate rule id {}", rule.id)));
            }
        }
        Ok(())
    }
}

/// Exact match or `*`.
#[must_use]
pub fn id_matches(pattern: &str, value: &str) -> bool {
    pattern == WILDCARD || pattern == value
}

/// Exact match, `*`, or `prefix/*` for anything under `prefix/`.
#[must_use]
pub fn resource_matches(pattern: &str, value: &str) -> bool {
    if id_matches(pattern, value) {
        return true;
    }
    pattern
        .strip_suffix(WILDCARD)
        .filter(|prefix| prefix.ends_with('/'))
        .is_some_and(|prefix| value.len() > prefix.len() && value.starts_with(prefix))
}

/// A request to authorize.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Who acts.
    pub subject: String,
    /// On what.
    pub resource: String,
    /// Doing what.
    pub action: String,
    /// Caller-supplied attributes, e.g. an amount.
    #[serde(default)]
    pub attributes: ClaimMap,
}

impl AccessRequest {
    /// A request with no extra attributes.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
            attributes: ClaimMap::new(),
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// The outcome of one rule, or the reduced outcome of an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Permit or deny.
    pub effect: Effect,
    /// Who acts.
    pub subject: String,
    /// On what.
    pub resource: String,
    /// Doing what.
    pub action: String,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Context the decision was made in.
    #[serde(default)]
    pub attributes: ClaimMap,
    /// Deciding policy, when one rule decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    /// Deciding rule, when one rule decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl Decision {
    /// Whether the effect is permit.
    #[must_use]
    pub fn is_permit(&self) -> bool {
        self.effect.is_permit()
    }
}
