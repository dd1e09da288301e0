//! Context enrichment through prioritized mapping rules.

use std::collections::BTreeMap;

use attorn_core::ClaimMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Condition, ConditionRegistry};

/// Copies attributes to new names when its condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Rule name, for logs.
    pub name: String,
    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,
    /// When to apply. `None` always applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Source attribute to destination attribute.
    pub mapping: BTreeMap<String, String>,
}

impl MappingRule {
    /// An unconditional rule with no mappings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            condition: None,
            mapping: BTreeMap::new(),
        }
    }

    /// Copy `from` to `to`.
    #[must_use]
    pub fn map(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.mapping.insert(from.into(), to.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Apply only when `condition` holds.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Apply `rules` to `attributes`, highest priority first.
///
/// Each rule reads the context as enriched so far. A rule whose condition
/// fails to evaluate is skipped.
pub(crate) fn enrich(attributes: &mut ClaimMap, rules: &[MappingRule], custom: &ConditionRegistry) {
    let mut ordered: Vec<&MappingRule> = rules.iter().collect();
    ordered.sort_by_key(|r| std::cmp::Reverse(r.priority));

    for rule in ordered {
        if let Some(condition) = &rule.condition {
            match condition.evaluate(attributes, custom) {
                Ok(true) => {},
                Ok(false) => continue,
                Err(e) => {
                    debug!(rule = %rule.name, error = %e, "mapping rule skipped");
                    continue;
                },
            }
        }
        let copies: Vec<(String, _)> = rule
            .mapping
            .iter()
            .filter_map(|(from, to)| attributes.get(from).map(|v| (to.clone(), v.clone())))
            .collect();
        attributes.extend(copies);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attorn_core::ClaimValue;

    #[test]
    fn test_priority_and_chaining() {
        let mut attributes = ClaimMap::from([("org.country".to_string(), ClaimValue::from("DE"))]);
        let rules = vec![
            MappingRule::new("late").map("jurisdiction", "region.code"),
            MappingRule::new("early")
                .priority(10)
                .map("org.country", "jurisdiction"),
        ];
        enrich(&mut attributes, &rules, &ConditionRegistry::new());
        assert_eq!(attributes["region.code"], ClaimValue::from("DE"));
    }

    #[test]
    fn test_conditional_rule() {
        let mut attributes = ClaimMap::from([
            ("tier".to_string(), ClaimValue::from("gold")),
            ("limit.gold".to_string(), ClaimValue::Int(5000)),
        ]);
        let rules = vec![
            MappingRule::new("gold")
                .when(Condition::equals("tier", "gold"))
                .map("limit.gold", "limit"),
            MappingRule::new("broken")
                .when(Condition::equals("missing", true))
                .map("tier", "never"),
        ];
        enrich(&mut attributes, &rules, &ConditionRegistry::new());
        assert_eq!(attributes["limit"], ClaimValue::Int(5000));
        assert!(!attributes.contains_key("never"));
    }
}
