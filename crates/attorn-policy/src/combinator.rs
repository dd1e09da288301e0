//! Reduction of per-rule decisions to one effect.

use serde::{Deserialize, Serialize};

use crate::model::{Decision, Effect};

/// How collected decisions reduce to one effect.
///
/// Every algorithm returns `None` for an empty set so the caller applies
/// its default effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombiningAlgorithm {
    /// Any deny wins, then any permit.
    #[default]
    DenyOverrides,
    /// Any permit wins, then any deny.
    PermitOverrides,
    /// The first decision wins.
    FirstApplicable,
}

impl CombiningAlgorithm {
    /// Reduce effects in collection order.
    pub fn combine_effects<I>(self, effects: I) -> Option<Effect>
    where
        I: IntoIterator<Item = Effect>,
    {
        let mut effects = effects.into_iter();
        match self {
            Self::FirstApplicable => effects.next(),
            Self::DenyOverrides => overriding(effects, Effect::Deny),
            Self::PermitOverrides => overriding(effects, Effect::Permit),
        }
    }

    /// Reduce decisions, returning the index of the deciding one.
    ///
    /// For the overriding algorithms that is the first decision carrying the
    /// winning effect.
    #[must_use]
    pub fn combine(self, decisions: &[Decision]) -> Option<(Effect, usize)> {
        let effect = self.combine_effects(decisions.iter().map(|d| d.effect))?;
        let index = decisions.iter().position(|d| d.effect == effect)?;
        Some((effect, index))
    }
}

fn overriding(effects: impl Iterator<Item = Effect>, winner: Effect) -> Option<Effect> {
    let mut seen = None;
    for effect in effects {
        if effect == winner {
            return Some(winner);
        }
        seen = Some(effect);
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use Effect::{Deny, Permit};

    #[test]
    fn test_deny_then_permit() {
        let effects = [Deny, Permit];
        assert_eq!(
            CombiningAlgorithm::DenyOverrides.combine_effects(effects),
            Some(Deny)
        );
        assert_eq!(
            CombiningAlgorithm::PermitOverrides.combine_effects(effects),
            Some(Permit)
        );
        assert_eq!(
            CombiningAlgorithm::FirstApplicable.combine_effects(effects),
            Some(Deny)
        );
    }

    #[test]
    fn test_empty_set_has_no_effect() {
        for algorithm in [
            CombiningAlgorithm::DenyOverrides,
            CombiningAlgorithm::PermitOverrides,
            CombiningAlgorithm::FirstApplicable,
        ] {
            assert_eq!(algorithm.combine_effects([]), None);
        }
    }

    fn effect() -> impl Strategy<Value = Effect> {
        prop_oneof![Just(Permit), Just(Deny)]
    }

    proptest! {
        #[test]
        fn prop_deny_overrides(effects in proptest::collection::vec(effect(), 0..16)) {
            let expected = if effects.contains(&Deny) {
                Some(Deny)
            } else if effects.contains(&Permit) {
                Some(Permit)
            } else {
                None
            };
            prop_assert_eq!(CombiningAlgorithm::DenyOverrides.combine_effects(effects), expected);
        }

        #[test]
        fn prop_permit_overrides(effects in proptest::collection::vec(effect(), 0..16)) {
            let expected = if effects.contains(&Permit) {
                Some(Permit)
            } else if effects.contains(&Deny) {
                Some(Deny)
            } else {
                None
            };
            prop_assert_eq!(CombiningAlgorithm::PermitOverrides.combine_effects(effects), expected);
        }

        #[test]
        fn prop_first_applicable(effects in proptest::collection::vec(effect(), 0..16)) {
            prop_assert_eq!(
                CombiningAlgorithm::FirstApplicable.combine_effects(effects.clone()),
                effects.first().copied()
            );
        }
    }
}
