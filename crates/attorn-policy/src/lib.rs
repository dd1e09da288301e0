//! Attorn Policy - the policy decision point.
//!
//! This crate provides:
//! - [`Policy`] and [`Rule`] definitions with typed [`Condition`]s
//! - [`CombiningAlgorithm`]: deny-overrides, permit-overrides and
//!   first-applicable
//! - [`DataSource`]s with an explicit [`ContextCache`], and
//!   [`MappingRule`] enrichment
//! - [`PolicyDecisionPoint`], which logs each decision to a [`DecisionLog`]
//!   and then runs the [`EnforcementHandler`]s
//!
//! Evaluation fails closed: a rule whose condition cannot be evaluated is
//! dropped, and an empty decision set takes the default effect, which is
//! deny unless configured otherwise.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use attorn_policy::{CombiningAlgorithm, Condition, Effect, Policy, PolicyDecisionPoint, Rule};
//!
//! let pdp = PolicyDecisionPoint::new(CombiningAlgorithm::DenyOverrides)
//!     .with_policy(
//!         Policy::new("agent-payments")
//!             .resource("payments/*")
//!             .rule(Rule::permit("small").when(Condition::at_most("amount", 1000.0))),
//!     )
//!     .unwrap();
//!
//! let decision = pdp.authorize("agent-7", "payments/42", "initiate").await.unwrap();
//! // No amount attribute: the rule is dropped and the default applies.
//! assert_eq!(decision.effect, Effect::Deny);
//! # });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod cache;
mod combinator;
mod enforcement;
mod enrichment;
mod error;
mod model;
mod pdp;
mod source;

pub use cache::{ContextCache, DEFAULT_CONTEXT_CAPACITY, DEFAULT_CONTEXT_TTL};
pub use combinator::CombiningAlgorithm;
pub use enforcement::{DecisionLog, EnforcementHandler, MemoryDecisionLog};
pub use enrichment::MappingRule;
pub use error::{PolicyError, PolicyResult};
pub use model::{
    AccessRequest, Condition, ConditionEvaluator, ConditionRegistry, Decision, Effect, Policy,
    Rule, WILDCARD, id_matches, resource_matches,
};
pub use pdp::PolicyDecisionPoint;
pub use source::{DataSource, PRINCIPAL_REGISTERED, RegistrySource, StaticSource};
