//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attorn_policy::prelude::*;` to import all essential types.

// Errors
pub use crate::{PolicyError, PolicyResult};

// Model
pub use crate::{AccessRequest, Condition, Decision, Effect, Policy, Rule};

// Evaluation
pub use crate::{CombiningAlgorithm, PolicyDecisionPoint};

// Context
pub use crate::{ContextCache, DataSource, MappingRule};

// Enforcement
pub use crate::{DecisionLog, EnforcementHandler};
