//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attorn_compliance::prelude::*;` to import all essential types.

// Errors
pub use crate::{ComplianceError, ComplianceResult};

// Checking
pub use crate::{ActionRequest, ComplianceChecker};

// Jurisdictions
pub use crate::{Approval, ApprovalLevel, JurisdictionRegistry, JurisdictionRules};

// Events
pub use crate::{ComplianceEvent, ComplianceSink, ComplianceStats};
