//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attorn_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Identifiers
pub use crate::{AttestationId, DelegationId, PowerType, TokenId};

// Claims
pub use crate::{ClaimMap, ClaimValue};

// Restrictions
pub use crate::{Restrictions, TimeConstraints, TimeOfDay, TimeWindow, UtcOffset, ValueLimits};

// Time
pub use crate::{Clock, ManualClock, SystemClock};
