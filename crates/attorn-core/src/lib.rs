//! Attorn Core - Foundation types for the Attorn delegation engine.
//!
//! This crate provides:
//! - Identifier types for tokens, delegations and attestations
//! - The tagged [`ClaimValue`] used wherever claims or context attributes travel
//! - Restriction types (value limits, geography, time windows) and their matching
//! - A [`Clock`] abstraction so time-dependent checks are testable
//!
//! Every other crate in the workspace depends on these types rather than
//! redefining them.
//!
//! # Example
//!
//! ```
//! use attorn_core::{ClaimValue, DelegationId};
//!
//! let id = DelegationId::generate();
//! assert!(id.as_str().starts_with("del_"));
//!
//! let claim = ClaimValue::from(42_i64);
//! assert_eq!(claim.as_int(), Some(42));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod claim;
pub mod clock;
pub mod error;
pub mod restriction;
pub mod types;

pub use claim::{ClaimMap, ClaimValue};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use restriction::{
    Restrictions, TimeConstraints, TimeOfDay, TimeWindow, UtcOffset, ValueLimits,
};
pub use types::{AttestationId, DelegationId, PowerType, TokenId};
