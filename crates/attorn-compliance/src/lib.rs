//! Attorn Compliance - enforcement on top of policy decisions.
//!
//! This crate provides:
//! - [`ComplianceChecker`], which applies the restrictions carried in a
//!   token's power-of-attorney block and the rules of its jurisdiction
//! - [`JurisdictionRules`] with single, dual and multi-level
//!   [`ApprovalLevel`]s
//! - A [`SpendLedger`] enforcing daily value caps
//! - [`ComplianceEvent`]s delivered to a fire-and-forget [`ComplianceSink`]
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use attorn_compliance::{ActionRequest, ComplianceChecker, JurisdictionRegistry, MemoryComplianceSink};
//! use attorn_crypto::KeyPair;
//! use attorn_tokens::{TokenIssuer, TokenRequest};
//!
//! let sink = Arc::new(MemoryComplianceSink::new());
//! let checker = ComplianceChecker::new(JurisdictionRegistry::new(), sink.clone());
//!
//! let token = TokenIssuer::new(Arc::new(KeyPair::generate()), "issuer")
//!     .issue(TokenRequest::access("agent-7"))
//!     .unwrap();
//! checker.check(&token, &ActionRequest::new("read_statement")).unwrap();
//! assert_eq!(sink.stats().compliant, 1);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod checker;
mod error;
mod jurisdiction;
mod ledger;
mod sink;

pub use checker::{ActionRequest, ComplianceChecker};
pub use error::{ComplianceError, ComplianceResult};
pub use jurisdiction::{
    Approval, ApprovalLevel, DEFAULT_APPROVAL_DURATION, JurisdictionRegistry, JurisdictionRules,
};
pub use ledger::SpendLedger;
pub use sink::{ChannelSink, ComplianceEvent, ComplianceSink, ComplianceStats, MemoryComplianceSink};
