//! Attorn Engine - delegated authority from grant to enforcement.
//!
//! This crate provides:
//! - [`Engine`]: grants, authorization, refresh and revocation
//! - [`EngineBuilder`]: assembly from configuration and injected collaborators
//! - [`RateLimiter`]: per-subject token buckets and a global in-flight cap
//! - [`bridge`]: conversion of configuration sections into component settings
//!
//! # Architecture
//!
//! The engine chains:
//! - Token validation, directly against the store or through the two-tier
//!   distributed cache
//! - The delegation graph, which must still hold the grant
//! - The policy decision point
//! - The compliance layer
//!
//! Revoking a delegation revokes every token issued under it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use attorn_config::Config;
//! use attorn_core::PowerType;
//! use attorn_delegation::{OwnerInfo, StaticRegistry, ValidityPeriod};
//! use attorn_engine::{AuthorizeRequest, Engine, GrantRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_file(std::path::Path::new("attorn.toml"))?;
//! let engine = Engine::builder(config)
//!     .with_registry(Arc::new(StaticRegistry::with_owners(["acme-corp"])))
//!     .build()?;
//! engine.start();
//!
//! let grant = engine
//!     .grant(
//!         GrantRequest::new(
//!             OwnerInfo::new("acme-corp", "organization"),
//!             "agent-7",
//!             PowerType::financial_transactions(),
//!             ValidityPeriod::starting(chrono::Utc::now(), chrono::Duration::days(30)),
//!         )
//!         .with_scope(["pay_invoice"]),
//!     )
//!     .await?;
//!
//! let request = AuthorizeRequest::new(&grant.access.value, "invoice/42", "pay_invoice");
//! let authorization = engine.authorize(&request).await?;
//! assert_eq!(authorization.subject, "agent-7");
//!
//! engine.revoke_delegation(&grant.delegation.id, "mandate ended").await?;
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bridge;
pub mod prelude;

mod builder;
mod engine;
mod error;
mod rate_limit;
mod request;
mod validator;


pub use builder::EngineBuilder;
pub use engine::{
    ATTR_AI_TYPE, ATTR_AMOUNT, ATTR_DELEGATION, ATTR_JURISDICTION, ATTR_POWER_TYPE,
    ATTR_PRINCIPAL, ATTR_SCOPES, Engine,
};
pub use error::{EngineError, EngineResult};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use request::{AuthorizeRequest, Authorization, Grant, GrantRequest};
