//! Attorn Telemetry - logging setup and request spans.
//!
//! This crate provides:
//! - [`LogConfig`] and [`setup_logging`] over `tracing-subscriber`, with
//!   pretty, compact and JSON output
//! - [`RequestContext`] for correlating the steps of one engine request
//!
//! # Example
//!
//! ```rust,no_run
//! use attorn_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), attorn_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("attorn_delegation=debug");
//! setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("engine").with_operation("authorize");
//! let span = ctx.span();
//! let _guard = span.enter();
//! tracing::info!("authorizing");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{RequestContext, RequestGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
