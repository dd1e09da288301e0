//! Attorn Test - Shared test utilities for the Attorn engine.
//!
//! This crate provides mock collaborators and fixtures that can be used
//! across multiple Attorn crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! attorn-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! use attorn_test::prelude::*;
//!
//! #[tokio::test]
//! async fn test_grant() {
//!     let engine = test_engine_builder().build().unwrap();
//!     let grant = engine.grant(test_grant_request()).await.unwrap();
//!     assert_eq!(grant.access.subject, TEST_DELEGATE);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
