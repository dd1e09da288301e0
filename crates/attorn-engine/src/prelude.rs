//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attorn_engine::prelude::*;` to import all essential types.

// Errors
pub use crate::{EngineError, EngineResult};

// Engine
pub use crate::{Engine, EngineBuilder};

// Requests
pub use crate::{AuthorizeRequest, Authorization, Grant, GrantRequest};

// Admission
pub use crate::{RateLimitConfig, RateLimiter};
