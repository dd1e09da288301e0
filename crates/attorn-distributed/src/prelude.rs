//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attorn_distributed::prelude::*;` to import all essential types.

// Errors
pub use crate::{DistributedError, DistributedResult, RevocationStep};

// Validation
pub use crate::{DistributedConfig, DistributedValidator, ValidationRecord};

// Tiers
pub use crate::{KvSharedCache, LocalCache, SharedCache, StoreAuthenticator, TokenAuthenticator};
