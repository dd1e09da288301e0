//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attorn_tokens::prelude::*;` to import all essential types.

// Errors
pub use crate::{TokenError, TokenResult, ValidationError};

// Model
pub use crate::{PowerOfAttorney, RevocationStatus, Token, TokenMetadata, TokenType};

// Issuance
pub use crate::{TokenIssuer, TokenPair, TokenRequest};

// Storage
pub use crate::{KvTokenStore, MemoryTokenStore, ScopeMatch, TokenFilter, TokenStore};

// Validation
pub use crate::{
    ClaimRequirement, ClaimRule, RevocationCheck, RevocationList, ValidationConfig,
    ValidationPipeline, ValidationStage,
};

// Background work
pub use crate::CleanupWorker;
