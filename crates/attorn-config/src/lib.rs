#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Configuration for the Attorn engine.
//!
//! A single [`Config`] tree with one section per component. Every section
//! has production defaults, so only what differs needs to be written.
//!
//! # Usage
//!
//! ```rust,no_run
//! use attorn_config::Config;
//!
//! let config = Config::load_file(std::path::Path::new("attorn.toml")).unwrap();
//! println!("max chain depth: {}", config.delegation.max_chain_depth);
//! ```
//!
//! # Sources
//!
//! 1. **Environment** (`ATTORN_*`) overrides the file for the fields it names
//! 2. **File** (TOML)
//! 3. **Defaults**
//!
//! Validation runs last. A missing signing key or an inconsistent section is
//! fatal.
//!
//! # Design
//!
//! This crate has **no dependencies on other internal attorn crates**.
//! Conversion to domain types happens in the engine's bridge module.

/// `ATTORN_*` environment overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the text is malformed or fails
    /// validation.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        loader::from_toml_str(content)
    }

    /// Load a file with `ATTORN_*` overrides applied.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Validate this configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        validate::validate(self)
    }
}
