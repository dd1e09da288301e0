//! Core error types.

use thiserror::Error;

/// Errors raised while parsing or checking core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A time of day was not in `HH:MM` form.
    #[error("invalid time of day: {value}")]
    InvalidTimeOfDay {
        /// The rejected input.
        value: String,
    },

    /// A timezone was not `UTC` or a fixed `+HH:MM` / `-HH:MM` offset.
    #[error("invalid timezone: {value}")]
    InvalidTimezone {
        /// The rejected input.
        value: String,
    },

    /// A weekday index was outside `0..=6`.
    #[error("invalid weekday {day}: expected 0 (Sunday) through 6 (Saturday)")]
    InvalidWeekday {
        /// The rejected index.
        day: u8,
    },

    /// An identifier did not carry the expected prefix.
    #[error("invalid identifier {value}: expected prefix {prefix}")]
    InvalidIdentifier {
        /// The rejected input.
        value: String,
        /// The prefix that was expected.
        prefix: &'static str,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
