//! Typed claim values.
//!
//! Token claims and policy context attributes are carried as [`ClaimValue`]
//! so readers match on a variant instead of casting an untyped value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Map of claim or attribute names to values, ordered for stable output.
pub type ClaimMap = BTreeMap<String, ClaimValue>;

/// A single claim value.
///
/// Serializes as the plain JSON value. Integers are tried before floats so
/// `1` round-trips as [`ClaimValue::Int`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    List(Vec<ClaimValue>),
}

impl ClaimValue {
    /// Name of the variant, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
        }
    }

    /// The string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer value, if this is an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The numeric value. Integers widen to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The boolean value, if this is a bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[ClaimValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether `needle` equals this value or, for lists, one of its items.
    #[must_use]
    pub fn contains(&self, needle: &ClaimValue) -> bool {
        match self {
            Self::List(items) => items.iter().any(|item| item == needle),
            other => other == needle,
        }
    }
}

impl fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            },
        }
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ClaimValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<ClaimValue>> From<Vec<T>> for ClaimValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shapes() {
        let value: ClaimValue = serde_json::from_str("1").unwrap();
        assert_eq!(value, ClaimValue::Int(1));

        let value: ClaimValue = serde_json::from_str("1.5").unwrap();
        assert_eq!(value, ClaimValue::Float(1.5));

        let value: ClaimValue = serde_json::from_str(r#"["a", true]"#).unwrap();
        assert_eq!(
            value,
            ClaimValue::List(vec![ClaimValue::from("a"), ClaimValue::Bool(true)])
        );
    }

    #[test]
    fn test_accessors_do_not_coerce_across_kinds() {
        let value = ClaimValue::from("42");
        assert_eq!(value.as_int(), None);
        assert_eq!(value.as_str(), Some("42"));
        assert_eq!(ClaimValue::Int(3).as_float(), Some(3.0));
        assert_eq!(ClaimValue::Float(3.0).as_int(), None);
    }

    #[test]
    fn test_contains() {
        let list = ClaimValue::from(vec!["eu", "us"]);
        assert!(list.contains(&ClaimValue::from("eu")));
        assert!(!list.contains(&ClaimValue::from("uk")));
        assert!(ClaimValue::from("eu").contains(&ClaimValue::from("eu")));
    }

    #[test]
    fn test_display() {
        let list = ClaimValue::from(vec![1_i64, 2]);
        assert_eq!(list.to_string(), "[1, 2]");
    }
}
