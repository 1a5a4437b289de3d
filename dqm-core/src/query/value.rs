//! Values that travel to the database as bound parameters.

use crate::{DqmError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A scalar bound to a statement placeholder.
///
/// Bound values are never rendered into statement text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// Double precision float
    Float(f64),
    /// Text
    Text(String),
}

impl BoundValue {
    /// Whether this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is a text value.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl TryFrom<&JsonValue> for BoundValue {
    type Error = DqmError;

    fn try_from(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(b) => Ok(Self::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(DqmError::configuration(format!(
                        "numeric value {} cannot be bound",
                        n
                    )))
                }
            }
            JsonValue::String(s) => Ok(Self::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => Err(DqmError::configuration(
                "only scalar values can be bound as parameters",
            )),
        }
    }
}

impl From<&str> for BoundValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BoundValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for BoundValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for BoundValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for BoundValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(BoundValue::try_from(&json!(null)).ok(), Some(BoundValue::Null));
        assert_eq!(BoundValue::try_from(&json!(true)).ok(), Some(BoundValue::Bool(true)));
        assert_eq!(BoundValue::try_from(&json!(42)).ok(), Some(BoundValue::Int(42)));
        assert_eq!(BoundValue::try_from(&json!(2.5)).ok(), Some(BoundValue::Float(2.5)));
        assert_eq!(
            BoundValue::try_from(&json!("x'; DROP TABLE t; --")).ok(),
            Some(BoundValue::Text("x'; DROP TABLE t; --".to_string()))
        );
    }

    #[test]
    fn test_from_json_rejects_composites() {
        assert!(BoundValue::try_from(&json!([1, 2])).is_err());
        assert!(BoundValue::try_from(&json!({"a": 1})).is_err());
    }
}
