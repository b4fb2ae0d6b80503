//! Command argument values
//!
//! A parsed command argument as the host hands it to native code, plus the
//! `FromArg` conversion used by `CommandContext::get`.

use crate::error::{BridgeResult, NativeError};

/// A parsed command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Single word or quoted string
    String(String),
    /// Integer argument
    Integer(i64),
    /// Floating point argument
    Double(f64),
    /// Boolean argument
    Bool(bool),
    /// Greedy string split into words
    StringArray(Vec<String>),
}

impl ArgValue {
    /// Type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::String(_) => "string",
            ArgValue::Integer(_) => "integer",
            ArgValue::Double(_) => "double",
            ArgValue::Bool(_) => "bool",
            ArgValue::StringArray(_) => "string[]",
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<i64> for ArgValue {
    fn from(i: i64) -> Self {
        ArgValue::Integer(i)
    }
}

impl From<f64> for ArgValue {
    fn from(f: f64) -> Self {
        ArgValue::Double(f)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(v: Vec<String>) -> Self {
        ArgValue::StringArray(v)
    }
}

// ============================================================================
// Conversion
// ============================================================================

/// Convert an argument value into a Rust type.
pub trait FromArg: Sized {
    /// Convert, returning an error if the type doesn't match.
    fn from_arg(value: &ArgValue) -> BridgeResult<Self>;
}

fn mismatch(expected: &str, got: &ArgValue) -> NativeError {
    NativeError::TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
    }
}

impl FromArg for String {
    fn from_arg(value: &ArgValue) -> BridgeResult<Self> {
        match value {
            ArgValue::String(s) => Ok(s.clone()),
            ArgValue::StringArray(words) => Ok(words.join(" ")),
            other => Err(mismatch("string", other)),
        }
    }
}

impl FromArg for i64 {
    fn from_arg(value: &ArgValue) -> BridgeResult<Self> {
        match value {
            ArgValue::Integer(i) => Ok(*i),
            other => Err(mismatch("integer", other)),
        }
    }
}

impl FromArg for i32 {
    fn from_arg(value: &ArgValue) -> BridgeResult<Self> {
        let wide = i64::from_arg(value)?;
        i32::try_from(wide).map_err(|_| NativeError::TypeMismatch {
            expected: "i32".to_string(),
            got: format!("integer {}", wide),
        })
    }
}

impl FromArg for f64 {
    fn from_arg(value: &ArgValue) -> BridgeResult<Self> {
        match value {
            ArgValue::Double(f) => Ok(*f),
            ArgValue::Integer(i) => Ok(*i as f64),
            other => Err(mismatch("double", other)),
        }
    }
}

impl FromArg for bool {
    fn from_arg(value: &ArgValue) -> BridgeResult<Self> {
        match value {
            ArgValue::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromArg for Vec<String> {
    fn from_arg(value: &ArgValue) -> BridgeResult<Self> {
        match value {
            ArgValue::StringArray(words) => Ok(words.clone()),
            ArgValue::String(s) => Ok(vec![s.clone()]),
            other => Err(mismatch("string[]", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_arg_primitives() {
        assert_eq!(String::from_arg(&"hi".into()).unwrap(), "hi");
        assert_eq!(i64::from_arg(&42i64.into()).unwrap(), 42);
        assert_eq!(i32::from_arg(&(-3i64).into()).unwrap(), -3);
        assert_eq!(bool::from_arg(&true.into()).unwrap(), true);
        assert!((f64::from_arg(&2.5f64.into()).unwrap() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_greedy_string_joins_words() {
        let words = ArgValue::from(vec!["hello".to_string(), "there".to_string()]);
        assert_eq!(String::from_arg(&words).unwrap(), "hello there");
        assert_eq!(Vec::<String>::from_arg(&words).unwrap().len(), 2);
    }

    #[test]
    fn test_mismatch_reports_types() {
        let err = bool::from_arg(&ArgValue::Integer(1)).unwrap_err();
        assert_eq!(err.to_string(), "Type mismatch: expected bool, got integer");

        let err = i32::from_arg(&ArgValue::Integer(i64::MAX)).unwrap_err();
        assert!(matches!(err, NativeError::TypeMismatch { .. }));
    }
}
