//! Runtime values bound into statements and read back from rows.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Column type tags understood by the renderer and the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    Text,
    /// Binary data.
    Bytes,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
}

impl SqlType {
    /// Generic column type name used when creating tables.
    pub fn column_type(&self) -> &'static str {
        match self {
            SqlType::Bool => "BOOLEAN",
            SqlType::Int32 => "INTEGER",
            SqlType::Int64 | SqlType::Timestamp => "BIGINT",
            SqlType::Float64 => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Bytes => "BLOB",
        }
    }

    /// The null-equivalent default for a freshly constructed value.
    pub fn default_value(&self) -> Value {
        match self {
            SqlType::Bool => Value::Bool(false),
            SqlType::Int32 => Value::Int32(0),
            SqlType::Int64 => Value::Int64(0),
            SqlType::Float64 => Value::Float64(0.0),
            SqlType::Text => Value::String(String::new()),
            SqlType::Bytes => Value::Bytes(Vec::new()),
            SqlType::Timestamp => Value::Timestamp(0),
        }
    }
}

/// A runtime value.
///
/// Values are compared structurally; `Int32(1)` and `Int64(1)` are distinct
/// values, use [`Value::coerce`] to normalise values read from a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Timestamp as microseconds since Unix epoch.
    Timestamp(i64),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64. Narrower integers and timestamps widen.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) | Value::Timestamp(i) => Some(*i),
            Value::Int32(i) => Some(*i as i64),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes reference.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Convert a value read from a loosely typed backend to the declared type.
    ///
    /// SQLite stores booleans, 32-bit integers and timestamps as 64-bit
    /// integers; this brings them back to the declared variant. Null stays
    /// null.
    pub fn coerce(self, ty: SqlType) -> Result<Value, Error> {
        let found = self.type_name();
        let mismatch = |expected| Error::TypeMismatch { expected, found };
        match (ty, self) {
            (_, Value::Null) => Ok(Value::Null),
            (SqlType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (SqlType::Bool, Value::Int64(i)) => Ok(Value::Bool(i != 0)),
            (SqlType::Bool, Value::Int32(i)) => Ok(Value::Bool(i != 0)),
            (SqlType::Bool, _) => Err(mismatch("bool")),
            (SqlType::Int32, Value::Int32(i)) => Ok(Value::Int32(i)),
            (SqlType::Int32, Value::Int64(i)) => i32::try_from(i)
                .map(Value::Int32)
                .map_err(|_| mismatch("int32")),
            (SqlType::Int32, _) => Err(mismatch("int32")),
            (SqlType::Int64, v) => v.as_i64().map(Value::Int64).ok_or_else(|| mismatch("int64")),
            (SqlType::Timestamp, v) => v
                .as_i64()
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch("timestamp")),
            (SqlType::Float64, Value::Float64(f)) => Ok(Value::Float64(f)),
            (SqlType::Float64, Value::Int64(i)) => Ok(Value::Float64(i as f64)),
            (SqlType::Float64, Value::Int32(i)) => Ok(Value::Float64(i as f64)),
            (SqlType::Float64, _) => Err(mismatch("float64")),
            (SqlType::Text, Value::String(s)) => Ok(Value::String(s)),
            (SqlType::Text, _) => Err(mismatch("string")),
            (SqlType::Bytes, Value::Bytes(b)) => Ok(Value::Bytes(b)),
            (SqlType::Bytes, Value::String(s)) => Ok(Value::Bytes(s.into_bytes())),
            (SqlType::Bytes, _) => Err(mismatch("bytes")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or(Error::TypeMismatch {
            expected: "bool",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for i32 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int32(i) => Ok(i),
            other => Err(Error::TypeMismatch {
                expected: "int32",
                found: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_i64().ok_or(Error::TypeMismatch {
            expected: "int64",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_f64().ok_or(Error::TypeMismatch {
            expected: "float64",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(Error::TypeMismatch {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(Error::TypeMismatch {
                expected: "bytes",
                found: other.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int64(100).as_i64(), Some(100));
        assert_eq!(Value::Int32(42).as_i64(), Some(42));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Bytes(vec![1, 2, 3]).as_bytes(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = true.into();
        assert_eq!(v, Value::Bool(true));

        let v: Value = "hello".into();
        assert_eq!(v, Value::String("hello".into()));

        let v: Value = None::<i64>.into();
        assert_eq!(v, Value::Null);

        let name: String = Value::String("x".into()).try_into().unwrap();
        assert_eq!(name, "x");

        let err = i64::try_from(Value::String("x".into())).unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                expected: "int64",
                found: "string"
            }
        );
    }

    #[test]
    fn test_coerce_backend_integers() {
        assert_eq!(Value::Int64(1).coerce(SqlType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(Value::Int64(7).coerce(SqlType::Int32).unwrap(), Value::Int32(7));
        assert_eq!(
            Value::Int64(1_700_000_000).coerce(SqlType::Timestamp).unwrap(),
            Value::Timestamp(1_700_000_000)
        );
        assert_eq!(Value::Null.coerce(SqlType::Text).unwrap(), Value::Null);
        assert!(Value::Int64(i64::MAX).coerce(SqlType::Int32).is_err());
        assert!(Value::String("a".into()).coerce(SqlType::Int64).is_err());
    }
}
