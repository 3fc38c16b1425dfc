/// Value Module
///
/// Parameter and result values exchanged with the query executor, and the
/// bound type inferred for each of them.

use chrono::NaiveDateTime;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::{Serialize, Serializer};
use std::fmt;

/// Text layout used for date/time values on the wire and in storage.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Type a parameter is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    Int,
    Double,
    String,
    Blob,
}

impl BindType {
    /// One-letter tag (`i`, `d`, `s`, `b`) for the bound type.
    pub fn tag(self) -> char {
        match self {
            BindType::Int => 'i',
            BindType::Double => 'd',
            BindType::String => 's',
            BindType::Blob => 'b',
        }
    }
}

/// Builds the tag string for a parameter list, e.g. `"sis"`.
pub fn bind_types(params: &[Value]) -> String {
    params.iter().map(|v| v.bind_type().tag()).collect()
}

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Blob(Vec<u8>),
    /// Structured data with no native column type; stored as its JSON text
    Json(serde_json::Value),
}

impl Value {
    /// Infers the bound type. Anything without a numeric or blob mapping
    /// binds as a string.
    pub fn bind_type(&self) -> BindType {
        match self {
            Value::Integer(_) => BindType::Int,
            Value::Real(_) => BindType::Double,
            Value::Blob(_) => BindType::Blob,
            Value::Null | Value::Text(_) | Value::DateTime(_) | Value::Json(_) => BindType::String,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Text(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok(),
            _ => None,
        }
    }

    /// Converts a value borrowed from a result row.
    pub(crate) fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
            Value::Json(j) => write!(f, "{}", j),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::Owned(SqlValue::Null)),
            Value::Integer(i) => Ok(ToSqlOutput::Owned(SqlValue::Integer(*i))),
            Value::Real(f) => Ok(ToSqlOutput::Owned(SqlValue::Real(*f))),
            Value::Text(s) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
            Value::DateTime(dt) => Ok(ToSqlOutput::Owned(SqlValue::Text(
                dt.format(DATETIME_FORMAT).to_string(),
            ))),
            Value::Blob(b) => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&b[..]))),
            Value::Json(j) => Ok(ToSqlOutput::Owned(SqlValue::Text(j.to_string()))),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::DateTime(dt) => serializer.collect_str(&dt.format(DATETIME_FORMAT)),
            Value::Blob(b) => serializer.serialize_bytes(b),
            Value::Json(j) => j.serialize(serializer),
        }
    }
}

macro_rules! from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Integer(i64::from(v))
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32);

/// Booleans are stored as `0`/`1`, so they read back as `Integer`.
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_datetime() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_bind_type_inference() {
        assert_eq!(Value::from(25).bind_type(), BindType::Int);
        assert_eq!(Value::from(1.5).bind_type(), BindType::Double);
        assert_eq!(Value::from("John Doe").bind_type(), BindType::String);
        assert_eq!(Value::from(sample_datetime()).bind_type(), BindType::String);
        assert_eq!(Value::from(serde_json::json!({"a": 1})).bind_type(), BindType::String);
        assert_eq!(Value::Null.bind_type(), BindType::String);
        assert_eq!(Value::from(vec![1u8, 2]).bind_type(), BindType::Blob);
        assert_eq!(Value::from(true).bind_type(), BindType::Int);
    }

    #[test]
    fn test_bool_is_stored_as_integer() {
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(false), Value::Integer(0));
        assert_eq!(Value::from(Some(true)), Value::Integer(1));
    }

    #[test]
    fn test_bind_type_string() {
        let params = vec![Value::from("a"), Value::from(1), Value::from(2.0), Value::Null];
        assert_eq!(bind_types(&params), "sids");
    }

    #[test]
    fn test_datetime_binds_as_formatted_text() {
        let value = Value::from(sample_datetime());
        match value.to_sql().unwrap() {
            ToSqlOutput::Owned(SqlValue::Text(s)) => assert_eq!(s, "2024-03-09 07:05:00"),
            other => panic!("Expected text output, got {:?}", other),
        }
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(7).as_i64(), Some(7));
        assert_eq!(Value::from(7).as_f64(), Some(7.0));
        assert_eq!(Value::from("x").as_i64(), None);
        assert_eq!(
            Value::Text("2024-03-09 07:05:00".to_string()).as_datetime(),
            Some(sample_datetime())
        );
    }

    #[test]
    fn test_serialize_to_json() {
        let json = serde_json::to_value(Value::from(sample_datetime())).unwrap();
        assert_eq!(json, serde_json::json!("2024-03-09 07:05:00"));
        assert_eq!(serde_json::to_value(Value::Null).unwrap(), serde_json::Value::Null);
        assert_eq!(serde_json::to_value(Value::from(25)).unwrap(), serde_json::json!(25));
    }
}
