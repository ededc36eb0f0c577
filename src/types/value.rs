use std::fmt;
use std::pin::Pin;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tokio::io::AsyncRead;

/// A streamed column value (LOB) handed out by the driver.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// A column value exactly as the driver produced it.
///
/// Streams and big integers only exist at this level; normalization turns
/// every `RawValue` into a [`Value`].
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Wide integer the driver could not fit in a standard integer.
    BigInt(i128),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(DateTime<FixedOffset>),
    Json(serde_json::Value),
    Stream(ByteStream),
}

impl RawValue {
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        RawValue::Stream(Box::pin(reader))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("Null"),
            RawValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            RawValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            RawValue::BigInt(v) => f.debug_tuple("BigInt").field(v).finish(),
            RawValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            RawValue::Text(v) => f.debug_tuple("Text").field(v).finish(),
            RawValue::Bytes(v) => f.debug_tuple("Bytes").field(&v.len()).finish(),
            RawValue::Date(v) => f.debug_tuple("Date").field(v).finish(),
            RawValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            RawValue::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Int(value.into())
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<i128> for RawValue {
    fn from(value: i128) -> Self {
        RawValue::BigInt(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(value: Vec<u8>) -> Self {
        RawValue::Bytes(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawValue::Null, Into::into)
    }
}

/// A fully materialized column value, as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(DateTime<FixedOffset>),
    Json(serde_json::Value),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Loose truthiness: null, false, zero and empty text are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Text(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
