//! Column values.
//!
//! `Value` holds the value of any column type. Reading it back as the wrong
//! type fails with [`SessionError::Conversion`]; integers widen
//! (`Short` to `Int` to `Int64`) but never narrow.

use crate::error::{Result, SessionError};
use crate::types::{ArrayId, BlobId};
use serde::{Deserialize, Serialize};

/// Days since 1 January 0001 (proleptic Gregorian).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Date(pub i32);

/// Time of day in units of 1/10000 second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Time(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub date: Date,
    pub time: Time,
}

/// A single column value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Short(i16),
    Int(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Date(Date),
    Time(Time),
    Timestamp(Timestamp),
    /// Raw database key of a record.
    DbKey(Vec<u8>),
    Blob(BlobId),
    Array(ArrayId),
}

impl Value {
    /// Name of the variant, as used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Int64(_) => "int64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::DbKey(_) => "dbkey",
            Value::Blob(_) => "blob",
            Value::Array(_) => "array",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn mismatch(&self, expected: &'static str) -> SessionError {
        SessionError::Conversion {
            expected,
            found: self.kind(),
        }
    }
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_conversions! {
    bool => Bool;
    i16 => Short;
    i32 => Int;
    i64 => Int64;
    f32 => Float;
    f64 => Double;
    String => String;
    Date => Date;
    Time => Time;
    Timestamp => Timestamp;
    BlobId => Blob;
    ArrayId => Array;
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<&Value> for bool {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }
}

impl TryFrom<&Value> for i16 {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::Short(n) => Ok(*n),
            other => Err(other.mismatch("short")),
        }
    }
}

impl TryFrom<&Value> for i32 {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::Short(n) => Ok(i32::from(*n)),
            Value::Int(n) => Ok(*n),
            other => Err(other.mismatch("int")),
        }
    }
}

impl TryFrom<&Value> for i64 {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::Short(n) => Ok(i64::from(*n)),
            Value::Int(n) => Ok(i64::from(*n)),
            Value::Int64(n) => Ok(*n),
            other => Err(other.mismatch("int64")),
        }
    }
}

impl TryFrom<&Value> for f32 {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::Float(n) => Ok(*n),
            other => Err(other.mismatch("float")),
        }
    }
}

impl TryFrom<&Value> for f64 {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::Float(n) => Ok(f64::from(*n)),
            Value::Double(n) => Ok(*n),
            other => Err(other.mismatch("double")),
        }
    }
}

impl TryFrom<&Value> for String {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::String(s) => Ok(s.clone()),
            other => Err(other.mismatch("string")),
        }
    }
}

impl TryFrom<&Value> for Timestamp {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::Timestamp(ts) => Ok(*ts),
            other => Err(other.mismatch("timestamp")),
        }
    }
}

impl TryFrom<&Value> for BlobId {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::Blob(id) => Ok(*id),
            other => Err(other.mismatch("blob")),
        }
    }
}

impl TryFrom<&Value> for ArrayId {
    type Error = SessionError;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::Array(id) => Ok(*id),
            other => Err(other.mismatch("array")),
        }
    }
}
