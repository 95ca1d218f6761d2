//! Opaque parameter values.
//!
//! [`SqlValue`] is the tagged value type carried by fragments and sent to the
//! driver as statement parameters. It deliberately keeps an explicit
//! [`SqlValue::Absent`] marker distinct from [`SqlValue::Null`]: SQL NULL must
//! always be requested explicitly, and a value that was never supplied is a
//! caller bug surfaced at build time.

use crate::fragment::Fragment;
use std::fmt;
use std::sync::Arc;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

/// What a custom value turns into when it meets SQL text.
///
/// Implementations choose exactly one variant:
/// - [`SqlRendering::Literal`] is driver-native literal text. The value stays
///   a bound parameter when executed; the text is only quoted for the debug
///   rendering.
/// - [`SqlRendering::Sql`] is a fragment spliced verbatim into the statement
///   by the builder.
#[derive(Debug, Clone)]
pub enum SqlRendering {
    Literal(String),
    Sql(Fragment),
}

/// Capability interface for values that carry their own SQL conversion.
pub trait SqlConvert: Send + Sync {
    fn to_sql(&self) -> SqlRendering;
}

/// An opaque statement parameter value.
#[derive(Clone)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// No value supplied. Rejected by the builder and by literal rendering;
    /// use [`SqlValue::Null`] for SQL NULL.
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(chrono::DateTime<chrono::Utc>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    /// A nested fragment; spliced by the builder, never bound as a parameter.
    Fragment(Fragment),
    /// An ordered key→value mapping, consumed by the `insert_object` transform.
    Object(Vec<(String, SqlValue)>),
    /// A value with its own SQL conversion hook.
    Custom(Arc<dyn SqlConvert>),
}

impl SqlValue {
    /// Wrap a custom convertible value.
    pub fn custom(value: impl SqlConvert + 'static) -> Self {
        Self::Custom(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_text(&self) -> Option<&str> {
        if let Self::Text(s) = self { Some(s) } else { None }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Self::Int(i) = self { Some(*i) } else { None }
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(b) = self { Some(*b) } else { None }
    }

    /// A JSON view of the value, used for debug rendering and for binding
    /// objects to `json`/`jsonb` columns.
    pub fn as_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null | Self::Absent => Value::Null,
            Self::Bool(b) => Value::from(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::from(s.clone()),
            Self::Bytes(b) => Value::from(hex_string(b)),
            Self::Timestamp(t) => Value::from(t.to_rfc3339()),
            Self::Uuid(u) => Value::from(u.to_string()),
            Self::Json(v) => v.clone(),
            Self::Fragment(f) => Value::from(f.render().to_string()),
            Self::Object(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_json()))
                    .collect(),
            ),
            Self::Custom(c) => match c.to_sql() {
                SqlRendering::Literal(s) => Value::from(s),
                SqlRendering::Sql(f) => Value::from(f.render().to_string()),
            },
        }
    }
}

pub(crate) fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

impl fmt::Debug for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Absent => write!(f, "Absent"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Timestamp(t) => f.debug_tuple("Timestamp").field(t).finish(),
            Self::Uuid(u) => f.debug_tuple("Uuid").field(u).finish(),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Fragment(frag) => f.debug_tuple("Fragment").field(&frag.text()).finish(),
            Self::Object(pairs) => f.debug_tuple("Object").field(pairs).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) | (Self::Absent, Self::Absent) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Fragment(a), Self::Fragment(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for SqlValue {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<chrono::NaiveDateTime> for SqlValue {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Self::Timestamp(v.and_utc())
    }
}

impl From<uuid::Uuid> for SqlValue {
    fn from(v: uuid::Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Fragment> for SqlValue {
    fn from(v: Fragment) -> Self {
        Self::Fragment(v)
    }
}

impl From<&Fragment> for SqlValue {
    fn from(v: &Fragment) -> Self {
        Self::Fragment(v.clone())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Absent => {
                Err("absent value cannot be bound; use SqlValue::Null for SQL NULL".into())
            }
            SqlValue::Bool(b) => b.to_sql(ty, out),
            SqlValue::Int(i) => {
                if *ty == Type::INT2 {
                    i16::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*i)?.to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            SqlValue::Float(f) => {
                if *ty == Type::FLOAT4 {
                    let narrowed = *f as f32;
                    narrowed.to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            SqlValue::Text(s) => s.to_sql(ty, out),
            SqlValue::Bytes(b) => b.to_sql(ty, out),
            SqlValue::Timestamp(t) => t.to_sql(ty, out),
            SqlValue::Uuid(u) => u.to_sql(ty, out),
            SqlValue::Json(v) => v.to_sql(ty, out),
            SqlValue::Fragment(_) => {
                Err("fragment must be spliced by the builder, not bound as a parameter".into())
            }
            SqlValue::Object(_) => {
                if *ty == Type::JSON || *ty == Type::JSONB {
                    self.as_json().to_sql(ty, out)
                } else {
                    Err("object value can only be bound to a json/jsonb column".into())
                }
            }
            SqlValue::Custom(c) => match c.to_sql() {
                SqlRendering::Literal(s) => s.to_sql(ty, out),
                SqlRendering::Sql(_) => {
                    Err("fragment-valued custom value cannot be bound as a parameter".into())
                }
            },
        }
    }

    fn accepts(ty: &Type) -> bool {
        // The value kind is only known at runtime, so accept every type a
        // variant can serialize into and let to_sql report mismatches.
        *ty == Type::BOOL
            || *ty == Type::INT2
            || *ty == Type::INT4
            || *ty == Type::INT8
            || *ty == Type::FLOAT4
            || *ty == Type::FLOAT8
            || *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::CHAR
            || *ty == Type::NAME
            || *ty == Type::UNKNOWN
            || *ty == Type::BYTEA
            || *ty == Type::TIMESTAMP
            || *ty == Type::TIMESTAMPTZ
            || *ty == Type::UUID
            || *ty == Type::JSON
            || *ty == Type::JSONB
    }

    to_sql_checked!();
}
