use bytes::Bytes;
use std::{any::Any, fmt, ops::Bound, sync::Arc};
use time::{Date, PrimitiveDateTime, Time, UtcDateTime, UtcOffset};

use crate::postgres::Oid;

/// Decoded postgres value.
///
/// Encoding picks the wire representation from the target type, a value only has to
/// be compatible with it, e.g. [`Value::Int2`] can be sent as `int8`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Oid(Oid),
    /// `"char"`, a single byte.
    Char(i8),
    /// `text`, `varchar`, `bpchar`, `name`, and any type read in text format without
    /// a dedicated codec.
    Text(String),
    Bytea(Bytes),
    Uuid([u8; 16]),
    /// `json` or `jsonb` document.
    Json(String),
    /// Decimal string of a `numeric`.
    Numeric(String),
    /// `date`, `infinity` is [`Date::MAX`].
    Date(Date),
    Time(Time),
    /// `timestamp`, `infinity` is [`PrimitiveDateTime::MAX`].
    Timestamp(PrimitiveDateTime),
    /// `timestamptz`, `infinity` is [`UtcDateTime::MAX`].
    TimestampTz(UtcDateTime),
    /// `timetz`, time of day with its utc offset.
    TimeTz(Time, UtcOffset),
    Interval(Interval),
    Array(Array),
    /// Composite value, fields in declared order.
    Composite(Vec<(String, Value)>),
    Range(Box<Range>),
    MultiRange(Vec<Range>),
    /// Enum label.
    Enum(String),
    /// Value produced by a registered user type.
    Custom(Custom),
    /// Result of a `void` function.
    Void,
}

/// `interval`, the three fields are kept apart as postgres does.
///
/// A month is not a fixed number of days, nor a day a fixed number of microseconds
/// across daylight saving changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl Interval {
    pub const fn new(months: i32, days: i32, micros: i64) -> Interval {
        Interval { months, days, micros }
    }
}

/// Possibly multi dimensional array.
///
/// Elements are stored flat in row major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub dims: Vec<Dimension>,
    pub elements: Vec<Value>,
}

/// One array dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub len: i32,
    /// Lower bound index, postgres default is `1`.
    pub lower: i32,
}

/// Range value.
#[derive(Debug, Clone, PartialEq)]
pub enum Range {
    Empty,
    Bounds {
        lower: Bound<Value>,
        upper: Bound<Value>,
    },
}

/// Opaque value of a user type.
#[derive(Clone)]
pub struct Custom(Arc<dyn Any + Send + Sync>);

impl Custom {
    pub fn new<T: Any + Send + Sync>(value: T) -> Custom {
        Custom(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl PartialEq for Custom {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Custom(..)")
    }
}

impl Array {
    /// One dimensional array with lower bound `1`.
    pub fn from_vec(elements: Vec<Value>) -> Array {
        let dims = match elements.len() {
            0 => vec![],
            len => vec![Dimension { len: len as i32, lower: 1 }],
        };
        Array { dims, elements }
    }

    /// Total number of elements declared by the dimensions.
    pub(crate) fn declared_len(&self) -> usize {
        match self.dims.is_empty() {
            true => 0,
            false => self.dims.iter().map(|d| d.len.max(0) as usize).product(),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the string of text-like values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Json(s) | Value::Numeric(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value of any width.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int2(i) => Some(i.into()),
            Value::Int4(i) => Some(i.into()),
            Value::Int8(i) => Some(i),
            Value::Oid(i) => Some(i.into()),
            _ => None,
        }
    }

    /// Variant name, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int2(_) => "int2",
            Value::Int4(_) => "int4",
            Value::Int8(_) => "int8",
            Value::Float4(_) => "float4",
            Value::Float8(_) => "float8",
            Value::Oid(_) => "oid",
            Value::Char(_) => "char",
            Value::Text(_) => "text",
            Value::Bytea(_) => "bytea",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
            Value::Numeric(_) => "numeric",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::TimeTz(..) => "timetz",
            Value::Interval(_) => "interval",
            Value::Array(_) => "array",
            Value::Composite(_) => "composite",
            Value::Range(_) => "range",
            Value::MultiRange(_) => "multirange",
            Value::Enum(_) => "enum",
            Value::Custom(_) => "custom",
            Value::Void => "void",
        }
    }

    /// Serialize into [`Value::Json`].
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Value, serde_json::Error> {
        serde_json::to_string(value).map(Value::Json)
    }
}

macro_rules! from {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value.into())
            }
        }
    )*};
}

from! {
    bool => Bool,
    i16 => Int2,
    i32 => Int4,
    i64 => Int8,
    f32 => Float4,
    f64 => Float8,
    String => Text,
    &str => Text,
    Bytes => Bytea,
    Vec<u8> => Bytea,
    Date => Date,
    Time => Time,
    PrimitiveDateTime => Timestamp,
    UtcDateTime => TimestampTz,
    Interval => Interval,
    Array => Array,
    Custom => Custom,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Array {
    fn from(value: Vec<T>) -> Self {
        Array::from_vec(value.into_iter().map(Into::into).collect())
    }
}

impl From<Range> for Value {
    fn from(value: Range) -> Self {
        Value::Range(Box::new(value))
    }
}
