//! Postgres row operation.
//!
//! - [`Row`]
//! - [`Column`]
//! - [`FromRow`]
//! - [`Decode`]
//!
//! - [`Index`]
//! - [`DecodeError`]
//! - [`ColumnError`]
use bytes::Bytes;
use fallible_iterator::FallibleIterator;
use std::{borrow::Cow, fmt, str::Utf8Error, string::FromUtf8Error, sync::Arc};
use time::{Date, PrimitiveDateTime, Time, UtcDateTime, UtcOffset};

use crate::{
    codec::{CodecError, Codecs, Interval, Value},
    common::{ByteStr, unit_error},
    postgres::{
        Oid, PgFormat, ProtocolError,
        backend::{DataRow, FieldDescription},
    },
    types::TypeError,
};

/// Column metadata from `RowDescription`.
#[derive(Debug, Clone)]
pub struct Column {
    name: ByteStr,
    table_oid: Oid,
    column_id: i16,
    type_oid: Oid,
    format: PgFormat,
}

impl Column {
    pub(crate) fn new(field: FieldDescription) -> Column {
        Column {
            name: field.name,
            table_oid: field.table_oid,
            column_id: field.column_id,
            type_oid: field.type_oid,
            format: field.format,
        }
    }

    /// Statement describe always reports text, the actual format is chosen at bind.
    pub(crate) fn with_format(mut self, format: PgFormat) -> Column {
        self.format = format;
        self
    }

    /// Returns column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns column type [`Oid`].
    pub fn type_oid(&self) -> Oid {
        self.type_oid
    }

    /// Format the column values are transmitted in.
    pub fn format(&self) -> PgFormat {
        self.format
    }

    /// Source table, zero if the column is not a plain table column.
    pub fn table_oid(&self) -> Oid {
        self.table_oid
    }

    /// Attribute number in the source table, zero if unknown.
    pub fn column_id(&self) -> i16 {
        self.column_id
    }
}

/// An error of a single column, the other columns of the row are still usable.
#[derive(Debug, thiserror::Error)]
pub enum ColumnError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Decode every column of a `DataRow`.
///
/// `NULL` is [`Value::Null`] regardless of the column type. A column count that differs
/// from `columns` is a protocol violation, anything else fails per column.
pub fn materialize(
    codecs: &Codecs,
    columns: &[Column],
    row: &DataRow,
) -> Result<Vec<Result<Value, ColumnError>>, ProtocolError> {
    let found = usize::from(row.column_len);
    if found != columns.len() {
        return Err(ProtocolError::ColumnCountMismatch { expected: columns.len(), found });
    }

    let mut raw = row.values();
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let Some(value) = raw.next()? else {
            return Err(ProtocolError::ColumnCountMismatch { expected: columns.len(), found: values.len() });
        };
        values.push(decode_column(codecs, column, value));
    }
    Ok(values)
}

fn decode_column(codecs: &Codecs, column: &Column, raw: Option<Bytes>) -> Result<Value, ColumnError> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    if !codecs.registry().contains(column.type_oid) {
        return Err(TypeError::UnknownOid(column.type_oid).into());
    }
    Ok(codecs.decode(column.type_oid, column.format, Some(&raw))?)
}

/// Postgres row.
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Result<Value, ColumnError>>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<Result<Value, ColumnError>>) -> Row {
        Row { columns, values }
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Column metadata.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get the decoded value, or the error of that column.
    pub fn column_result<I: Index>(&self, idx: I) -> Result<Result<&Value, &ColumnError>, DecodeError> {
        let nth = idx.position(&self.columns)?;
        Ok(self.values[nth].as_ref())
    }

    /// Get the decoded value.
    pub fn get_value<I: Index>(&self, idx: I) -> Result<&Value, DecodeError> {
        let nth = idx.position(&self.columns)?;
        self.values[nth].as_ref().map_err(|e| DecodeError::Column { index: nth, message: e.to_string() })
    }

    /// Try get and decode column.
    pub fn try_get<I: Index, R: Decode>(&self, idx: I) -> Result<R, DecodeError> {
        R::decode(self.get_value(idx)?.clone())
    }

    /// Try decode type using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(self) -> Result<D, DecodeError> {
        D::from_row(self)
    }

    /// Consume self into column values.
    pub fn into_values(self) -> Vec<Result<Value, ColumnError>> {
        self.values
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (column, value) in self.columns.iter().zip(&self.values) {
            dbg.key(&column.name());
            match value {
                Ok(value) => dbg.value(value),
                Err(err) => dbg.value(&format_args!("<{err}>")),
            };
        }
        dbg.finish()
    }
}

// ===== Traits =====

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    /// Construct self from row.
    fn from_row(row: Row) -> Result<Self, DecodeError>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row)
    }
}

impl FromRow for () {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:literal),*) => {
        impl<$($t),*> FromRow for ($($t),*,)
        where
            $($t: Decode),*
        {
            fn from_row(row: Row) -> Result<Self, DecodeError> {
                Ok((
                    $(row.try_get($i)?),*,
                ))
            }
        }
    };
}

from_row_tuple!(T0 0);
from_row_tuple!(T0 0, T1 1);
from_row_tuple!(T0 0, T1 1, T2 2);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);

/// A type that can be constructed from a decoded [`Value`].
pub trait Decode: Sized {
    /// Try decode self from value.
    fn decode(value: Value) -> Result<Self, DecodeError>;
}

impl Decode for Value {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            value => T::decode(value).map(Some),
        }
    }
}

impl Decode for () {
    fn decode(_: Value) -> Result<Self, DecodeError> {
        Ok(())
    }
}

fn mismatch<T>(expected: &'static str, value: Value) -> Result<T, DecodeError> {
    match value {
        Value::Null => Err(DecodeError::Null),
        value => Err(DecodeError::Mismatch { expected, found: value.kind_name() }),
    }
}

macro_rules! decode_variant {
    ($($ty:ty => $name:literal, $($variant:ident)|*;)*) => {$(
        impl Decode for $ty {
            fn decode(value: Value) -> Result<Self, DecodeError> {
                match value {
                    $(Value::$variant(v) => Ok(v.into()),)*
                    value => mismatch($name, value),
                }
            }
        }
    )*};
}

decode_variant! {
    bool => "bool", Bool;
    f64 => "float8", Float8 | Float4;
    f32 => "float4", Float4;
    u32 => "oid", Oid;
    Bytes => "bytea", Bytea;
    [u8; 16] => "uuid", Uuid;
    Date => "date", Date;
    Time => "time", Time;
    PrimitiveDateTime => "timestamp", Timestamp;
    UtcDateTime => "timestamptz", TimestampTz;
    Interval => "interval", Interval;
}

impl Decode for (Time, UtcOffset) {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::TimeTz(time, offset) => Ok((time, offset)),
            value => mismatch("timetz", value),
        }
    }
}

macro_rules! decode_integer {
    ($($ty:ty => $name:literal;)*) => {$(
        impl Decode for $ty {
            fn decode(value: Value) -> Result<Self, DecodeError> {
                let wide = match value {
                    Value::Int2(v) => i64::from(v),
                    Value::Int4(v) => i64::from(v),
                    Value::Int8(v) => v,
                    value => return mismatch($name, value),
                };
                <$ty>::try_from(wide).map_err(|_| DecodeError::Overflow($name))
            }
        }
    )*};
}

decode_integer! {
    i16 => "int2";
    i32 => "int4";
    i64 => "int8";
}

impl Decode for String {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Text(s) | Value::Json(s) | Value::Numeric(s) | Value::Enum(s) => Ok(s),
            value => mismatch("text", value),
        }
    }
}

/// Array elements in row major order, dimensions are flattened.
impl<T: Decode> Decode for Vec<T> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Array(array) => array.elements.into_iter().map(T::decode).collect(),
            value => mismatch("array", value),
        }
    }
}

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns the column position.
    fn position(self, columns: &[Column]) -> Result<usize, DecodeError>;
}

impl Index for usize {
    fn position(self, columns: &[Column]) -> Result<usize, DecodeError> {
        match self < columns.len() {
            true => Ok(self),
            false => Err(DecodeError::IndexOutOfBounds(self)),
        }
    }
}

impl Index for &str {
    fn position(self, columns: &[Column]) -> Result<usize, DecodeError> {
        columns
            .iter()
            .position(|c| c.name() == self)
            .ok_or_else(|| DecodeError::ColumnNotFound(String::from(self).into()))
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

unit_error! {
    /// An error when [`query_one`][crate::Connection::query_one] returns no row.
    pub struct RowNotFound("row not found");
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row value.
pub enum DecodeError {
    /// Column requested not found.
    ColumnNotFound(Cow<'static,str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Value is null.
    Null,
    /// Value is not of the requested type.
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// Integer does not fit the requested type.
    Overflow(&'static str),
    /// Enum label is not one of the known variants.
    UnknownLabel(String),
    /// The column itself failed to decode.
    Column {
        index: usize,
        message: String,
    },
    /// Postgres return non utf8 string.
    Utf8(Utf8Error),
    /// Failed to deserialize using `serde_json`.
    #[cfg(feature = "json")]
    Json(serde_json::error::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::Null => write!(f, "unexpected NULL value"),
            Self::Mismatch { expected, found } => write!(f, "expected {expected}, found {found}"),
            Self::Overflow(ty) => write!(f, "value out of range for {ty}"),
            Self::UnknownLabel(label) => write!(f, "unknown enum label {label:?}"),
            Self::Column { index, message } => write!(f, "column {index}: {message}"),
            Self::Utf8(e) => write!(f, "{e}"),
            #[cfg(feature = "json")]
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));
#[cfg(feature = "json")]
from!(<serde_json::error::Error>e => Self::Json(e));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::{postgres::oid, types::Registry};

    fn column(name: &'static str, type_oid: Oid, format: PgFormat) -> Column {
        Column { name: ByteStr::from_static(name), table_oid: 0, column_id: 0, type_oid, format }
    }

    fn data_row(values: &[Option<&[u8]>]) -> DataRow {
        let mut body = BytesMut::new();
        for value in values {
            match value {
                Some(v) => {
                    body.put_i32(v.len() as i32);
                    body.put_slice(v);
                },
                None => body.put_i32(-1),
            }
        }
        DataRow { column_len: values.len() as u16, body: body.freeze() }
    }

    fn codecs() -> Codecs {
        Codecs::new(Arc::new(Registry::new()))
    }

    #[test]
    fn materialize_columns() {
        let columns: Arc<[Column]> = Arc::from(vec![
            column("id", oid::INT4, PgFormat::Binary),
            column("name", oid::TEXT, PgFormat::Text),
            column("note", oid::TEXT, PgFormat::Text),
        ]);
        let raw = data_row(&[Some(&42i32.to_be_bytes()), Some(b"foo"), None]);
        let values = materialize(&codecs(), &columns, &raw).unwrap();
        let row = Row::new(columns, values);

        assert_eq!(row.len(), 3);
        assert_eq!(row.try_get::<_, i32>(0).unwrap(), 42);
        assert_eq!(row.try_get::<_, i64>("id").unwrap(), 42);
        assert_eq!(row.try_get::<_, String>("name").unwrap(), "foo");
        assert_eq!(row.try_get::<_, Option<String>>("note").unwrap(), None);
        assert!(matches!(row.try_get::<_, String>("note"), Err(DecodeError::Null)));
        assert!(matches!(row.try_get::<_, i32>("missing"), Err(DecodeError::ColumnNotFound(_))));
        assert!(matches!(row.try_get::<_, i32>(3), Err(DecodeError::IndexOutOfBounds(3))));

        let (id, name) = row.decode::<(i16, String)>().unwrap();
        assert_eq!((id, name.as_str()), (42, "foo"));
    }

    #[test]
    fn column_count_mismatch() {
        let columns = [column("a", oid::INT4, PgFormat::Text)];
        let raw = data_row(&[Some(b"1"), Some(b"2")]);
        let err = materialize(&codecs(), &columns, &raw).unwrap_err();
        assert!(matches!(err, ProtocolError::ColumnCountMismatch { expected: 1, found: 2 }));
    }

    #[test]
    fn per_column_errors() {
        let columns: Arc<[Column]> = Arc::from(vec![
            column("unknown", 77_777, PgFormat::Binary),
            column("bad", oid::INT4, PgFormat::Binary),
            column("ok", oid::BOOL, PgFormat::Text),
            column("null", 77_777, PgFormat::Binary),
        ]);
        let raw = data_row(&[Some(b"x"), Some(b"12"), Some(b"t"), None]);
        let values = materialize(&codecs(), &columns, &raw).unwrap();
        assert!(matches!(values[0], Err(ColumnError::Type(TypeError::UnknownOid(77_777)))));
        assert!(matches!(values[1], Err(ColumnError::Codec(_))));
        assert_eq!(values[2].as_ref().unwrap(), &Value::Bool(true));
        assert_eq!(values[3].as_ref().unwrap(), &Value::Null);

        let row = Row::new(columns, values);
        assert!(matches!(row.try_get::<_, i32>("bad"), Err(DecodeError::Column { index: 1, .. })));
        assert!(row.try_get::<_, bool>("ok").unwrap());
    }

    #[test]
    fn decode_conversions() {
        assert!(matches!(i16::decode(Value::Int8(1 << 20)), Err(DecodeError::Overflow("int2"))));
        assert_eq!(i64::decode(Value::Int2(-3)).unwrap(), -3);
        assert_eq!(f64::decode(Value::Float4(0.5)).unwrap(), 0.5);
        assert!(matches!(
            bool::decode(Value::Int4(1)),
            Err(DecodeError::Mismatch { expected: "bool", found: "int4" })
        ));

        let array = Value::Array(vec![Some(1), None, Some(3)].into());
        assert_eq!(Vec::<Option<i32>>::decode(array.clone()).unwrap(), [Some(1), None, Some(3)]);
        assert!(matches!(Vec::<i32>::decode(array), Err(DecodeError::Null)));
    }
}
