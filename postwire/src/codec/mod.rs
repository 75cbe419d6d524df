//! Value encoding and decoding.
//!
//! A [`Codec`] pairs a resolved [`Type`] with the strategy that reads and writes its
//! values. Strategies are picked in order:
//!
//! 1. user mapping registered by type name, see [`UserTypes`]
//! 2. domain, delegates to its base type
//! 3. builtin primitive, by `pg_catalog` name
//! 4. structure of the type: array, composite, range, multirange, enum
//!
//! Base types without a codec are read as [`Value::Text`] in text format.
use bytes::{Bytes, BytesMut};
use std::{str::Utf8Error, sync::Arc};

use crate::{
    postgres::{Oid, PgFormat, oid},
    row::DecodeError,
    types::{Direction, Kind, Registry, Type, TypeError},
};

mod array;
mod composite;
pub(crate) mod primitive;
mod range;
mod text;
mod user;
mod value;
#[cfg(feature = "json")]
mod json;

pub use composite::{FieldReader, FieldWriter};
pub use primitive::Primitive;
pub use user::{PgEnum, User, UserType, UserTypes};
pub use value::{Array, Custom, Dimension, Interval, Range, Value};
#[cfg(feature = "json")]
pub use json::Json;

/// Codec lookup over a type [`Registry`].
#[derive(Debug, Clone)]
pub struct Codecs {
    registry: Arc<Registry>,
    user: Arc<UserTypes>,
}

/// Codec of one resolved type.
#[derive(Debug, Clone)]
pub struct Codec<'a> {
    codecs: &'a Codecs,
    ty: Arc<Type>,
    strategy: Strategy,
}

/// How values of a type are read and written.
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    Primitive(Primitive),
    /// Base type without codec, text format only.
    Opaque,
    Array(Oid),
    Composite,
    /// Anonymous `record`, field types are carried by the value.
    Record,
    Range(Oid),
    MultiRange(Oid),
    Domain(Oid),
    Enum,
    Void,
    User(user::Mapping),
}

impl Codecs {
    pub fn new(registry: Arc<Registry>) -> Codecs {
        Codecs { registry, user: Arc::default() }
    }

    pub fn with_user_types(registry: Arc<Registry>, user: impl Into<Arc<UserTypes>>) -> Codecs {
        Codecs { registry, user: user.into() }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn user_types(&self) -> &UserTypes {
        &self.user
    }

    /// Codec of a resolved type.
    pub fn codec(&self, oid: Oid) -> Result<Codec<'_>, CodecError> {
        let ty = self.registry.get(oid).ok_or(CodecError::Unresolved(oid))?;
        let strategy = match self.user.get(&ty) {
            Some(mapping) => Strategy::User(mapping),
            None => Self::strategy(&ty),
        };
        Ok(Codec { codecs: self, ty, strategy })
    }

    /// Codec ignoring user mappings, used to read the insides of a user type.
    pub(crate) fn structural(&self, oid: Oid) -> Result<Codec<'_>, CodecError> {
        let ty = self.registry.get(oid).ok_or(CodecError::Unresolved(oid))?;
        let strategy = Self::strategy(&ty);
        Ok(Codec { codecs: self, ty, strategy })
    }

    fn strategy(ty: &Type) -> Strategy {
        if let Kind::Domain(base) = ty.kind() {
            return Strategy::Domain(*base);
        }
        if let Some(primitive) = Primitive::from_type(ty) {
            return Strategy::Primitive(primitive);
        }
        match ty.kind() {
            Kind::Base => Strategy::Opaque,
            Kind::Array(elem) => Strategy::Array(*elem),
            Kind::Composite(_) => Strategy::Composite,
            Kind::Range(elem) => Strategy::Range(*elem),
            Kind::MultiRange { range, .. } => Strategy::MultiRange(*range),
            Kind::Domain(base) => Strategy::Domain(*base),
            Kind::Enum(_) => Strategy::Enum,
            Kind::Pseudo => match ty.oid() {
                oid::VOID => Strategy::Void,
                oid::RECORD => Strategy::Record,
                _ => Strategy::Opaque,
            },
        }
    }

    /// Decode a value, `NULL` is [`Value::Null`].
    pub fn decode(&self, oid: Oid, format: PgFormat, raw: Option<&[u8]>) -> Result<Value, CodecError> {
        match raw {
            Some(raw) => self.codec(oid)?.decode(format, raw),
            None => Ok(Value::Null),
        }
    }

    /// Encode a value, [`Value::Null`] is [`None`].
    pub fn encode(&self, oid: Oid, format: PgFormat, value: &Value) -> Result<Option<Bytes>, CodecError> {
        if value.is_null() {
            return Ok(None);
        }
        let mut buf = BytesMut::new();
        self.codec(oid)?.encode(format, value, &mut buf)?;
        Ok(Some(buf.freeze()))
    }

    /// Whether values of the type can be exchanged in the format.
    pub fn supports(&self, oid: Oid, format: PgFormat, direction: Direction) -> bool {
        self.registry.supports(oid, format, direction)
    }

    /// Format requested for result columns of the type.
    pub fn result_format(&self, oid: Oid) -> PgFormat {
        match self.supports(oid, PgFormat::Binary, Direction::Decode) {
            true => PgFormat::Binary,
            false => PgFormat::Text,
        }
    }

    /// Format a parameter value is sent in.
    ///
    /// [`Value::Text`] is sent as text so the server parses it with the type input
    /// function.
    pub fn param_format(&self, oid: Oid, value: &Value) -> PgFormat {
        if matches!(value, Value::Text(_)) {
            return PgFormat::Text;
        }
        match self.supports(oid, PgFormat::Binary, Direction::Encode) {
            true => PgFormat::Binary,
            false => PgFormat::Text,
        }
    }
}

impl<'a> Codec<'a> {
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub(crate) fn codecs(&self) -> &'a Codecs {
        self.codecs
    }

    /// Decode a non `NULL` value.
    pub fn decode(&self, format: PgFormat, raw: &[u8]) -> Result<Value, CodecError> {
        let text = || std::str::from_utf8(raw).map_err(CodecError::Utf8);
        match (self.strategy, format) {
            (Strategy::Primitive(p), PgFormat::Binary) => p.decode_binary(raw),
            (Strategy::Primitive(p), PgFormat::Text) => p.decode_text(text()?),
            (Strategy::Opaque, PgFormat::Text) => Ok(Value::Text(text()?.to_owned())),
            (Strategy::Opaque, PgFormat::Binary) => Err(self.unsupported(format)),
            (Strategy::Array(elem), _) => array::decode(self, elem, format, raw),
            (Strategy::Composite | Strategy::Record, _) => composite::decode(self, format, raw),
            (Strategy::Range(elem), _) => range::decode_range(self, elem, format, raw),
            (Strategy::MultiRange(range), _) => range::decode_multirange(self, range, format, raw),
            (Strategy::Domain(base), _) => self.codecs.codec(base)?.decode(format, raw),
            (Strategy::Enum, _) => {
                let label = text()?;
                match self.ty.labels().iter().any(|l| l == label) {
                    true => Ok(Value::Enum(label.to_owned())),
                    false => Err(self.unknown_label(label)),
                }
            },
            (Strategy::Void, _) => Ok(Value::Void),
            (Strategy::User(mapping), _) => user::decode(self, mapping, format, raw),
        }
    }

    /// Encode a non `NULL` value.
    ///
    /// In text format [`Value::Text`] is accepted for any type and written as is.
    pub fn encode(&self, format: PgFormat, value: &Value, buf: &mut BytesMut) -> Result<(), CodecError> {
        if value.is_null() {
            return Err(CodecError::UnexpectedNull);
        }
        if let (PgFormat::Text, Value::Text(s)) = (format, value) {
            buf.extend_from_slice(s.as_bytes());
            return Ok(());
        }
        match (self.strategy, format) {
            (Strategy::Primitive(p), PgFormat::Binary) => p.encode_binary(value, buf),
            (Strategy::Primitive(p), PgFormat::Text) => {
                buf.extend_from_slice(p.encode_text(value)?.as_bytes());
                Ok(())
            },
            (Strategy::Opaque | Strategy::Record, _) => Err(self.mismatch(value)),
            (Strategy::Array(elem), _) => array::encode(self, elem, format, value, buf),
            (Strategy::Composite, _) => composite::encode(self, format, value, buf),
            (Strategy::Range(elem), _) => range::encode_range(self, elem, format, value, buf),
            (Strategy::MultiRange(range), _) => range::encode_multirange(self, range, format, value, buf),
            (Strategy::Domain(base), _) => self.codecs.codec(base)?.encode(format, value, buf),
            (Strategy::Enum, _) => match value {
                Value::Enum(label) if self.ty.labels().contains(label) => {
                    buf.extend_from_slice(label.as_bytes());
                    Ok(())
                },
                Value::Enum(label) => Err(self.unknown_label(label)),
                value => Err(self.mismatch(value)),
            },
            (Strategy::Void, _) => Ok(()),
            (Strategy::User(mapping), _) => user::encode(self, mapping, format, value, buf),
        }
    }

    /// Encode into text, used for elements of text format literals.
    pub(crate) fn encode_text(&self, value: &Value) -> Result<Option<String>, CodecError> {
        if value.is_null() {
            return Ok(None);
        }
        let mut buf = BytesMut::new();
        self.encode(PgFormat::Text, value, &mut buf)?;
        String::from_utf8(buf.to_vec()).map(Some).map_err(|e| CodecError::Utf8(e.utf8_error()))
    }

    pub(crate) fn malformed(&self, reason: impl ToString) -> CodecError {
        CodecError::MalformedStructuredValue { ty: self.ty.name().into(), reason: reason.to_string() }
    }

    pub(crate) fn mismatch(&self, value: &Value) -> CodecError {
        CodecError::Mismatch { ty: self.ty.name().into(), value: value.kind_name() }
    }

    fn unsupported(&self, format: PgFormat) -> CodecError {
        CodecError::unsupported(self.ty.name(), format)
    }

    fn unknown_label(&self, label: &str) -> CodecError {
        CodecError::UnknownEnumLabel { ty: self.ty.name().into(), label: label.into() }
    }
}

/// An error when encoding or decoding a value.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("type oid {0} is not resolved")]
    Unresolved(Oid),
    #[error("{ty} does not support {format:?} format")]
    Unsupported { ty: String, format: PgFormat },
    #[error("cannot encode {value} value as {ty}")]
    Mismatch { ty: String, value: &'static str },
    #[error("value out of range for type {0}")]
    Overflow(String),
    #[error("invalid input for type {ty}: {reason}")]
    InvalidValue { ty: String, reason: String },
    #[error("malformed {ty} value: {reason}")]
    MalformedStructuredValue { ty: String, reason: String },
    #[error("invalid label {label:?} for enum {ty}")]
    UnknownEnumLabel { ty: String, label: String },
    #[error("unexpected NULL")]
    UnexpectedNull,
    #[error("statement takes {expected} parameters, {found} given")]
    ParamCount { expected: usize, found: usize },
    #[error("field {index} of {ty}: {source}")]
    Field {
        ty: String,
        index: usize,
        source: Box<DecodeError>,
    },
    #[error("invalid utf8: {0}")]
    Utf8(Utf8Error),
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl CodecError {
    pub(crate) fn unsupported(ty: &str, format: PgFormat) -> CodecError {
        CodecError::Unsupported { ty: ty.into(), format }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{MemoryCatalog, TypeInfo};

    const MOOD: Oid = 90_001;
    const POSINT: Oid = 90_002;

    async fn codecs() -> Codecs {
        let registry = Arc::new(Registry::new());
        let mut catalog = MemoryCatalog::new();
        catalog
            .insert(MOOD, TypeInfo::new("mood", Kind::Enum(vec!["sad".into(), "happy".into()])))
            .insert(POSINT, TypeInfo::new("posint", Kind::Domain(oid::INT4)));
        registry.resolve(MOOD, &mut catalog).await.unwrap();
        registry.resolve(POSINT, &mut catalog).await.unwrap();
        Codecs::new(registry)
    }

    #[tokio::test]
    async fn strategy_selection() {
        let codecs = codecs().await;
        assert!(matches!(codecs.codec(oid::INT4).unwrap().strategy(), Strategy::Primitive(Primitive::Int4)));
        assert!(matches!(codecs.codec(POSINT).unwrap().strategy(), Strategy::Domain(oid::INT4)));
        assert!(matches!(codecs.codec(MOOD).unwrap().strategy(), Strategy::Enum));
        assert!(matches!(codecs.codec(oid::RECORD).unwrap().strategy(), Strategy::Record));
        assert!(matches!(codecs.codec(1).unwrap_err(), CodecError::Unresolved(1)));
    }

    #[tokio::test]
    async fn domain_and_enum() {
        let codecs = codecs().await;
        let raw = codecs.encode(POSINT, PgFormat::Binary, &Value::Int2(5)).unwrap().unwrap();
        assert_eq!(&raw[..], 5i32.to_be_bytes());
        assert_eq!(codecs.decode(POSINT, PgFormat::Binary, Some(&raw)).unwrap(), Value::Int4(5));

        let happy = Value::Enum("happy".into());
        let raw = codecs.encode(MOOD, PgFormat::Binary, &happy).unwrap().unwrap();
        assert_eq!(&raw[..], b"happy");
        assert_eq!(codecs.decode(MOOD, PgFormat::Text, Some(b"happy")).unwrap(), happy);
        assert!(matches!(
            codecs.decode(MOOD, PgFormat::Text, Some(b"angry")).unwrap_err(),
            CodecError::UnknownEnumLabel { .. }
        ));
    }

    #[tokio::test]
    async fn null_and_text_passthrough() {
        let codecs = codecs().await;
        assert_eq!(codecs.decode(oid::INT4, PgFormat::Binary, None).unwrap(), Value::Null);
        assert_eq!(codecs.encode(oid::INT4, PgFormat::Binary, &Value::Null).unwrap(), None);

        // server parses the literal
        let raw = codecs.encode(oid::INT4, PgFormat::Text, &Value::Text("42".into())).unwrap().unwrap();
        assert_eq!(&raw[..], b"42");
        assert_eq!(codecs.param_format(oid::INT4, &Value::Text("42".into())), PgFormat::Text);
        assert_eq!(codecs.param_format(oid::INT4, &Value::Int4(42)), PgFormat::Binary);
        assert_eq!(codecs.result_format(oid::NUMERIC), PgFormat::Binary);
        assert_eq!(codecs.result_format(oid::UNKNOWN), PgFormat::Text);
    }

    #[tokio::test]
    async fn opaque_base_is_text() {
        let registry = Arc::new(Registry::new());
        let mut catalog = MemoryCatalog::new();
        catalog.insert(90_010, TypeInfo::new("citext", Kind::Base));
        registry.resolve(90_010, &mut catalog).await.unwrap();
        let codecs = Codecs::new(registry);

        assert_eq!(
            codecs.decode(90_010, PgFormat::Text, Some(b"Hello")).unwrap(),
            Value::Text("Hello".into())
        );
        assert_eq!(codecs.result_format(90_010), PgFormat::Text);
        assert!(codecs.decode(90_010, PgFormat::Binary, Some(b"Hello")).is_err());
    }

    #[tokio::test]
    async fn builtin_values_survive_both_formats() {
        use time::{
            Date, Month, UtcDateTime,
            macros::{date, datetime, offset, time},
        };

        let codecs = codecs().await;
        let values = [
            (oid::BOOL, Value::Bool(true)),
            (oid::INT2, Value::Int2(-32_768)),
            (oid::INT4, Value::Int4(i32::MAX)),
            (oid::INT8, Value::Int8(-9_000_000_000)),
            (oid::OID, Value::Oid(4_000_000_000)),
            (oid::FLOAT4, Value::Float4(1.5)),
            (oid::FLOAT8, Value::Float8(-0.25)),
            (oid::CHAR, Value::Char(-1)),
            (oid::TEXT, Value::Text("héllo, wörld".into())),
            (oid::VARCHAR, Value::Text("v".into())),
            (oid::NAME, Value::Text("pg_class".into())),
            (oid::BYTEA, Value::Bytea(Bytes::from_static(b"\x00\xff\\"))),
            (oid::UUID, Value::Uuid([0xab; 16])),
            (oid::JSON, Value::Json(r#"{"a":[1,2]}"#.into())),
            (oid::JSONB, Value::Json("[null]".into())),
            (oid::NUMERIC, Value::Numeric("-12345.6789".into())),
            (oid::NUMERIC, Value::Numeric("0.000100".into())),
            (oid::NUMERIC, Value::Numeric("NaN".into())),
            (oid::DATE, Value::Date(date!(1970-01-01))),
            (oid::DATE, Value::Date(Date::from_calendar_date(10_000, Month::December, 31).unwrap())),
            (oid::TIME, Value::Time(time!(13:14:15.000016))),
            (oid::TIMETZ, Value::TimeTz(time!(10:11:12.5), offset!(-3:30))),
            (oid::TIMESTAMP, Value::Timestamp(datetime!(1999-12-31 23:59:59.999999))),
            (oid::TIMESTAMPTZ, Value::TimestampTz(UtcDateTime::new(date!(2024-01-02), time!(03:04:05)))),
            (oid::INTERVAL, Value::Interval(Interval::new(14, -3, -1_500_000))),
            (oid::VOID, Value::Void),
        ];

        for (oid, value) in values {
            for format in [PgFormat::Binary, PgFormat::Text] {
                let raw = codecs.encode(oid, format, &value).unwrap().unwrap();
                let decoded = codecs.decode(oid, format, Some(&raw)).unwrap();
                assert_eq!(decoded, value, "oid {oid} in {format:?}");
            }
            assert!(codecs.supports(oid, PgFormat::Binary, Direction::Decode), "oid {oid}");
        }
    }
}
