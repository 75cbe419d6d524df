//! User defined type mappings.
use bytes::BytesMut;
use std::{collections::HashMap, fmt};

use super::{Codec, CodecError, Custom, FieldReader, FieldWriter, Value};
use crate::{
    postgres::PgFormat,
    row::{Decode, DecodeError},
    types::Type,
};

/// Rust type mapped to a server type by name.
///
/// The mapping takes precedence over every builtin codec. For composite types the
/// reader and writer walk the fields in declared order, any other type is one field.
///
/// ```
/// use postwire::codec::{CodecError, FieldReader, FieldWriter, UserType};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Address {
///     street: String,
///     city: String,
/// }
///
/// impl UserType for Address {
///     const TYPE_NAME: &'static str = "address";
///
///     fn decode(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
///         Ok(Address { street: reader.read()?, city: reader.read()? })
///     }
///
///     fn encode(&self, writer: &mut FieldWriter<'_>) -> Result<(), CodecError> {
///         writer.write_value(self.street.as_str())?;
///         writer.write_value(self.city.as_str())
///     }
/// }
/// ```
pub trait UserType: Sized + Send + Sync + 'static {
    /// Server type name, optionally schema qualified, e.g. `inventory.item`.
    const TYPE_NAME: &'static str;

    fn decode(reader: &mut FieldReader<'_>) -> Result<Self, CodecError>;

    fn encode(&self, writer: &mut FieldWriter<'_>) -> Result<(), CodecError>;
}

/// Type erased [`UserType`].
#[derive(Clone, Copy)]
pub struct Mapping {
    type_name: &'static str,
    decode: fn(&mut FieldReader<'_>) -> Result<Custom, CodecError>,
    encode: fn(&Custom, &mut FieldWriter<'_>) -> Result<(), CodecError>,
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mapping").field(&self.type_name).finish()
    }
}

fn decode_erased<T: UserType>(reader: &mut FieldReader<'_>) -> Result<Custom, CodecError> {
    T::decode(reader).map(Custom::new)
}

fn encode_erased<T: UserType>(value: &Custom, writer: &mut FieldWriter<'_>) -> Result<(), CodecError> {
    match value.downcast_ref::<T>() {
        Some(value) => value.encode(writer),
        None => Err(CodecError::Mismatch { ty: T::TYPE_NAME.into(), value: "custom" }),
    }
}

/// Registered user type mappings.
#[derive(Debug, Default, Clone)]
pub struct UserTypes {
    mappings: HashMap<String, Mapping>,
}

impl UserTypes {
    pub fn new() -> UserTypes {
        UserTypes::default()
    }

    /// Register a mapping, replacing any previous one for the same name.
    pub fn register<T: UserType>(&mut self) -> &mut Self {
        self.mappings.insert(T::TYPE_NAME.to_owned(), Mapping {
            type_name: T::TYPE_NAME,
            decode: decode_erased::<T>,
            encode: encode_erased::<T>,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Schema qualified name first, then the bare name.
    pub(crate) fn get(&self, ty: &Type) -> Option<Mapping> {
        if self.mappings.is_empty() {
            return None;
        }
        let qualified = format!("{}.{}", ty.namespace(), ty.name());
        self.mappings
            .get(&qualified)
            .or_else(|| self.mappings.get(ty.name()))
            .copied()
    }
}

pub(super) fn decode(codec: &Codec, mapping: Mapping, format: PgFormat, raw: &[u8]) -> Result<Value, CodecError> {
    let mut reader = FieldReader::new(codec, format, raw)?;
    (mapping.decode)(&mut reader).map(Value::Custom)
}

pub(super) fn encode(
    codec: &Codec,
    mapping: Mapping,
    format: PgFormat,
    value: &Value,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let Value::Custom(custom) = value else {
        // plain values still go through the type structure
        return codec.codecs().structural(codec.ty().oid())?.encode(format, value, buf);
    };
    let mut writer = FieldWriter::new(codec, format, buf);
    (mapping.encode)(custom, &mut writer)?;
    writer.finish()
}

/// Decode wrapper of a [`UserType`] value.
#[derive(Debug, Clone, PartialEq)]
pub struct User<T>(pub T);

impl<T: UserType + Clone> Decode for User<T> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Custom(custom) => match custom.downcast_ref::<T>() {
                Some(value) => Ok(User(value.clone())),
                None => Err(DecodeError::Mismatch { expected: T::TYPE_NAME, found: "custom" }),
            },
            Value::Null => Err(DecodeError::Null),
            value => Err(DecodeError::Mismatch { expected: T::TYPE_NAME, found: value.kind_name() }),
        }
    }
}

impl<T: UserType> From<User<T>> for Value {
    fn from(value: User<T>) -> Self {
        Value::Custom(Custom::new(value.0))
    }
}

/// Rust enum mapped to a server enum by label.
///
/// Implemented by [`pg_enum!`][crate::pg_enum].
pub trait PgEnum: Sized {
    fn from_label(label: &str) -> Option<Self>;

    fn label(&self) -> &'static str;

    /// Decode from [`Value::Enum`] or [`Value::Text`].
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Enum(label) | Value::Text(label) => {
                Self::from_label(&label).ok_or(DecodeError::UnknownLabel(label))
            },
            Value::Null => Err(DecodeError::Null),
            value => Err(DecodeError::Mismatch { expected: "enum", found: value.kind_name() }),
        }
    }
}

/// Declare a rust enum mapped to a server enum.
///
/// ```
/// postwire::pg_enum! {
///     #[derive(Debug, PartialEq)]
///     pub enum Mood {
///         Sad = "sad",
///         Happy = "happy",
///     }
/// }
/// ```
#[macro_export]
macro_rules! pg_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident = $label:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($variant),*
        }

        impl $crate::codec::PgEnum for $name {
            fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some(Self::$variant),)*
                    _ => None,
                }
            }

            fn label(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)*
                }
            }
        }

        impl $crate::row::Decode for $name {
            fn decode(value: $crate::codec::Value) -> Result<Self, $crate::row::DecodeError> {
                <Self as $crate::codec::PgEnum>::from_value(value)
            }
        }

        impl From<$name> for $crate::codec::Value {
            fn from(value: $name) -> Self {
                $crate::codec::Value::Enum(<$name as $crate::codec::PgEnum>::label(&value).into())
            }
        }
    };
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        codec::Codecs,
        postgres::{Oid, oid},
        types::{Field, Kind, MemoryCatalog, Registry, TypeInfo},
    };

    const ADDRESS: Oid = 90_300;
    const MOOD: Oid = 90_301;
    const EMAIL: Oid = 90_302;

    #[derive(Debug, Clone, PartialEq)]
    struct Address {
        street: String,
        city: String,
    }

    impl UserType for Address {
        const TYPE_NAME: &'static str = "address";

        fn decode(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
            Ok(Address { street: reader.read()?, city: reader.read()? })
        }

        fn encode(&self, writer: &mut FieldWriter<'_>) -> Result<(), CodecError> {
            writer.write_value(self.street.as_str())?;
            writer.write_value(self.city.as_str())
        }
    }

    /// Mapped over a domain, read as one field.
    #[derive(Debug, Clone, PartialEq)]
    struct Email(String);

    impl UserType for Email {
        const TYPE_NAME: &'static str = "public.email";

        fn decode(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
            reader.read().map(Email)
        }

        fn encode(&self, writer: &mut FieldWriter<'_>) -> Result<(), CodecError> {
            writer.write_value(self.0.as_str())
        }
    }

    crate::pg_enum! {
        #[derive(Debug, PartialEq)]
        enum Mood {
            Sad = "sad",
            Happy = "happy",
        }
    }

    async fn codecs() -> Codecs {
        let registry = Arc::new(Registry::new());
        let mut catalog = MemoryCatalog::new();
        catalog
            .insert(ADDRESS, TypeInfo::new("address", Kind::Composite(vec![
                Field { name: "street".into(), oid: oid::TEXT },
                Field { name: "city".into(), oid: oid::TEXT },
            ])))
            .insert(MOOD, TypeInfo::new("mood", Kind::Enum(vec!["sad".into(), "happy".into()])))
            .insert(EMAIL, TypeInfo::new("email", Kind::Domain(oid::TEXT)));
        for oid in [ADDRESS, MOOD, EMAIL] {
            registry.resolve(oid, &mut catalog).await.unwrap();
        }

        let mut user = UserTypes::new();
        user.register::<Address>().register::<Email>();
        Codecs::with_user_types(registry, user)
    }

    fn easy_street() -> Address {
        Address { street: "123 Easy Street".into(), city: "Easy Town".into() }
    }

    #[tokio::test]
    async fn composite_text() {
        let codecs = codecs().await;
        let value = codecs
            .decode(ADDRESS, PgFormat::Text, Some(br#"("123 Easy Street","Easy Town")"#))
            .unwrap();
        let User(address) = User::<Address>::decode(value).unwrap();
        assert_eq!(address, easy_street());

        let raw = codecs.encode(ADDRESS, PgFormat::Text, &User(easy_street()).into()).unwrap().unwrap();
        assert_eq!(&raw[..], br#"("123 Easy Street","Easy Town")"#);
    }

    #[tokio::test]
    async fn composite_binary() {
        let codecs = codecs().await;
        let raw = codecs.encode(ADDRESS, PgFormat::Binary, &User(easy_street()).into()).unwrap().unwrap();
        assert_eq!(&raw[..4], 2i32.to_be_bytes());
        let value = codecs.decode(ADDRESS, PgFormat::Binary, Some(&raw)).unwrap();
        assert_eq!(User::<Address>::decode(value).unwrap().0, easy_street());

        // structured value still encodes without the mapping
        let plain = Value::Composite(vec![
            ("street".into(), Value::Text("1 Main".into())),
            ("city".into(), Value::Null),
        ]);
        assert!(codecs.encode(ADDRESS, PgFormat::Binary, &plain).unwrap().is_some());
    }

    #[tokio::test]
    async fn domain_mapping_by_qualified_name() {
        let codecs = codecs().await;
        let value = codecs.decode(EMAIL, PgFormat::Binary, Some(b"a@b.c")).unwrap();
        assert_eq!(User::<Email>::decode(value).unwrap().0, Email("a@b.c".into()));

        let raw = codecs.encode(EMAIL, PgFormat::Text, &User(Email("x@y.z".into())).into()).unwrap().unwrap();
        assert_eq!(&raw[..], b"x@y.z");
    }

    #[tokio::test]
    async fn field_count_checked() {
        let codecs = codecs().await;
        let err = codecs.decode(ADDRESS, PgFormat::Text, Some(b"(only)")).unwrap_err();
        assert!(matches!(err, CodecError::MalformedStructuredValue { .. }));
    }

    #[tokio::test]
    async fn enum_macro() {
        let codecs = codecs().await;
        let value = codecs.decode(MOOD, PgFormat::Binary, Some(b"happy")).unwrap();
        assert_eq!(Mood::decode(value).unwrap(), Mood::Happy);

        let raw = codecs.encode(MOOD, PgFormat::Binary, &Mood::Sad.into()).unwrap().unwrap();
        assert_eq!(&raw[..], b"sad");
        assert!(matches!(Mood::from_value(Value::Enum("meh".into())), Err(DecodeError::UnknownLabel(_))));
    }
}
