//! Composite and `record` codec.
//!
//! Binary layout:
//!
//! ```text
//! i32 count | count * (u32 oid, i32 len, bytes)
//! ```
use bytes::{Buf, BufMut, BytesMut};
use std::borrow::Cow;

use super::{Codec, CodecError, Value, text};
use crate::{
    ext::{UsizeExt, get_value, put_length_prefixed},
    postgres::{Oid, PgFormat, oid},
    row::Decode,
    types::Kind,
};

pub(super) fn decode(codec: &Codec, format: PgFormat, raw: &[u8]) -> Result<Value, CodecError> {
    let mut reader = FieldReader::new(codec, format, raw)?;
    let mut fields = Vec::with_capacity(reader.len());
    while let Some(name) = reader.next_name() {
        let name = name.to_owned();
        fields.push((name, reader.read_value()?));
    }
    Ok(Value::Composite(fields))
}

pub(super) fn encode(codec: &Codec, format: PgFormat, value: &Value, buf: &mut BytesMut) -> Result<(), CodecError> {
    let Value::Composite(fields) = value else {
        return Err(codec.mismatch(value));
    };
    let declared = codec.ty().fields();
    for ((name, _), field) in fields.iter().zip(declared) {
        if !name.is_empty() && name != &field.name {
            return Err(codec.malformed(format_args!("expected field {:?}, found {name:?}", field.name)));
        }
    }
    let mut writer = FieldWriter::new(codec, format, buf);
    for (_, value) in fields {
        writer.write(value)?;
    }
    writer.finish()
}

struct RawField<'a> {
    name: String,
    oid: Oid,
    raw: Option<Cow<'a, [u8]>>,
}

/// Sequential reader over the fields of a structured value.
///
/// Given to [`UserType::decode`][super::UserType::decode]. For composite types each
/// field is decoded with the codec of its declared type. Any other type is read as a
/// single field of the type itself.
pub struct FieldReader<'a> {
    codec: Codec<'a>,
    format: PgFormat,
    fields: Vec<RawField<'a>>,
    index: usize,
    single: bool,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(codec: &Codec<'a>, format: PgFormat, raw: &'a [u8]) -> Result<Self, CodecError> {
        let ty = codec.ty();
        let is_record = ty.oid() == oid::RECORD;
        if !is_record && !matches!(ty.kind(), Kind::Composite(_)) {
            return Ok(Self {
                codec: codec.clone(),
                format,
                fields: vec![RawField { name: ty.name().to_owned(), oid: ty.oid(), raw: Some(Cow::Borrowed(raw)) }],
                index: 0,
                single: true,
            });
        }

        let declared = ty.fields();
        let fields = match format {
            PgFormat::Binary => {
                let mut raw = raw;
                let count = raw.try_get_i32().map_err(|e| codec.malformed(e))?;
                let count = usize::try_from(count).map_err(|_| codec.malformed("negative field count"))?;
                if !is_record && count != declared.len() {
                    return Err(codec.malformed(format_args!("expected {} fields, found {count}", declared.len())));
                }
                let mut fields = Vec::with_capacity(count.min(raw.len() / 8));
                for i in 0..count {
                    let wire_oid = raw.try_get_u32().map_err(|e| codec.malformed(e))?;
                    let value = get_value(&mut raw).map_err(|e| codec.malformed(e))?;
                    let (name, oid) = match declared.get(i) {
                        Some(field) => (field.name.clone(), field.oid),
                        None => (format!("f{}", i + 1), wire_oid),
                    };
                    fields.push(RawField { name, oid, raw: value.map(Cow::Borrowed) });
                }
                if !raw.is_empty() {
                    return Err(codec.malformed(format_args!("{} trailing bytes", raw.len())));
                }
                fields
            },
            PgFormat::Text => {
                let raw = std::str::from_utf8(raw).map_err(CodecError::Utf8)?;
                let mut values = text::parse_record(raw).map_err(|e| codec.malformed(e))?;
                // `()` is both zero fields and one NULL field
                if declared.is_empty() && !is_record && values == [None] {
                    values.clear();
                }
                if !is_record && values.len() != declared.len() {
                    return Err(codec.malformed(format_args!(
                        "expected {} fields, found {}",
                        declared.len(),
                        values.len()
                    )));
                }
                values
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| {
                        let (name, oid) = match declared.get(i) {
                            Some(field) => (field.name.clone(), field.oid),
                            // field types of a text record are unknown
                            None => (format!("f{}", i + 1), oid::UNKNOWN),
                        };
                        RawField { name, oid, raw: value.map(|v| Cow::Owned(v.into_bytes())) }
                    })
                    .collect()
            },
        };

        Ok(Self { codec: codec.clone(), format, fields, index: 0, single: false })
    }

    /// Total number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields not yet read.
    pub fn remaining(&self) -> usize {
        self.fields.len() - self.index
    }

    /// Name of the next field.
    pub fn next_name(&self) -> Option<&str> {
        self.fields.get(self.index).map(|f| f.name.as_str())
    }

    /// Type of the next field.
    pub fn next_oid(&self) -> Option<Oid> {
        self.fields.get(self.index).map(|f| f.oid)
    }

    /// Decode the next field with the codec of its type.
    pub fn read_value(&mut self) -> Result<Value, CodecError> {
        let Some(field) = self.fields.get(self.index) else {
            return Err(self.codec.malformed(format_args!("no field left after {}", self.index)));
        };
        self.index += 1;
        let Some(raw) = &field.raw else {
            return Ok(Value::Null);
        };
        let codecs = self.codec.codecs();
        let codec = match self.single {
            true => codecs.structural(field.oid)?,
            false => codecs.codec(field.oid)?,
        };
        codec.decode(self.format, raw)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.read()
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        self.read()
    }

    /// Decode the next field into `T`.
    pub fn read<T: Decode>(&mut self) -> Result<T, CodecError> {
        let index = self.index;
        let value = self.read_value()?;
        T::decode(value).map_err(|source| CodecError::Field {
            ty: self.codec.ty().name().into(),
            index,
            source: Box::new(source),
        })
    }
}

/// Sequential writer of the fields of a structured value.
///
/// Given to [`UserType::encode`][super::UserType::encode], fields are written in
/// declared order.
pub struct FieldWriter<'a> {
    codec: Codec<'a>,
    format: PgFormat,
    buf: &'a mut BytesMut,
    text: Vec<Option<String>>,
    index: usize,
    single: bool,
}

impl<'a> FieldWriter<'a> {
    pub(crate) fn new(codec: &Codec<'a>, format: PgFormat, buf: &'a mut BytesMut) -> Self {
        let ty = codec.ty();
        let single = !matches!(ty.kind(), Kind::Composite(_));
        if !single && format == PgFormat::Binary {
            buf.put_i32(ty.fields().len().to_i32());
        }
        Self { codec: codec.clone(), format, buf, text: vec![], index: 0, single }
    }

    fn expected(&self) -> usize {
        match self.single {
            true => 1,
            false => self.codec.ty().fields().len(),
        }
    }

    /// Encode the next field.
    pub fn write_value(&mut self, value: impl Into<Value>) -> Result<(), CodecError> {
        self.write(&value.into())
    }

    pub fn write_null(&mut self) -> Result<(), CodecError> {
        self.write(&Value::Null)
    }

    pub(crate) fn write(&mut self, value: &Value) -> Result<(), CodecError> {
        if self.index >= self.expected() {
            return Err(self.codec.malformed(format_args!("expected {} fields", self.expected())));
        }
        let codecs = self.codec.codecs();
        let (oid, codec) = match self.single {
            true => (self.codec.ty().oid(), codecs.structural(self.codec.ty().oid())?),
            false => {
                let oid = self.codec.ty().fields()[self.index].oid;
                (oid, codecs.codec(oid)?)
            },
        };
        self.index += 1;

        match (self.format, self.single) {
            (PgFormat::Text, _) => self.text.push(codec.encode_text(value)?),
            (PgFormat::Binary, true) => match value {
                Value::Null => return Err(CodecError::UnexpectedNull),
                value => codec.encode(PgFormat::Binary, value, self.buf)?,
            },
            (PgFormat::Binary, false) => {
                self.buf.put_u32(oid);
                match value {
                    Value::Null => self.buf.put_i32(-1),
                    value => put_length_prefixed(self.buf, |buf| codec.encode(PgFormat::Binary, value, buf))?,
                }
            },
        }
        Ok(())
    }

    /// Check every field is written, and write text format.
    pub(crate) fn finish(self) -> Result<(), CodecError> {
        if self.index != self.expected() {
            return Err(self.codec.malformed(format_args!(
                "expected {} fields, written {}",
                self.expected(),
                self.index
            )));
        }
        if self.format == PgFormat::Text {
            match self.single {
                true => match &self.text[0] {
                    Some(text) => self.buf.extend_from_slice(text.as_bytes()),
                    None => return Err(CodecError::UnexpectedNull),
                },
                false => self.buf.extend_from_slice(text::write_record(&self.text).as_bytes()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        codec::Codecs,
        types::{Field, MemoryCatalog, Registry, TypeInfo},
    };

    const ADDRESS: Oid = 90_200;

    async fn codecs() -> Codecs {
        let registry = Arc::new(Registry::new());
        let mut catalog = MemoryCatalog::new();
        catalog.insert(ADDRESS, TypeInfo::new("address", Kind::Composite(vec![
            Field { name: "street".into(), oid: oid::TEXT },
            Field { name: "zip".into(), oid: oid::INT4 },
        ])));
        registry.resolve(ADDRESS, &mut catalog).await.unwrap();
        Codecs::new(registry)
    }

    fn address() -> Value {
        Value::Composite(vec![
            ("street".into(), Value::Text("123 Easy Street".into())),
            ("zip".into(), Value::Null),
        ])
    }

    #[tokio::test]
    async fn binary_layout() {
        let codecs = codecs().await;
        let raw = codecs.encode(ADDRESS, PgFormat::Binary, &address()).unwrap().unwrap();

        let mut expected = BytesMut::new();
        expected.put_i32(2);
        expected.put_u32(oid::TEXT);
        expected.put_i32(15);
        expected.put_slice(b"123 Easy Street");
        expected.put_u32(oid::INT4);
        expected.put_i32(-1);
        assert_eq!(&raw[..], &expected[..]);

        assert_eq!(codecs.decode(ADDRESS, PgFormat::Binary, Some(&raw)).unwrap(), address());
    }

    #[tokio::test]
    async fn text_literal() {
        let codecs = codecs().await;
        let raw = codecs.encode(ADDRESS, PgFormat::Text, &address()).unwrap().unwrap();
        assert_eq!(&raw[..], br#"("123 Easy Street",)"#);
        assert_eq!(codecs.decode(ADDRESS, PgFormat::Text, Some(&raw)).unwrap(), address());

        let err = codecs.decode(ADDRESS, PgFormat::Text, Some(b"(a,1,2)")).unwrap_err();
        assert!(matches!(err, CodecError::MalformedStructuredValue { .. }));
    }

    #[tokio::test]
    async fn anonymous_record() {
        let codecs = codecs().await;
        let mut raw = BytesMut::new();
        raw.put_i32(2);
        raw.put_u32(oid::INT4);
        raw.put_i32(4);
        raw.put_i32(7);
        raw.put_u32(oid::BOOL);
        raw.put_i32(1);
        raw.put_u8(1);

        let value = codecs.decode(oid::RECORD, PgFormat::Binary, Some(&raw)).unwrap();
        assert_eq!(value, Value::Composite(vec![
            ("f1".into(), Value::Int4(7)),
            ("f2".into(), Value::Bool(true)),
        ]));

        let value = codecs.decode(oid::RECORD, PgFormat::Text, Some(b"(7,t)")).unwrap();
        assert_eq!(value, Value::Composite(vec![
            ("f1".into(), Value::Text("7".into())),
            ("f2".into(), Value::Text("t".into())),
        ]));
    }

    #[tokio::test]
    async fn wrong_field_name() {
        let codecs = codecs().await;
        let value = Value::Composite(vec![("city".into(), Value::Null), ("zip".into(), Value::Null)]);
        let err = codecs.encode(ADDRESS, PgFormat::Binary, &value).unwrap_err();
        assert!(matches!(err, CodecError::MalformedStructuredValue { .. }));
    }
}
