//! Array codec.
//!
//! Binary layout:
//!
//! ```text
//! i32 ndim | i32 has_null | u32 element oid | ndim * (i32 len, i32 lower) | elements
//! ```
use bytes::{Buf, BufMut, BytesMut};

use super::{Array, Codec, CodecError, Dimension, Value, text};
use crate::{
    ext::{UsizeExt, get_value, put_length_prefixed},
    postgres::{Oid, PgFormat},
};

/// Postgres `MAXDIM`.
const MAX_DIMS: i32 = 6;

pub(super) fn decode(codec: &Codec, elem: Oid, format: PgFormat, raw: &[u8]) -> Result<Value, CodecError> {
    let elem_codec = codec.codecs().codec(elem)?;
    let array = match format {
        PgFormat::Binary => decode_binary(codec, &elem_codec, raw)?,
        PgFormat::Text => {
            let raw = std::str::from_utf8(raw).map_err(CodecError::Utf8)?;
            // element type owns the delimiter, e.g. `box` uses `;`
            let literal = text::parse_array(raw, elem_codec.ty().delimiter()).map_err(|e| codec.malformed(e))?;
            let elements = literal
                .elements
                .iter()
                .map(|e| match e {
                    Some(e) => elem_codec.decode(PgFormat::Text, e.as_bytes()),
                    None => Ok(Value::Null),
                })
                .collect::<Result<_, _>>()?;
            Array { dims: literal.dims, elements }
        },
    };
    Ok(Value::Array(array))
}

fn decode_binary(codec: &Codec, elem_codec: &Codec, mut raw: &[u8]) -> Result<Array, CodecError> {
    let ndim = raw.try_get_i32().map_err(|e| codec.malformed(e))?;
    if !(0..=MAX_DIMS).contains(&ndim) {
        return Err(codec.malformed(format_args!("invalid number of dimensions {ndim}")));
    }
    let _has_null = raw.try_get_i32().map_err(|e| codec.malformed(e))?;
    let _elem_oid = raw.try_get_u32().map_err(|e| codec.malformed(e))?;

    let mut dims = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let len = raw.try_get_i32().map_err(|e| codec.malformed(e))?;
        let lower = raw.try_get_i32().map_err(|e| codec.malformed(e))?;
        if len < 0 {
            return Err(codec.malformed(format_args!("negative dimension length {len}")));
        }
        dims.push(Dimension { len, lower });
    }

    let count = match dims.is_empty() {
        true => 0,
        false => dims
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.len as usize))
            .ok_or_else(|| codec.malformed("too many elements"))?,
    };

    // each element takes at least its length prefix
    let mut elements = Vec::with_capacity(count.min(raw.len() / 4));
    for _ in 0..count {
        let value = match get_value(&mut raw).map_err(|e| codec.malformed(e))? {
            Some(value) => elem_codec.decode(PgFormat::Binary, value)?,
            None => Value::Null,
        };
        elements.push(value);
    }

    if !raw.is_empty() {
        return Err(codec.malformed(format_args!("{} trailing bytes", raw.len())));
    }

    Ok(Array { dims, elements })
}

pub(super) fn encode(
    codec: &Codec,
    elem: Oid,
    format: PgFormat,
    value: &Value,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let Value::Array(array) = value else {
        return Err(codec.mismatch(value));
    };
    if array.declared_len() != array.elements.len() {
        return Err(codec.malformed(format_args!(
            "dimensions declare {} elements, found {}",
            array.declared_len(),
            array.elements.len(),
        )));
    }
    let elem_codec = codec.codecs().codec(elem)?;

    match format {
        PgFormat::Binary => {
            buf.put_i32(array.dims.len().to_i32());
            buf.put_i32(array.elements.iter().any(Value::is_null) as i32);
            buf.put_u32(elem);
            for dim in &array.dims {
                buf.put_i32(dim.len);
                buf.put_i32(dim.lower);
            }
            for element in &array.elements {
                match element {
                    Value::Null => buf.put_i32(-1),
                    element => put_length_prefixed(buf, |buf| elem_codec.encode(PgFormat::Binary, element, buf))?,
                }
            }
        },
        PgFormat::Text => {
            let elements = array
                .elements
                .iter()
                .map(|e| elem_codec.encode_text(e))
                .collect::<Result<Vec<_>, _>>()?;
            let literal = text::write_array(&array.dims, &elements, elem_codec.ty().delimiter());
            buf.extend_from_slice(literal.as_bytes());
        },
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        codec::Codecs,
        postgres::oid,
        types::Registry,
    };

    fn codecs() -> Codecs {
        Codecs::new(Arc::new(Registry::new()))
    }

    #[test]
    fn binary_with_null() {
        let mut raw = BytesMut::new();
        raw.put_i32(1);
        raw.put_i32(1);
        raw.put_u32(oid::INT4);
        raw.put_i32(3);
        raw.put_i32(1);
        raw.put_i32(4);
        raw.put_i32(10);
        raw.put_i32(-1);
        raw.put_i32(4);
        raw.put_i32(30);

        let codecs = codecs();
        let value = codecs.decode(oid::INT4_ARRAY, PgFormat::Binary, Some(&raw)).unwrap();
        let expected = Value::Array(vec![Some(10), None, Some(30)].into());
        assert_eq!(value, expected);

        let encoded = codecs.encode(oid::INT4_ARRAY, PgFormat::Binary, &expected).unwrap().unwrap();
        assert_eq!(&encoded[..], &raw[..]);
    }

    #[test]
    fn text_multi_dimension() {
        let codecs = codecs();
        let value = codecs.decode(oid::TEXT_ARRAY, PgFormat::Text, Some(br#"{{a,"b c"},{NULL,d}}"#)).unwrap();
        let Value::Array(array) = &value else { panic!("not an array: {value:?}") };
        assert_eq!(array.dims, [Dimension { len: 2, lower: 1 }, Dimension { len: 2, lower: 1 }]);
        assert_eq!(array.elements[1], Value::Text("b c".into()));
        assert_eq!(array.elements[2], Value::Null);

        let encoded = codecs.encode(oid::TEXT_ARRAY, PgFormat::Text, &value).unwrap().unwrap();
        assert_eq!(&encoded[..], br#"{{a,"b c"},{NULL,d}}"#);
    }

    #[test]
    fn empty_array() {
        let codecs = codecs();
        let empty = Value::Array(Array::from_vec(vec![]));
        let raw = codecs.encode(oid::INT8_ARRAY, PgFormat::Binary, &empty).unwrap().unwrap();
        assert_eq!(codecs.decode(oid::INT8_ARRAY, PgFormat::Binary, Some(&raw)).unwrap(), empty);
        assert_eq!(codecs.decode(oid::INT8_ARRAY, PgFormat::Text, Some(b"{}")).unwrap(), empty);
    }

    #[test]
    fn malformed() {
        let codecs = codecs();
        let ragged = codecs.decode(oid::INT4_ARRAY, PgFormat::Text, Some(b"{{1,2},{3}}"));
        assert!(matches!(ragged, Err(CodecError::MalformedStructuredValue { .. })));

        let mismatch = Value::Array(Array { dims: vec![Dimension { len: 3, lower: 1 }], elements: vec![Value::Int4(1)] });
        let err = codecs.encode(oid::INT4_ARRAY, PgFormat::Binary, &mismatch).unwrap_err();
        assert!(matches!(err, CodecError::MalformedStructuredValue { .. }));

        let mut raw = BytesMut::new();
        raw.put_i32(7);
        let err = codecs.decode(oid::INT4_ARRAY, PgFormat::Binary, Some(&raw)).unwrap_err();
        assert!(matches!(err, CodecError::MalformedStructuredValue { .. }));
    }
}
