//! Range and multirange codec.
//!
//! Binary range is a flag byte followed by the present bounds, each `i32` length
//! prefixed. Binary multirange is an `i32` count of length prefixed ranges.
use bytes::{Buf, BufMut, BytesMut};
use std::ops::Bound;

use super::{
    Codec, CodecError, Range, Value,
    text::{self, RangeLiteral},
};
use crate::{
    ext::{UsizeExt, get_value, put_length_prefixed},
    postgres::{Oid, PgFormat},
};

const EMPTY: u8 = 0x01;
const LB_INC: u8 = 0x02;
const UB_INC: u8 = 0x04;
const LB_INF: u8 = 0x08;
const UB_INF: u8 = 0x10;

pub(super) fn decode_range(codec: &Codec, elem: Oid, format: PgFormat, raw: &[u8]) -> Result<Value, CodecError> {
    let elem_codec = codec.codecs().codec(elem)?;
    let range = match format {
        PgFormat::Binary => range_binary(codec, &elem_codec, raw)?,
        PgFormat::Text => {
            let raw = std::str::from_utf8(raw).map_err(CodecError::Utf8)?;
            let literal = text::parse_range(raw).map_err(|e| codec.malformed(e))?;
            range_literal(&elem_codec, literal)?
        },
    };
    Ok(Value::Range(Box::new(range)))
}

fn range_binary(codec: &Codec, elem_codec: &Codec, mut raw: &[u8]) -> Result<Range, CodecError> {
    let flags = raw.try_get_u8().map_err(|e| codec.malformed(e))?;
    if flags & EMPTY != 0 {
        return match raw.is_empty() {
            true => Ok(Range::Empty),
            false => Err(codec.malformed("empty range with bounds")),
        };
    }

    let mut bound = |infinite: u8, inclusive: u8| -> Result<Bound<Value>, CodecError> {
        if flags & infinite != 0 {
            return Ok(Bound::Unbounded);
        }
        let Some(value) = get_value(&mut raw).map_err(|e| codec.malformed(e))? else {
            return Err(codec.malformed("NULL range bound"));
        };
        let value = elem_codec.decode(PgFormat::Binary, value)?;
        match flags & inclusive != 0 {
            true => Ok(Bound::Included(value)),
            false => Ok(Bound::Excluded(value)),
        }
    };
    let lower = bound(LB_INF, LB_INC)?;
    let upper = bound(UB_INF, UB_INC)?;

    if !raw.is_empty() {
        return Err(codec.malformed(format_args!("{} trailing bytes", raw.len())));
    }
    Ok(Range::Bounds { lower, upper })
}

fn range_literal(elem_codec: &Codec, literal: RangeLiteral) -> Result<Range, CodecError> {
    let RangeLiteral::Bounds { lower, lower_inclusive, upper, upper_inclusive } = literal else {
        return Ok(Range::Empty);
    };
    let bound = |value: Option<String>, inclusive: bool| -> Result<Bound<Value>, CodecError> {
        let Some(value) = value else {
            return Ok(Bound::Unbounded);
        };
        let value = elem_codec.decode(PgFormat::Text, value.as_bytes())?;
        match inclusive {
            true => Ok(Bound::Included(value)),
            false => Ok(Bound::Excluded(value)),
        }
    };
    Ok(Range::Bounds { lower: bound(lower, lower_inclusive)?, upper: bound(upper, upper_inclusive)? })
}

pub(super) fn encode_range(
    codec: &Codec,
    elem: Oid,
    format: PgFormat,
    value: &Value,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let Value::Range(range) = value else {
        return Err(codec.mismatch(value));
    };
    let elem_codec = codec.codecs().codec(elem)?;
    match format {
        PgFormat::Binary => range_to_binary(&elem_codec, range, buf),
        PgFormat::Text => {
            let mut out = String::new();
            text::write_range(&range_to_literal(&elem_codec, range)?, &mut out);
            buf.extend_from_slice(out.as_bytes());
            Ok(())
        },
    }
}

fn range_to_binary(elem_codec: &Codec, range: &Range, buf: &mut BytesMut) -> Result<(), CodecError> {
    let Range::Bounds { lower, upper } = range else {
        buf.put_u8(EMPTY);
        return Ok(());
    };
    let flags = |bound: &Bound<Value>, infinite: u8, inclusive: u8| match bound {
        Bound::Included(_) => inclusive,
        Bound::Excluded(_) => 0,
        Bound::Unbounded => infinite,
    };
    buf.put_u8(flags(lower, LB_INF, LB_INC) | flags(upper, UB_INF, UB_INC));
    for bound in [lower, upper] {
        if let Bound::Included(value) | Bound::Excluded(value) = bound {
            put_length_prefixed(buf, |buf| elem_codec.encode(PgFormat::Binary, value, buf))?;
        }
    }
    Ok(())
}

fn range_to_literal(elem_codec: &Codec, range: &Range) -> Result<RangeLiteral, CodecError> {
    let Range::Bounds { lower, upper } = range else {
        return Ok(RangeLiteral::Empty);
    };
    let bound = |bound: &Bound<Value>| -> Result<(Option<String>, bool), CodecError> {
        match bound {
            Bound::Included(value) => Ok((Some(text_bound(elem_codec, value)?), true)),
            Bound::Excluded(value) => Ok((Some(text_bound(elem_codec, value)?), false)),
            Bound::Unbounded => Ok((None, false)),
        }
    };
    let (lower, lower_inclusive) = bound(lower)?;
    let (upper, upper_inclusive) = bound(upper)?;
    Ok(RangeLiteral::Bounds { lower, lower_inclusive, upper, upper_inclusive })
}

fn text_bound(elem_codec: &Codec, value: &Value) -> Result<String, CodecError> {
    elem_codec.encode_text(value)?.ok_or(CodecError::UnexpectedNull)
}

pub(super) fn decode_multirange(
    codec: &Codec,
    range: Oid,
    format: PgFormat,
    raw: &[u8],
) -> Result<Value, CodecError> {
    let range_codec = codec.codecs().codec(range)?;
    let elem = range_codec.ty().element().ok_or(CodecError::Unresolved(range))?;
    let elem_codec = codec.codecs().codec(elem)?;

    let ranges = match format {
        PgFormat::Binary => {
            let mut raw = raw;
            let count = raw.try_get_i32().map_err(|e| codec.malformed(e))?;
            let count = usize::try_from(count).map_err(|_| codec.malformed("negative range count"))?;
            let mut ranges = Vec::with_capacity(count.min(raw.len() / 5));
            for _ in 0..count {
                let Some(value) = get_value(&mut raw).map_err(|e| codec.malformed(e))? else {
                    return Err(codec.malformed("NULL range"));
                };
                ranges.push(range_binary(&range_codec, &elem_codec, value)?);
            }
            if !raw.is_empty() {
                return Err(codec.malformed(format_args!("{} trailing bytes", raw.len())));
            }
            ranges
        },
        PgFormat::Text => {
            let raw = std::str::from_utf8(raw).map_err(CodecError::Utf8)?;
            text::parse_multirange(raw)
                .map_err(|e| codec.malformed(e))?
                .into_iter()
                .map(|literal| range_literal(&elem_codec, literal))
                .collect::<Result<_, _>>()?
        },
    };
    Ok(Value::MultiRange(ranges))
}

pub(super) fn encode_multirange(
    codec: &Codec,
    range: Oid,
    format: PgFormat,
    value: &Value,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let Value::MultiRange(ranges) = value else {
        return Err(codec.mismatch(value));
    };
    let range_codec = codec.codecs().codec(range)?;
    let elem = range_codec.ty().element().ok_or(CodecError::Unresolved(range))?;
    let elem_codec = codec.codecs().codec(elem)?;

    match format {
        PgFormat::Binary => {
            buf.put_i32(ranges.len().to_i32());
            for range in ranges {
                put_length_prefixed(buf, |buf| range_to_binary(&elem_codec, range, buf))?;
            }
        },
        PgFormat::Text => {
            let mut out = String::from("{");
            for (i, range) in ranges.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                text::write_range(&range_to_literal(&elem_codec, range)?, &mut out);
            }
            out.push('}');
            buf.extend_from_slice(out.as_bytes());
        },
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use time::macros::date;

    use super::*;
    use crate::{codec::Codecs, postgres::oid, types::Registry};

    fn codecs() -> Codecs {
        Codecs::new(Arc::new(Registry::new()))
    }

    fn int4range(lower: Bound<i32>, upper: Bound<i32>) -> Value {
        Value::from(Range::Bounds { lower: lower.map(Value::Int4), upper: upper.map(Value::Int4) })
    }

    #[test]
    fn binary_flags() {
        let codecs = codecs();
        let value = int4range(Bound::Included(1), Bound::Unbounded);
        let raw = codecs.encode(oid::INT4RANGE, PgFormat::Binary, &value).unwrap().unwrap();
        assert_eq!(&raw[..], [LB_INC | UB_INF, 0, 0, 0, 4, 0, 0, 0, 1]);
        assert_eq!(codecs.decode(oid::INT4RANGE, PgFormat::Binary, Some(&raw)).unwrap(), value);

        let empty = codecs.encode(oid::INT4RANGE, PgFormat::Binary, &Value::from(Range::Empty)).unwrap().unwrap();
        assert_eq!(&empty[..], [EMPTY]);
    }

    #[test]
    fn text_form() {
        let codecs = codecs();
        let value = codecs.decode(oid::INT4RANGE, PgFormat::Text, Some(b"[1,5)")).unwrap();
        assert_eq!(value, int4range(Bound::Included(1), Bound::Excluded(5)));

        let value = codecs.decode(oid::DATERANGE, PgFormat::Text, Some(b"(,2024-01-01]")).unwrap();
        let expected = Range::Bounds { lower: Bound::Unbounded, upper: Bound::Included(Value::Date(date!(2024-01-01))) };
        assert_eq!(value, Value::from(expected));
        let raw = codecs.encode(oid::DATERANGE, PgFormat::Text, &value).unwrap().unwrap();
        assert_eq!(&raw[..], b"(,2024-01-01]");

        assert_eq!(codecs.decode(oid::INT4RANGE, PgFormat::Text, Some(b"empty")).unwrap(), Value::from(Range::Empty));
    }

    #[test]
    fn multirange() {
        let codecs = codecs();
        let value = codecs.decode(oid::INT4MULTIRANGE, PgFormat::Text, Some(b"{[1,3),[5,7)}")).unwrap();
        let Value::MultiRange(ranges) = &value else { panic!("not a multirange: {value:?}") };
        assert_eq!(ranges.len(), 2);

        let raw = codecs.encode(oid::INT4MULTIRANGE, PgFormat::Binary, &value).unwrap().unwrap();
        assert_eq!(&raw[..4], 2i32.to_be_bytes());
        assert_eq!(codecs.decode(oid::INT4MULTIRANGE, PgFormat::Binary, Some(&raw)).unwrap(), value);

        let raw = codecs.encode(oid::INT4MULTIRANGE, PgFormat::Text, &value).unwrap().unwrap();
        assert_eq!(&raw[..], b"{[1,3),[5,7)}");
    }
}
