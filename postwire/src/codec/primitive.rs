//! Codecs of builtin scalar types.
use bytes::{BufMut, Bytes, BytesMut};
use std::{borrow::Cow, fmt::Write};
use time::{
    Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcDateTime, UtcOffset,
    format_description::BorrowedFormatItem as I, macros::format_description,
};

use super::{CodecError, Interval, Value};
use crate::types::Type;

/// Builtin scalar type with a dedicated codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    /// `oid` and the other 4 byte unsigned identifiers, e.g. `regtype`, `xid`.
    Oid,
    Char,
    Text,
    Bytea,
    Uuid,
    Json,
    Jsonb,
    Numeric,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    /// `unknown`, string literal without type.
    Unknown,
}

impl Primitive {
    /// Primitive of a `pg_catalog` type.
    pub fn from_type(ty: &Type) -> Option<Primitive> {
        if ty.namespace() != "pg_catalog" {
            return None;
        }
        let primitive = match ty.name() {
            "bool" => Self::Bool,
            "int2" => Self::Int2,
            "int4" => Self::Int4,
            "int8" => Self::Int8,
            "float4" => Self::Float4,
            "float8" => Self::Float8,
            "oid" | "regproc" | "regprocedure" | "regoper" | "regoperator" | "regclass" | "regtype"
            | "regconfig" | "regdictionary" | "regnamespace" | "regrole" | "xid" | "cid" => Self::Oid,
            "char" => Self::Char,
            "text" | "varchar" | "bpchar" | "name" => Self::Text,
            "bytea" => Self::Bytea,
            "uuid" => Self::Uuid,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            "numeric" => Self::Numeric,
            "date" => Self::Date,
            "time" => Self::Time,
            "timetz" => Self::TimeTz,
            "timestamp" => Self::Timestamp,
            "timestamptz" => Self::TimestampTz,
            "interval" => Self::Interval,
            "unknown" => Self::Unknown,
            _ => return None,
        };
        Some(primitive)
    }

    /// Whether binary format is supported.
    pub fn binary(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int2 => "int2",
            Self::Int4 => "int4",
            Self::Int8 => "int8",
            Self::Float4 => "float4",
            Self::Float8 => "float8",
            Self::Oid => "oid",
            Self::Char => "char",
            Self::Text => "text",
            Self::Bytea => "bytea",
            Self::Uuid => "uuid",
            Self::Json => "json",
            Self::Jsonb => "jsonb",
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Time => "time",
            Self::TimeTz => "timetz",
            Self::Timestamp => "timestamp",
            Self::TimestampTz => "timestamptz",
            Self::Interval => "interval",
            Self::Unknown => "unknown",
        }
    }

    fn invalid(self, reason: impl ToString) -> CodecError {
        CodecError::InvalidValue { ty: self.name().into(), reason: reason.to_string() }
    }

    fn overflow(self) -> CodecError {
        CodecError::Overflow(self.name().into())
    }

    fn mismatch(self, value: &Value) -> CodecError {
        CodecError::Mismatch { ty: self.name().into(), value: value.kind_name() }
    }

    fn fixed<const N: usize>(self, raw: &[u8]) -> Result<[u8; N], CodecError> {
        raw.try_into()
            .map_err(|_| self.invalid(format_args!("expected {N} bytes, found {}", raw.len())))
    }

    fn utf8(self, raw: &[u8]) -> Result<String, CodecError> {
        match std::str::from_utf8(raw) {
            Ok(s) => Ok(s.to_owned()),
            Err(err) => Err(CodecError::Utf8(err)),
        }
    }

    /// Decode binary format.
    pub fn decode_binary(self, raw: &[u8]) -> Result<Value, CodecError> {
        let value = match self {
            Self::Bool => Value::Bool(self.fixed::<1>(raw)?[0] != 0),
            Self::Int2 => Value::Int2(i16::from_be_bytes(self.fixed(raw)?)),
            Self::Int4 => Value::Int4(i32::from_be_bytes(self.fixed(raw)?)),
            Self::Int8 => Value::Int8(i64::from_be_bytes(self.fixed(raw)?)),
            Self::Float4 => Value::Float4(f32::from_be_bytes(self.fixed(raw)?)),
            Self::Float8 => Value::Float8(f64::from_be_bytes(self.fixed(raw)?)),
            Self::Oid => Value::Oid(u32::from_be_bytes(self.fixed(raw)?)),
            Self::Char => Value::Char(i8::from_be_bytes(self.fixed(raw)?)),
            Self::Text | Self::Unknown => Value::Text(self.utf8(raw)?),
            Self::Bytea => Value::Bytea(Bytes::copy_from_slice(raw)),
            Self::Uuid => Value::Uuid(self.fixed(raw)?),
            Self::Json => Value::Json(self.utf8(raw)?),
            Self::Jsonb => match raw.split_first() {
                Some((1, doc)) => Value::Json(self.utf8(doc)?),
                Some((v, _)) => return Err(self.invalid(format_args!("unsupported jsonb version {v}"))),
                None => return Err(self.invalid("empty jsonb")),
            },
            Self::Numeric => Value::Numeric(self.numeric_from_binary(raw)?),
            Self::Date => Value::Date(self.date_from_days(i32::from_be_bytes(self.fixed(raw)?))?),
            Self::Time => Value::Time(self.time_from_micros(i64::from_be_bytes(self.fixed(raw)?))?),
            Self::TimeTz => {
                let raw = self.fixed::<12>(raw)?;
                let (micros, zone) = raw.split_at(8);
                let time = self.time_from_micros(i64::from_be_bytes(self.fixed(micros)?))?;
                Value::TimeTz(time, self.offset_from_zone(i32::from_be_bytes(self.fixed(zone)?))?)
            },
            Self::Interval => {
                let raw = self.fixed::<16>(raw)?;
                let (micros, rest) = raw.split_at(8);
                let (days, months) = rest.split_at(4);
                Value::Interval(Interval {
                    months: i32::from_be_bytes(self.fixed(months)?),
                    days: i32::from_be_bytes(self.fixed(days)?),
                    micros: i64::from_be_bytes(self.fixed(micros)?),
                })
            },
            Self::Timestamp => Value::Timestamp(self.timestamp_from_micros(i64::from_be_bytes(self.fixed(raw)?))?),
            Self::TimestampTz => {
                let ts = self.timestamp_from_micros(i64::from_be_bytes(self.fixed(raw)?))?;
                Value::TimestampTz(to_utc(ts))
            },
        };
        Ok(value)
    }

    /// Decode text format.
    pub fn decode_text(self, raw: &str) -> Result<Value, CodecError> {
        let value = match self {
            Self::Bool => match raw {
                "t" | "true" => Value::Bool(true),
                "f" | "false" => Value::Bool(false),
                _ => return Err(self.invalid(format_args!("{raw:?}"))),
            },
            Self::Int2 => Value::Int2(raw.trim().parse().map_err(|e| self.invalid(e))?),
            Self::Int4 => Value::Int4(raw.trim().parse().map_err(|e| self.invalid(e))?),
            Self::Int8 => Value::Int8(raw.trim().parse().map_err(|e| self.invalid(e))?),
            Self::Float4 => Value::Float4(raw.trim().parse().map_err(|e| self.invalid(e))?),
            Self::Float8 => Value::Float8(raw.trim().parse().map_err(|e| self.invalid(e))?),
            Self::Oid => Value::Oid(raw.trim().parse().map_err(|e| self.invalid(e))?),
            Self::Char => Value::Char(self.char_from_text(raw)?),
            Self::Text | Self::Unknown => Value::Text(raw.to_owned()),
            Self::Bytea => Value::Bytea(self.bytea_from_text(raw)?),
            Self::Uuid => Value::Uuid(parse_uuid(raw).ok_or_else(|| self.invalid(format_args!("{raw:?}")))?),
            Self::Json | Self::Jsonb => Value::Json(raw.to_owned()),
            Self::Numeric => Value::Numeric(raw.to_owned()),
            Self::Date => Value::Date(self.parse_date(raw)?),
            Self::Time => Value::Time(Time::parse(raw, TIME).map_err(|e| self.invalid(e))?),
            Self::TimeTz => {
                let (time, offset) = self.parse_timetz(raw)?;
                Value::TimeTz(time, offset)
            },
            Self::Timestamp => Value::Timestamp(self.parse_timestamp(raw)?),
            Self::TimestampTz => Value::TimestampTz(self.parse_timestamptz(raw)?),
            Self::Interval => Value::Interval(self.parse_interval(raw)?),
        };
        Ok(value)
    }

    /// Encode binary format.
    pub fn encode_binary(self, value: &Value, buf: &mut BytesMut) -> Result<(), CodecError> {
        match (self, value) {
            (Self::Bool, Value::Bool(b)) => buf.put_u8(*b as u8),
            (Self::Int2, v) => buf.put_i16(self.integer(v)?),
            (Self::Int4, v) => buf.put_i32(self.integer(v)?),
            (Self::Int8, v) => buf.put_i64(self.integer(v)?),
            (Self::Oid, v) => buf.put_u32(self.integer(v)?),
            (Self::Float4, v) => buf.put_f32(self.float(v)? as f32),
            (Self::Float8, v) => buf.put_f64(self.float(v)?),
            (Self::Char, v) => buf.put_i8(self.char(v)?),
            (Self::Bytea, Value::Bytea(b)) => buf.put_slice(b),
            (Self::Uuid, Value::Uuid(u)) => buf.put_slice(u),
            (Self::Uuid, Value::Text(s)) => {
                buf.put_slice(&parse_uuid(s).ok_or_else(|| self.invalid(format_args!("{s:?}")))?)
            },
            (Self::Jsonb, Value::Json(s) | Value::Text(s)) => {
                buf.put_u8(1);
                buf.put_slice(s.as_bytes());
            },
            (Self::Json, Value::Json(s) | Value::Text(s)) => buf.put_slice(s.as_bytes()),
            (Self::Text | Self::Unknown, v) => match v.as_str() {
                Some(s) => buf.put_slice(s.as_bytes()),
                None => return Err(self.mismatch(v)),
            },
            (Self::Numeric, Value::Numeric(s) | Value::Text(s)) => self.numeric_to_binary(s, buf)?,
            (Self::Numeric, v @ (Value::Int2(_) | Value::Int4(_) | Value::Int8(_))) => {
                self.numeric_to_binary(&self.integer::<i64>(v)?.to_string(), buf)?
            },
            (Self::Numeric, v @ (Value::Float4(_) | Value::Float8(_))) => {
                self.numeric_to_binary(&float_text(self.float(v)?), buf)?
            },
            (Self::Date, Value::Date(d)) => buf.put_i32(self.date_to_days(*d)?),
            (Self::Time, Value::Time(t)) => buf.put_i64(time_to_micros(*t)),
            (Self::TimeTz, Value::TimeTz(t, offset)) => {
                buf.put_i64(time_to_micros(*t));
                // seconds west of utc
                buf.put_i32(-offset.whole_seconds());
            },
            (Self::Interval, Value::Interval(iv)) => {
                buf.put_i64(iv.micros);
                buf.put_i32(iv.days);
                buf.put_i32(iv.months);
            },
            (Self::Timestamp, Value::Timestamp(ts)) => buf.put_i64(self.timestamp_to_micros(*ts)?),
            (Self::TimestampTz, Value::TimestampTz(ts)) => {
                buf.put_i64(self.timestamp_to_micros(from_utc(*ts))?)
            },
            (Self::TimestampTz, Value::Timestamp(ts)) => buf.put_i64(self.timestamp_to_micros(*ts)?),
            (_, v) => return Err(self.mismatch(v)),
        }
        Ok(())
    }

    /// Encode text format.
    pub fn encode_text(self, value: &Value) -> Result<String, CodecError> {
        let text = match (self, value) {
            (Self::Bool, Value::Bool(b)) => (if *b { "t" } else { "f" }).into(),
            (Self::Int2, v) => self.integer::<i16>(v)?.to_string(),
            (Self::Int4, v) => self.integer::<i32>(v)?.to_string(),
            (Self::Int8, v) => self.integer::<i64>(v)?.to_string(),
            (Self::Oid, v) => self.integer::<u32>(v)?.to_string(),
            (Self::Float4 | Self::Float8, v) => float_text(self.float(v)?),
            (Self::Char, v) => char_text(self.char(v)?),
            (Self::Bytea, Value::Bytea(b)) => {
                let mut out = String::with_capacity(2 + b.len() * 2);
                out.push_str("\\x");
                for byte in b.iter() {
                    let _ = write!(out, "{byte:02x}");
                }
                out
            },
            (Self::Uuid, Value::Uuid(u)) => uuid_text(u),
            (Self::Json | Self::Jsonb, Value::Json(s)) => s.clone(),
            (Self::Numeric, Value::Numeric(s)) => s.clone(),
            (Self::Numeric, v @ (Value::Int2(_) | Value::Int4(_) | Value::Int8(_))) => {
                self.integer::<i64>(v)?.to_string()
            },
            (Self::Numeric, v @ (Value::Float4(_) | Value::Float8(_))) => float_text(self.float(v)?),
            (Self::Text | Self::Unknown, v) => match v.as_str() {
                Some(s) => s.to_owned(),
                None => return Err(self.mismatch(v)),
            },
            (Self::Date, Value::Date(d)) => self.format_date(*d)?,
            (Self::Time, Value::Time(t)) => self.format(*t, TIME_SECOND, TIME_MICRO)?,
            (Self::TimeTz, Value::TimeTz(t, offset)) => {
                let mut out = self.format(*t, TIME_SECOND, TIME_MICRO)?;
                out.push_str(&self.format_offset(*offset)?);
                out
            },
            (Self::Interval, Value::Interval(iv)) => interval_text(*iv),
            (Self::Timestamp, Value::Timestamp(ts)) => self.format_timestamp(*ts, "")?,
            (Self::TimestampTz, Value::TimestampTz(ts)) => self.format_timestamp(from_utc(*ts), "+00")?,
            (Self::TimestampTz, Value::Timestamp(ts)) => self.format_timestamp(*ts, "+00")?,
            (_, v) => return Err(self.mismatch(v)),
        };
        Ok(text)
    }

    fn integer<T: TryFrom<i64>>(self, value: &Value) -> Result<T, CodecError> {
        let int = value.as_i64().ok_or_else(|| self.mismatch(value))?;
        T::try_from(int).map_err(|_| self.overflow())
    }

    fn float(self, value: &Value) -> Result<f64, CodecError> {
        match *value {
            Value::Float4(f) => Ok(f.into()),
            Value::Float8(f) => Ok(f),
            Value::Int2(i) => Ok(i.into()),
            Value::Int4(i) => Ok(i.into()),
            Value::Int8(i) => Ok(i as f64),
            _ => Err(self.mismatch(value)),
        }
    }

    fn char(self, value: &Value) -> Result<i8, CodecError> {
        match value {
            Value::Char(c) => Ok(*c),
            Value::Text(s) if s.len() == 1 => Ok(s.as_bytes()[0] as i8),
            v => Err(self.mismatch(v)),
        }
    }

    fn char_from_text(self, raw: &str) -> Result<i8, CodecError> {
        match raw.as_bytes() {
            [] => Ok(0),
            [b] => Ok(*b as i8),
            // non ascii byte as octal escape
            [b'\\', digits @ ..] if digits.len() == 3 => std::str::from_utf8(digits)
                .ok()
                .and_then(|d| u8::from_str_radix(d, 8).ok())
                .map(|b| b as i8)
                .ok_or_else(|| self.invalid(format_args!("{raw:?}"))),
            _ => Err(self.invalid(format_args!("{raw:?}"))),
        }
    }

    fn bytea_from_text(self, raw: &str) -> Result<Bytes, CodecError> {
        if let Some(hex) = raw.strip_prefix("\\x") {
            if hex.len() % 2 != 0 {
                return Err(self.invalid("odd number of hex digits"));
            }
            let out = hex
                .as_bytes()
                .chunks(2)
                .map(|pair| {
                    std::str::from_utf8(pair)
                        .ok()
                        .and_then(|p| u8::from_str_radix(p, 16).ok())
                })
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(|| self.invalid("invalid hex digit"))?;
            return Ok(out.into());
        }

        // escape format
        let mut out = Vec::with_capacity(raw.len());
        let mut bytes = raw.as_bytes();
        while let Some((&b, rest)) = bytes.split_first() {
            if b != b'\\' {
                out.push(b);
                bytes = rest;
                continue;
            }
            match rest {
                [b'\\', rest @ ..] => {
                    out.push(b'\\');
                    bytes = rest;
                },
                [d1 @ b'0'..=b'3', d2 @ b'0'..=b'7', d3 @ b'0'..=b'7', rest @ ..] => {
                    out.push((d1 - b'0') * 64 + (d2 - b'0') * 8 + (d3 - b'0'));
                    bytes = rest;
                },
                _ => return Err(self.invalid("invalid escape")),
            }
        }
        Ok(out.into())
    }

    fn date_from_days(self, days: i32) -> Result<Date, CodecError> {
        match days {
            i32::MAX => Ok(Date::MAX),
            i32::MIN => Ok(Date::MIN),
            days => PG_EPOCH
                .date()
                .checked_add(Duration::days(days.into()))
                .ok_or_else(|| self.overflow()),
        }
    }

    fn date_to_days(self, date: Date) -> Result<i32, CodecError> {
        if date == Date::MAX {
            return Ok(i32::MAX);
        }
        if date == Date::MIN {
            return Ok(i32::MIN);
        }
        let days = (date - PG_EPOCH.date()).whole_days();
        i32::try_from(days).map_err(|_| self.overflow())
    }

    /// `24:00:00` is a valid postgres `time` but out of range of [`Time`], it is an
    /// overflow error.
    fn time_from_micros(self, micros: i64) -> Result<Time, CodecError> {
        if !(0..MICROS_PER_DAY).contains(&micros) {
            return Err(self.overflow());
        }
        let secs = micros / 1_000_000;
        Time::from_hms_micro(
            (secs / 3600) as u8,
            (secs / 60 % 60) as u8,
            (secs % 60) as u8,
            (micros % 1_000_000) as u32,
        )
        .map_err(|e| self.invalid(e))
    }

    fn timestamp_from_micros(self, micros: i64) -> Result<PrimitiveDateTime, CodecError> {
        match micros {
            i64::MAX => Ok(PrimitiveDateTime::MAX),
            i64::MIN => Ok(PrimitiveDateTime::MIN),
            micros => PG_EPOCH
                .checked_add(Duration::microseconds(micros))
                .ok_or_else(|| self.overflow()),
        }
    }

    fn timestamp_to_micros(self, ts: PrimitiveDateTime) -> Result<i64, CodecError> {
        if ts == PrimitiveDateTime::MAX {
            return Ok(i64::MAX);
        }
        if ts == PrimitiveDateTime::MIN {
            return Ok(i64::MIN);
        }
        i64::try_from((ts - PG_EPOCH).whole_microseconds()).map_err(|_| self.overflow())
    }

    fn parse_date(self, raw: &str) -> Result<Date, CodecError> {
        match raw {
            "infinity" => return Ok(Date::MAX),
            "-infinity" => return Ok(Date::MIN),
            _ => {},
        }
        let (raw, bc) = strip_bc(raw);
        let date = Date::parse(&signed_year(raw), DATE).map_err(|e| self.invalid(e))?;
        match bc {
            true => date.replace_year(1 - date.year()).map_err(|e| self.invalid(e)),
            false => Ok(date),
        }
    }

    fn parse_timestamp(self, raw: &str) -> Result<PrimitiveDateTime, CodecError> {
        match raw {
            "infinity" => return Ok(PrimitiveDateTime::MAX),
            "-infinity" => return Ok(PrimitiveDateTime::MIN),
            _ => {},
        }
        let (raw, bc) = strip_bc(raw);
        let ts = PrimitiveDateTime::parse(&signed_year(raw), TIMESTAMP).map_err(|e| self.invalid(e))?;
        match bc {
            true => ts.replace_year(1 - ts.year()).map_err(|e| self.invalid(e)),
            false => Ok(ts),
        }
    }

    fn parse_timestamptz(self, raw: &str) -> Result<UtcDateTime, CodecError> {
        match raw {
            "infinity" => return Ok(to_utc(PrimitiveDateTime::MAX)),
            "-infinity" => return Ok(to_utc(PrimitiveDateTime::MIN)),
            _ => {},
        }
        let (raw, bc) = strip_bc(raw);
        let mut ts = OffsetDateTime::parse(&signed_year(raw), TIMESTAMPTZ).map_err(|e| self.invalid(e))?;
        if bc {
            ts = ts.replace_year(1 - ts.year()).map_err(|e| self.invalid(e))?;
        }
        let ts = ts.to_offset(UtcOffset::UTC);
        Ok(UtcDateTime::new(ts.date(), ts.time()))
    }

    fn format_date(self, date: Date) -> Result<String, CodecError> {
        if date == Date::MAX {
            return Ok("infinity".into());
        }
        if date == Date::MIN {
            return Ok("-infinity".into());
        }
        let (date, bc) = to_era(date.year(), |y| date.replace_year(y)).map_err(|e| self.invalid(e))?;
        let mut out = unsigned_year(date.format(DATE).map_err(|e| self.invalid(e))?);
        if bc {
            out.push_str(" BC");
        }
        Ok(out)
    }

    fn format_timestamp(self, ts: PrimitiveDateTime, offset: &str) -> Result<String, CodecError> {
        if ts == PrimitiveDateTime::MAX {
            return Ok("infinity".into());
        }
        if ts == PrimitiveDateTime::MIN {
            return Ok("-infinity".into());
        }
        let (ts, bc) = to_era(ts.year(), |y| ts.replace_year(y)).map_err(|e| self.invalid(e))?;
        let mut out = unsigned_year(self.format(ts, TIMESTAMP_SECOND, TIMESTAMP_MICRO)?);
        out.push_str(offset);
        if bc {
            out.push_str(" BC");
        }
        Ok(out)
    }

    fn parse_timetz(self, raw: &str) -> Result<(Time, UtcOffset), CodecError> {
        let split = raw.rfind(['+', '-']).ok_or_else(|| self.invalid(format_args!("{raw:?}")))?;
        let (time, offset) = raw.split_at(split);
        let time = Time::parse(time, TIME).map_err(|e| self.invalid(e))?;
        let offset = UtcOffset::parse(offset, OFFSET).map_err(|e| self.invalid(e))?;
        Ok((time, offset))
    }

    fn offset_from_zone(self, zone: i32) -> Result<UtcOffset, CodecError> {
        zone.checked_neg()
            .and_then(|secs| UtcOffset::from_whole_seconds(secs).ok())
            .ok_or_else(|| self.overflow())
    }

    /// Shortest of `+HH`, `+HH:MM` and `+HH:MM:SS`.
    fn format_offset(self, offset: UtcOffset) -> Result<String, CodecError> {
        let description = match (offset.minutes_past_hour(), offset.seconds_past_minute()) {
            (0, 0) => OFFSET_HOUR,
            (_, 0) => OFFSET_MINUTE,
            _ => OFFSET_SECOND,
        };
        offset.format(description).map_err(|e| self.invalid(e))
    }

    /// Postgres style interval, e.g. `1 year 2 mons -3 days +04:05:06.7`.
    fn parse_interval(self, raw: &str) -> Result<Interval, CodecError> {
        let invalid = || self.invalid(format_args!("{raw:?}"));
        let mut interval = Interval::default();
        let mut tokens = raw.split_ascii_whitespace();
        while let Some(token) = tokens.next() {
            if token.contains(':') {
                let micros = clock_micros(token).ok_or_else(invalid)?;
                interval.micros = interval.micros.checked_add(micros).ok_or_else(|| self.overflow())?;
                continue;
            }
            let n: i32 = token.parse().map_err(|_| invalid())?;
            let (field, n) = match tokens.next().ok_or_else(invalid)? {
                "year" | "years" => (&mut interval.months, n.checked_mul(12).ok_or_else(|| self.overflow())?),
                "mon" | "mons" => (&mut interval.months, n),
                "day" | "days" => (&mut interval.days, n),
                _ => return Err(invalid()),
            };
            *field = field.checked_add(n).ok_or_else(|| self.overflow())?;
        }
        Ok(interval)
    }

    /// Decimal string of a binary `numeric`.
    ///
    /// Digits are base 10000, the first one multiplied by `10000 ^ weight`, `dscale` is the
    /// number of decimal digits after the point.
    fn numeric_from_binary(self, raw: &[u8]) -> Result<String, CodecError> {
        let Some((header, body)) = raw.split_first_chunk::<8>() else {
            return Err(self.invalid("numeric header too short"));
        };
        let ndigits = i16::from_be_bytes([header[0], header[1]]);
        let weight = i16::from_be_bytes([header[2], header[3]]);
        let sign = u16::from_be_bytes([header[4], header[5]]);
        let dscale = u16::from_be_bytes([header[6], header[7]]);

        match sign {
            NUMERIC_NAN => return Ok("NaN".into()),
            NUMERIC_PINF => return Ok("Infinity".into()),
            NUMERIC_NINF => return Ok("-Infinity".into()),
            NUMERIC_POS | NUMERIC_NEG => {},
            sign => return Err(self.invalid(format_args!("numeric sign {sign:#06x}"))),
        }
        if ndigits < 0 || body.len() != ndigits as usize * 2 {
            return Err(self.invalid(format_args!("expected {ndigits} numeric digits")));
        }
        let digits = body
            .chunks_exact(2)
            .map(|d| i16::from_be_bytes([d[0], d[1]]))
            .collect::<Vec<_>>();
        if digits.iter().any(|d| !(0..NBASE).contains(d)) {
            return Err(self.invalid("numeric digit out of range"));
        }
        let digit = |i: i32| match usize::try_from(i) {
            Ok(i) => digits.get(i).copied().unwrap_or(0),
            Err(_) => 0,
        };

        let mut out = String::new();
        if sign == NUMERIC_NEG {
            out.push('-');
        }
        match weight < 0 {
            true => out.push('0'),
            false => {
                let _ = write!(out, "{}", digit(0));
                for i in 1..=i32::from(weight) {
                    let _ = write!(out, "{:04}", digit(i));
                }
            },
        }
        if dscale > 0 {
            out.push('.');
            let start = out.len();
            let mut i = i32::from(weight) + 1;
            while out.len() - start < usize::from(dscale) {
                let _ = write!(out, "{:04}", digit(i));
                i += 1;
            }
            out.truncate(start + usize::from(dscale));
        }
        Ok(out)
    }

    fn numeric_to_binary(self, raw: &str, buf: &mut BytesMut) -> Result<(), CodecError> {
        let raw = raw.trim();
        let special = match raw {
            "NaN" => Some(NUMERIC_NAN),
            "Infinity" => Some(NUMERIC_PINF),
            "-Infinity" => Some(NUMERIC_NINF),
            _ => None,
        };
        if let Some(sign) = special {
            buf.put_i16(0);
            buf.put_i16(0);
            buf.put_u16(sign);
            buf.put_u16(0);
            return Ok(());
        }

        let (negative, unsigned) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };
        let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let valid = !(int.is_empty() && frac.is_empty())
            && int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit());
        if !valid {
            return Err(self.invalid(format_args!("{raw:?}")));
        }
        let dscale = u16::try_from(frac.len()).map_err(|_| self.overflow())?;
        let int = int.trim_start_matches('0');

        // pad both sides so groups of 4 line up with the decimal point
        let lead = (4 - int.len() % 4) % 4;
        let trail = (4 - frac.len() % 4) % 4;
        let decimal = std::iter::repeat(b'0').take(lead)
            .chain(int.bytes())
            .chain(frac.bytes())
            .chain(std::iter::repeat(b'0').take(trail))
            .map(|b| i16::from(b - b'0'))
            .collect::<Vec<_>>();
        let mut groups = decimal
            .chunks(4)
            .map(|g| g.iter().fold(0, |acc, d| acc * 10 + d))
            .collect::<Vec<i16>>();

        let mut weight = ((lead + int.len()) / 4) as i32 - 1;
        let zeros = groups.iter().take_while(|g| **g == 0).count();
        groups.drain(..zeros);
        weight -= zeros as i32;
        while groups.last() == Some(&0) {
            groups.pop();
        }
        if groups.is_empty() {
            weight = 0;
        }

        buf.put_i16(i16::try_from(groups.len()).map_err(|_| self.overflow())?);
        buf.put_i16(i16::try_from(weight).map_err(|_| self.overflow())?);
        buf.put_u16(match negative && !groups.is_empty() {
            true => NUMERIC_NEG,
            false => NUMERIC_POS,
        });
        buf.put_u16(dscale);
        for group in groups {
            buf.put_i16(group);
        }
        Ok(())
    }

    fn format<T: TimeOfDay>(self, value: T, whole: &[I<'_>], micro: &[I<'_>]) -> Result<String, CodecError> {
        let description = match value.nanosecond() {
            0 => whole,
            _ => micro,
        };
        value.format_with(description).map_err(|e| self.invalid(e))
    }
}

/// Time-of-day carrying values formatted by [`Primitive::format`].
trait TimeOfDay: Copy {
    fn nanosecond(self) -> u32;
    fn format_with(self, description: &[I<'_>]) -> Result<String, time::error::Format>;
}

impl TimeOfDay for Time {
    fn nanosecond(self) -> u32 {
        Time::nanosecond(self)
    }

    fn format_with(self, description: &[I<'_>]) -> Result<String, time::error::Format> {
        self.format(description)
    }
}

impl TimeOfDay for PrimitiveDateTime {
    fn nanosecond(self) -> u32 {
        PrimitiveDateTime::nanosecond(self)
    }

    fn format_with(self, description: &[I<'_>]) -> Result<String, time::error::Format> {
        self.format(description)
    }
}

const PG_EPOCH: PrimitiveDateTime = {
    // julian day of 2000-01-01
    let date = match Date::from_julian_day(2_451_545) {
        Ok(ok) => ok,
        Err(_) => panic!("postgres epoch is a valid date"),
    };
    PrimitiveDateTime::new(date, Time::MIDNIGHT)
};

const MICROS_PER_DAY: i64 = 86_400_000_000;

const NBASE: i16 = 10_000;
const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

const DATE: &[I<'_>] = format_description!("[year]-[month]-[day]");
const TIME: &[I<'_>] = format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]");
const TIME_SECOND: &[I<'_>] = format_description!("[hour]:[minute]:[second]");
const TIME_MICRO: &[I<'_>] = format_description!("[hour]:[minute]:[second].[subsecond digits:6]");
const TIMESTAMP: &[I<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]");
const TIMESTAMP_SECOND: &[I<'_>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const TIMESTAMP_MICRO: &[I<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");
const TIMESTAMPTZ: &[I<'_>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]\
     [offset_hour sign:mandatory][optional [:[offset_minute]]][optional [:[offset_second]]]"
);

const OFFSET: &[I<'_>] =
    format_description!("[offset_hour sign:mandatory][optional [:[offset_minute]]][optional [:[offset_second]]]");
const OFFSET_HOUR: &[I<'_>] = format_description!("[offset_hour sign:mandatory]");
const OFFSET_MINUTE: &[I<'_>] = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
const OFFSET_SECOND: &[I<'_>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]:[offset_second]");

/// Postgres writes years past 9999 unsigned, `time` only reads them with a sign.
fn signed_year(raw: &str) -> Cow<'_, str> {
    match raw.find('-') {
        Some(n @ 5..) if raw[..n].bytes().all(|b| b.is_ascii_digit()) => format!("+{raw}").into(),
        _ => raw.into(),
    }
}

fn unsigned_year(mut out: String) -> String {
    if out.starts_with('+') {
        out.remove(0);
    }
    out
}

fn strip_bc(raw: &str) -> (&str, bool) {
    match raw.strip_suffix(" BC") {
        Some(raw) => (raw, true),
        None => (raw, false),
    }
}

/// Year `0` is `1 BC`.
fn to_era<T>(year: i32, replace: impl FnOnce(i32) -> Result<T, time::error::ComponentRange>)
-> Result<(T, bool), time::error::ComponentRange> {
    match year {
        ..=0 => Ok((replace(1 - year)?, true)),
        _ => Ok((replace(year)?, false)),
    }
}

fn to_utc(ts: PrimitiveDateTime) -> UtcDateTime {
    UtcDateTime::new(ts.date(), ts.time())
}

fn from_utc(ts: UtcDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(ts.date(), ts.time())
}

fn time_to_micros(t: Time) -> i64 {
    let (h, m, s, micro) = t.as_hms_micro();
    ((i64::from(h) * 60 + i64::from(m)) * 60 + i64::from(s)) * 1_000_000 + i64::from(micro)
}

/// `[-+]H:MM[:SS[.ffffff]]`, hours are unbounded.
fn clock_micros(token: &str) -> Option<i64> {
    let (negative, clock) = match token.as_bytes().first()? {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };
    let mut parts = clock.splitn(3, ':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds = parts.next().unwrap_or("0");
    let (whole, frac) = seconds.split_once('.').unwrap_or((seconds, ""));
    let whole: i64 = whole.parse().ok()?;

    let frac = &frac[..frac.len().min(6)];
    let frac_micros = match frac {
        "" => 0,
        digits if digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse::<i64>().ok()? * 10i64.pow(6 - digits.len() as u32)
        },
        _ => return None,
    };
    let micros = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + whole)?
        .checked_mul(1_000_000)?
        .checked_add(frac_micros)?;
    Some(if negative { -micros } else { micros })
}

/// Postgres `IntervalStyle`, a part following a negative one carries an explicit `+`.
fn interval_text(iv: Interval) -> String {
    let mut out = String::new();
    let mut after_negative = false;
    for (n, unit) in [(iv.months / 12, "year"), (iv.months % 12, "mon"), (iv.days, "day")] {
        if n == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        let plus = if after_negative && n > 0 { "+" } else { "" };
        let plural = if n != 1 { "s" } else { "" };
        let _ = write!(out, "{plus}{n} {unit}{plural}");
        after_negative = n < 0;
    }
    if out.is_empty() || iv.micros != 0 {
        if !out.is_empty() {
            out.push(' ');
        }
        let sign = match iv.micros < 0 {
            true => "-",
            false if after_negative => "+",
            false => "",
        };
        let micros = iv.micros.unsigned_abs();
        let secs = micros / 1_000_000;
        let _ = write!(out, "{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
        let frac = micros % 1_000_000;
        if frac != 0 {
            let digits = format!("{frac:06}");
            let _ = write!(out, ".{}", digits.trim_end_matches('0'));
        }
    }
    out
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".into()
    } else if f.is_infinite() {
        (if f > 0.0 { "Infinity" } else { "-Infinity" }).into()
    } else {
        f.to_string()
    }
}

fn char_text(c: i8) -> String {
    match c as u8 {
        0 => String::new(),
        b @ 1..=127 => char::from(b).to_string(),
        b => format!("\\{b:03o}"),
    }
}

fn parse_uuid(raw: &str) -> Option<[u8; 16]> {
    let raw = raw.trim_start_matches('{').trim_end_matches('}');
    let mut out = [0u8; 16];
    let mut digits = raw.bytes().filter(|b| *b != b'-');
    for byte in &mut out {
        let hi = (digits.next()? as char).to_digit(16)?;
        let lo = (digits.next()? as char).to_digit(16)?;
        *byte = (hi * 16 + lo) as u8;
    }
    digits.next().is_none().then_some(out)
}

fn uuid_text(u: &[u8; 16]) -> String {
    let mut out = String::with_capacity(36);
    for (i, byte) in u.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod test {
    use time::{
        Month,
        macros::{date, datetime, offset, time},
    };

    use super::*;

    fn binary(p: Primitive, value: &Value) -> Vec<u8> {
        let mut buf = BytesMut::new();
        p.encode_binary(value, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn integer_widening_and_overflow() {
        assert_eq!(binary(Primitive::Int8, &Value::Int2(7)), 7i64.to_be_bytes());
        assert_eq!(binary(Primitive::Int2, &Value::Int8(-3)), (-3i16).to_be_bytes());

        let mut buf = BytesMut::new();
        let err = Primitive::Int2.encode_binary(&Value::Int4(40_000), &mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Overflow(ty) if ty == "int2"));
        let err = Primitive::Oid.encode_binary(&Value::Int4(-1), &mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Overflow(_)));
        let err = Primitive::Int4.encode_binary(&Value::Bool(true), &mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Mismatch { .. }));
    }

    #[test]
    fn scalar_text() {
        assert_eq!(Primitive::Bool.decode_text("t").unwrap(), Value::Bool(true));
        assert_eq!(Primitive::Int4.decode_text("-42").unwrap(), Value::Int4(-42));
        assert!(matches!(Primitive::Float8.decode_text("NaN").unwrap(), Value::Float8(f) if f.is_nan()));
        assert_eq!(Primitive::Float8.decode_text("-Infinity").unwrap(), Value::Float8(f64::NEG_INFINITY));
        assert_eq!(Primitive::Float4.encode_text(&Value::Float4(f32::INFINITY)).unwrap(), "Infinity");
        assert_eq!(Primitive::Char.decode_text("\\377").unwrap(), Value::Char(-1));
        assert_eq!(Primitive::Char.encode_text(&Value::Char(-1)).unwrap(), "\\377");
        assert_eq!(Primitive::Numeric.decode_text("1.50").unwrap(), Value::Numeric("1.50".into()));
        assert!(Primitive::Int2.decode_text("abc").is_err());
    }

    #[test]
    fn bytea() {
        let value = Primitive::Bytea.decode_text("\\x00ff10").unwrap();
        assert_eq!(value, Value::Bytea(Bytes::from_static(&[0, 255, 16])));
        assert_eq!(Primitive::Bytea.encode_text(&value).unwrap(), "\\x00ff10");

        let value = Primitive::Bytea.decode_text("a\\\\b\\001").unwrap();
        assert_eq!(value, Value::Bytea(Bytes::from_static(b"a\\b\x01")));
        assert!(Primitive::Bytea.decode_text("\\x0").is_err());
    }

    #[test]
    fn uuid() {
        let text = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";
        let value = Primitive::Uuid.decode_text(text).unwrap();
        assert_eq!(Primitive::Uuid.encode_text(&value).unwrap(), text);
        assert_eq!(binary(Primitive::Uuid, &value).len(), 16);
        assert_eq!(Primitive::Uuid.decode_text("{A0EEBC999C0B4EF8BB6D6BB9BD380A11}").unwrap(), value);
    }

    #[test]
    fn jsonb_version() {
        assert_eq!(binary(Primitive::Jsonb, &Value::Json("{}".into())), b"\x01{}");
        assert_eq!(Primitive::Jsonb.decode_binary(b"\x01[1]").unwrap(), Value::Json("[1]".into()));
        assert!(Primitive::Jsonb.decode_binary(b"\x02[1]").is_err());
    }

    #[test]
    fn temporal_binary() {
        assert_eq!(Primitive::Date.decode_binary(&0i32.to_be_bytes()).unwrap(), Value::Date(date!(2000-01-01)));
        assert_eq!(Primitive::Date.decode_binary(&i32::MAX.to_be_bytes()).unwrap(), Value::Date(Date::MAX));
        assert_eq!(binary(Primitive::Date, &Value::Date(date!(2000-01-31))), 30i32.to_be_bytes());

        let ts = datetime!(2000-01-01 0:00:01.5);
        assert_eq!(binary(Primitive::Timestamp, &Value::Timestamp(ts)), 1_500_000i64.to_be_bytes());
        assert_eq!(Primitive::Timestamp.decode_binary(&1_500_000i64.to_be_bytes()).unwrap(), Value::Timestamp(ts));
        assert_eq!(
            Primitive::TimestampTz.decode_binary(&i64::MIN.to_be_bytes()).unwrap(),
            Value::TimestampTz(to_utc(PrimitiveDateTime::MIN)),
        );

        let t = time!(13:14:15.000016);
        assert_eq!(Primitive::Time.decode_binary(&binary(Primitive::Time, &Value::Time(t))).unwrap(), Value::Time(t));
        assert!(Primitive::Time.decode_binary(&MICROS_PER_DAY.to_be_bytes()).is_err());
    }

    #[test]
    fn temporal_text() {
        assert_eq!(Primitive::Date.decode_text("2024-02-29").unwrap(), Value::Date(date!(2024-02-29)));
        assert_eq!(Primitive::Date.decode_text("infinity").unwrap(), Value::Date(Date::MAX));
        let ides = Date::from_calendar_date(-43, Month::March, 15).unwrap();
        assert_eq!(Primitive::Date.decode_text("0044-03-15 BC").unwrap(), Value::Date(ides));
        assert_eq!(Primitive::Date.encode_text(&Value::Date(ides)).unwrap(), "0044-03-15 BC");

        let ts = datetime!(2024-01-02 03:04:05.123456);
        assert_eq!(Primitive::Timestamp.decode_text("2024-01-02 03:04:05.123456").unwrap(), Value::Timestamp(ts));
        assert_eq!(Primitive::Timestamp.encode_text(&Value::Timestamp(ts)).unwrap(), "2024-01-02 03:04:05.123456");
        assert_eq!(
            Primitive::Timestamp.encode_text(&Value::Timestamp(datetime!(2024-01-02 03:04:05))).unwrap(),
            "2024-01-02 03:04:05",
        );

        let tz = Primitive::TimestampTz.decode_text("2024-01-02 08:34:05+05:30").unwrap();
        assert_eq!(tz, Value::TimestampTz(to_utc(datetime!(2024-01-02 03:04:05))));
        assert_eq!(Primitive::TimestampTz.encode_text(&tz).unwrap(), "2024-01-02 03:04:05+00");
        assert_eq!(Primitive::TimestampTz.decode_text("2024-01-02 03:04:05-01").unwrap(),
            Value::TimestampTz(to_utc(datetime!(2024-01-02 04:04:05))));
    }

    fn numeric(ndigits: i16, weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut out = BytesMut::new();
        out.put_i16(ndigits);
        out.put_i16(weight);
        out.put_u16(sign);
        out.put_u16(dscale);
        digits.iter().for_each(|d| out.put_i16(*d));
        out.to_vec()
    }

    #[test]
    fn numeric_binary() {
        let cases = [
            ("1.50", numeric(2, 0, NUMERIC_POS, 2, &[1, 5000])),
            ("-12345.6", numeric(3, 1, NUMERIC_NEG, 1, &[1, 2345, 6000])),
            ("0.0001", numeric(1, -1, NUMERIC_POS, 4, &[1])),
            ("20000", numeric(1, 1, NUMERIC_POS, 0, &[2])),
            ("0", numeric(0, 0, NUMERIC_POS, 0, &[])),
            ("0.00", numeric(0, 0, NUMERIC_POS, 2, &[])),
            ("NaN", numeric(0, 0, NUMERIC_NAN, 0, &[])),
            ("-Infinity", numeric(0, 0, NUMERIC_NINF, 0, &[])),
        ];
        for (text, raw) in cases {
            assert_eq!(binary(Primitive::Numeric, &Value::Numeric(text.into())), raw, "{text}");
            assert_eq!(Primitive::Numeric.decode_binary(&raw).unwrap(), Value::Numeric(text.into()));
        }

        assert_eq!(binary(Primitive::Numeric, &Value::Int4(-7)), numeric(1, 0, NUMERIC_NEG, 0, &[7]));
        assert_eq!(binary(Primitive::Numeric, &Value::Numeric("007.10".into())), numeric(2, 0, NUMERIC_POS, 2, &[7, 1000]));

        let mut buf = BytesMut::new();
        assert!(Primitive::Numeric.encode_binary(&Value::Numeric("1e5".into()), &mut buf).is_err());
        assert!(Primitive::Numeric.decode_binary(&numeric(1, 0, NUMERIC_POS, 0, &[10_000])).is_err());
        assert!(Primitive::Numeric.decode_binary(&numeric(2, 0, NUMERIC_POS, 0, &[1])).is_err());
        assert!(Primitive::Numeric.binary());
    }

    #[test]
    fn interval() {
        let iv = Interval::new(14, 3, ((4 * 60 + 5) * 60 + 6) * 1_000_000 + 700_000);
        let text = "1 year 2 mons 3 days 04:05:06.7";
        assert_eq!(Primitive::Interval.decode_text(text).unwrap(), Value::Interval(iv));
        assert_eq!(Primitive::Interval.encode_text(&Value::Interval(iv)).unwrap(), text);

        let raw = binary(Primitive::Interval, &Value::Interval(iv));
        assert_eq!(&raw[..8], iv.micros.to_be_bytes());
        assert_eq!(&raw[8..12], 3i32.to_be_bytes());
        assert_eq!(&raw[12..], 14i32.to_be_bytes());
        assert_eq!(Primitive::Interval.decode_binary(&raw).unwrap(), Value::Interval(iv));

        let cases = [
            (Interval::default(), "00:00:00"),
            (Interval::new(0, 1, 0), "1 day"),
            (Interval::new(0, -1, 7_200_000_000), "-1 days +02:00:00"),
            (Interval::new(-14, 0, 0), "-1 years -2 mons"),
            (Interval::new(0, 0, -1_000_000), "-00:00:01"),
            (Interval::new(0, 0, 100 * 3_600_000_000), "100:00:00"),
        ];
        for (iv, text) in cases {
            assert_eq!(Primitive::Interval.encode_text(&Value::Interval(iv)).unwrap(), text);
            assert_eq!(Primitive::Interval.decode_text(text).unwrap(), Value::Interval(iv), "{text}");
        }
        assert!(Primitive::Interval.decode_text("3 fortnights").is_err());
        assert!(Primitive::Interval.decode_binary(&[0; 12]).is_err());
    }

    #[test]
    fn timetz() {
        let value = Value::TimeTz(time!(10:00), offset!(+2));
        assert_eq!(Primitive::TimeTz.decode_text("10:00:00+02").unwrap(), value);
        assert_eq!(Primitive::TimeTz.encode_text(&value).unwrap(), "10:00:00+02");

        // zone is seconds west of utc
        let raw = binary(Primitive::TimeTz, &value);
        assert_eq!(&raw[..8], 36_000_000_000i64.to_be_bytes());
        assert_eq!(&raw[8..], (-7200i32).to_be_bytes());
        assert_eq!(Primitive::TimeTz.decode_binary(&raw).unwrap(), value);

        let india = Value::TimeTz(time!(23:59:59.25), offset!(+5:30));
        assert_eq!(Primitive::TimeTz.encode_text(&india).unwrap(), "23:59:59.250000+05:30");
        assert_eq!(Primitive::TimeTz.decode_text("23:59:59.25+05:30").unwrap(), india);
        assert_eq!(
            Primitive::TimeTz.decode_text("01:02:03-08").unwrap(),
            Value::TimeTz(time!(1:02:03), offset!(-8)),
        );
        assert!(Primitive::TimeTz.decode_text("01:02:03").is_err());
    }

    #[test]
    fn large_dates() {
        let date = Date::from_calendar_date(10_000, Month::January, 1).unwrap();
        let ts = PrimitiveDateTime::new(date, Time::MIDNIGHT);
        let text = "10000-01-01 00:00:00";

        assert_eq!(Primitive::Timestamp.decode_text(text).unwrap(), Value::Timestamp(ts));
        assert_eq!(Primitive::Timestamp.encode_text(&Value::Timestamp(ts)).unwrap(), text);
        assert_eq!(Primitive::Date.decode_text("10000-01-01").unwrap(), Value::Date(date));
        assert_eq!(Primitive::Date.encode_text(&Value::Date(date)).unwrap(), "10000-01-01");
        assert_eq!(
            Primitive::TimestampTz.decode_text("10000-01-01 00:00:00+00").unwrap(),
            Value::TimestampTz(to_utc(ts)),
        );

        let raw = binary(Primitive::Timestamp, &Value::Timestamp(ts));
        assert_eq!(Primitive::Timestamp.decode_binary(&raw).unwrap(), Value::Timestamp(ts));
    }

    #[test]
    fn end_of_day_is_out_of_range() {
        assert!(matches!(Primitive::Time.decode_text("24:00:00").unwrap_err(), CodecError::InvalidValue { .. }));
        assert!(matches!(
            Primitive::Time.decode_binary(&MICROS_PER_DAY.to_be_bytes()).unwrap_err(),
            CodecError::Overflow(_)
        ));
    }
}
