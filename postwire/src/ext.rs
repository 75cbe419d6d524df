//! Byte level helpers over [`bytes`] buffers.
//!
//! Integers and floats are read and written with [`Buf`] and [`BufMut`] directly, which
//! already use network byte order. This module adds the pieces postgres needs on top:
//! nul terminated strings, `i32` length prefixed values and checked length conversions.
use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};

use crate::{common::ByteStr, postgres::ProtocolError};

/// Integer signess in postgres docs is awful.
pub trait UsizeExt {
    /// Length is `usize` in rust, while sometime postgres want `u32`,
    /// this will panic when overflow instead of wrapping.
    fn to_u32(self) -> u32;
    /// Length is `usize` in rust, while sometime postgres want `u16`,
    /// this will panic when overflow instead of wrapping.
    fn to_u16(self) -> u16;
    /// Length prefix of a value, which is `i32` in postgres.
    fn to_i32(self) -> i32;
}

/// Nul string operation.
pub trait StrExt {
    /// String length plus nul (1).
    fn nul_string_len(&self) -> u32;
}

/// Nul string and length prefixed value operation in [`BufMut`].
pub trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

/// Read operation on received message body.
pub trait BytesExt {
    /// Try to read nul terminated string.
    ///
    /// Using [`ByteStr`] avoid allocating [`Vec`] as it required for [`String::from_utf8`].
    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError>;

    /// Try to read nul terminated bytes, the nul is consumed but not returned.
    fn get_nul_bytes(&mut self) -> Result<Bytes, ProtocolError>;

    /// Read `i32` length prefixed value, length `-1` is `NULL`.
    fn try_get_value(&mut self) -> Result<Option<Bytes>, TryGetError>;
}

impl UsizeExt for usize {
    fn to_u32(self) -> u32 {
        self.try_into().expect("message size too large for protocol")
    }

    fn to_u16(self) -> u16 {
        self.try_into().expect("message size too large for protocol")
    }

    fn to_i32(self) -> i32 {
        self.try_into().expect("value size too large for protocol")
    }
}

impl StrExt for str {
    fn nul_string_len(&self) -> u32 {
        self.len().to_u32() + 1/* nul */
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

impl BytesExt for Bytes {
    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError> {
        let bytes = self.get_nul_bytes()?;
        ByteStr::from_utf8(bytes).map_err(ProtocolError::Utf8)
    }

    fn get_nul_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        let Some(end) = memchr::memchr(b'\0', &self[..]) else {
            return Err(ProtocolError::MissingNul);
        };
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        Ok(me)
    }

    fn try_get_value(&mut self) -> Result<Option<Bytes>, TryGetError> {
        let len = self.try_get_i32()?;
        if len == -1 {
            return Ok(None);
        }
        // any other negative length can never be satisfied
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if self.remaining() < len {
            return Err(TryGetError { requested: len, available: self.remaining() });
        }
        Ok(Some(self.split_to(len)))
    }
}

impl BytesExt for BytesMut {
    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError> {
        let bytes = self.get_nul_bytes()?;
        ByteStr::from_utf8(bytes).map_err(ProtocolError::Utf8)
    }

    fn get_nul_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        let Some(end) = memchr::memchr(b'\0', &self[..]) else {
            return Err(ProtocolError::MissingNul);
        };
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        Ok(me.freeze())
    }

    fn try_get_value(&mut self) -> Result<Option<Bytes>, TryGetError> {
        let len = self.try_get_i32()?;
        if len == -1 {
            return Ok(None);
        }
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if self.remaining() < len {
            return Err(TryGetError { requested: len, available: self.remaining() });
        }
        Ok(Some(self.split_to(len).freeze()))
    }
}

/// Borrowing [`BytesExt::try_get_value`], for values nested in a binary value.
pub fn get_value<'a>(buf: &mut &'a [u8]) -> Result<Option<&'a [u8]>, TryGetError> {
    let len = buf.try_get_i32()?;
    if len == -1 {
        return Ok(None);
    }
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    if buf.len() < len {
        return Err(TryGetError { requested: len, available: buf.len() });
    }
    let (value, rest) = buf.split_at(len);
    *buf = rest;
    Ok(Some(value))
}

/// Write `i32` length prefixed value, [`None`] is written as `NULL`.
pub fn put_value(buf: &mut BytesMut, value: Option<&[u8]>) {
    match value {
        Some(value) => {
            buf.put_i32(value.len().to_i32());
            buf.put_slice(value);
        },
        None => buf.put_i32(-1),
    }
}

/// Reserve `i32` length prefix, call `f`, then write the length of what `f` wrote.
///
/// The length excludes the prefix itself, matching how values are framed in
/// `Bind`, `DataRow` and binary structured values.
pub fn put_length_prefixed<E>(
    buf: &mut BytesMut,
    f: impl FnOnce(&mut BytesMut) -> Result<(), E>,
) -> Result<(), E> {
    let offset = buf.len();
    buf.put_i32(0);
    f(buf)?;
    let len = (buf.len() - offset - 4).to_i32();
    buf[offset..offset + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nul_string() {
        let mut buf = BytesMut::new();
        buf.put_nul_string("user");
        buf.put_nul_string("");
        let mut bytes = buf.freeze();
        assert_eq!(bytes.get_nul_bytestr().unwrap(), "user");
        assert_eq!(bytes.get_nul_bytestr().unwrap(), "");
        assert!(bytes.is_empty());
    }

    #[test]
    fn missing_nul() {
        let mut bytes = Bytes::from_static(b"abc");
        assert!(matches!(bytes.get_nul_bytes(), Err(ProtocolError::MissingNul)));
    }

    #[test]
    fn length_prefixed_value() {
        let mut buf = BytesMut::new();
        put_value(&mut buf, Some(b"42"));
        put_value(&mut buf, None);
        put_length_prefixed(&mut buf, |buf| {
            buf.put_u16(7);
            Ok::<_, ()>(())
        })
        .unwrap();

        let mut bytes = buf.freeze();
        assert_eq!(bytes.try_get_value().unwrap().as_deref(), Some(&b"42"[..]));
        assert_eq!(bytes.try_get_value().unwrap(), None);
        assert_eq!(bytes.try_get_value().unwrap().as_deref(), Some(&[0u8, 7][..]));
    }

    #[test]
    fn truncated_value() {
        let mut bytes = Bytes::from_static(&[0, 0, 0, 8, 1, 2]);
        let err = bytes.try_get_value().unwrap_err();
        assert_eq!(err.requested, 8);
        assert_eq!(err.available, 2);
    }
}
