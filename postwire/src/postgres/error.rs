//! Protocol error
use bytes::TryGetError;
use std::{fmt, str::Utf8Error};

use super::BackendMessage;

/// An error when translating buffer from postgres.
///
/// Any protocol error means the byte stream can no longer be trusted, the connection
/// is closed after it is returned.
pub enum ProtocolError {
    /// Received message is not the one expected at current phase.
    Unexpected {
        expect: Option<u8>,
        found: u8,
        phase: Option<&'static str>,
    },
    /// Authentication request code is not recognized.
    UnknownAuth {
        auth: u32,
    },
    /// Message body is shorter than its content requires.
    Truncated(TryGetError),
    /// String field is not nul terminated.
    MissingNul,
    /// String field is not valid utf8.
    Utf8(Utf8Error),
    /// Format code other than text or binary.
    InvalidFormatCode(u16),
    /// `ReadyForQuery` with unknown transaction status.
    InvalidTransactionStatus(u8),
    /// Message length is smaller than the length field itself.
    InvalidLength(i32),
    /// `DataRow` column count differ from the described fields.
    ColumnCountMismatch {
        expected: usize,
        found: usize,
    },
    /// Server reported a session setting values can not be decoded with.
    UnsupportedSetting {
        name: &'static str,
        value: String,
    },
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ProtocolError::Unexpected { expect, found, phase } => {
                let found = BackendMessage::message_name(found);
                match expect {
                    Some(m) => {
                        write!(
                            f,
                            "Expected message `{}` found `{found}`",
                            BackendMessage::message_name(m),
                        )?
                    },
                    None => write!(f, "Unexpected message `{found}`")?,
                }
                if let Some(phase) = phase {
                    write!(f, " in `{phase}`")?
                }
                Ok(())
            },
            ProtocolError::UnknownAuth { auth } => write!(f, "Unknown authentication request: {auth}"),
            ProtocolError::Truncated(ref e) => write!(f, "Message truncated: {e}"),
            ProtocolError::MissingNul => f.write_str("Postgres string did not nul terminated"),
            ProtocolError::Utf8(ref e) => write!(f, "Postgres string is not utf8: {e}"),
            ProtocolError::InvalidFormatCode(code) => write!(f, "Invalid format code: {code}"),
            ProtocolError::InvalidTransactionStatus(s) => {
                write!(f, "Invalid transaction status: {:?}", s as char)
            },
            ProtocolError::InvalidLength(len) => write!(f, "Invalid message length: {len}"),
            ProtocolError::ColumnCountMismatch { expected, found } => {
                write!(f, "DataRow has {found} columns, RowDescription has {expected}")
            },
            ProtocolError::UnsupportedSetting { name, ref value } => {
                write!(f, "Unsupported session setting: {name} = {value:?}")
            },
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<TryGetError> for ProtocolError {
    fn from(value: TryGetError) -> Self {
        Self::Truncated(value)
    }
}

impl ProtocolError {
    pub(crate) fn unknown(found: u8) -> ProtocolError {
        Self::Unexpected {
            expect: None,
            found,
            phase: None,
        }
    }

    pub(crate) fn unexpected(expect: u8, found: u8) -> ProtocolError {
        Self::Unexpected {
            expect: Some(expect),
            found,
            phase: None,
        }
    }

    pub(crate) fn unexpected_phase(found: u8, phase: &'static str) -> ProtocolError {
        Self::Unexpected {
            expect: None,
            found,
            phase: Some(phase),
        }
    }

    pub(crate) fn unknown_auth(auth: u32) -> ProtocolError {
        Self::UnknownAuth { auth }
    }
}
