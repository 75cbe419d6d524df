//! `postwire` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::{
    auth::AuthError,
    codec::CodecError,
    connection::ParseError,
    postgres::{ErrorResponse, ProtocolError},
    row::{ColumnError, DecodeError, RowNotFound},
    types::TypeError,
};

/// A specialized [`Result`] type for `postwire` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `postwire` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Prepend context to the error message.
    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        self.context = match self.context.is_empty() {
            true => context.to_string(),
            false => format!("{context}: {}", self.context),
        };
        self
    }

    /// Returns `true` if the connection can no longer be used after this error.
    ///
    /// Server errors are fatal only with `FATAL` or `PANIC` severity, the connection
    /// recovers from anything else at the next `ReadyForQuery`.
    pub fn is_fatal(&self) -> bool {
        match &self.kind {
            ErrorKind::Io(_)
            | ErrorKind::Closed
            | ErrorKind::Timeout
            | ErrorKind::Auth(_)
            | ErrorKind::Protocol(_) => true,
            ErrorKind::Database(e) => matches!(e.severity(), "FATAL" | "PANIC"),
            ErrorKind::Type(_)
            | ErrorKind::Codec(_)
            | ErrorKind::Decode(_)
            | ErrorKind::RowNotFound(_)
            | ErrorKind::Copy(_)
            | ErrorKind::Config(_) => false,
        }
    }

    /// Returns the server error, if this is one.
    pub fn as_database(&self) -> Option<&ErrorResponse> {
        match &self.kind {
            ErrorKind::Database(e) => Some(e),
            _ => None,
        }
    }
}

/// All possible error kind from `postwire` library.
pub enum ErrorKind {
    /// Transport failure, the connection is closed.
    Io(io::Error),
    /// Connection already closed.
    Closed,
    /// Connect or io timeout elapsed, the connection is closed.
    Timeout,
    Auth(AuthError),
    Protocol(ProtocolError),
    Database(ErrorResponse),
    Type(TypeError),
    Codec(CodecError),
    Decode(DecodeError),
    RowNotFound(RowNotFound),
    /// Reading the `COPY` source or writing the sink failed, the connection
    /// is still usable.
    Copy(io::Error),
    Config(ParseError),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<io::Error>e => ErrorKind::Io(e));
from!(<AuthError>e => ErrorKind::Auth(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<ErrorResponse>e => ErrorKind::Database(e));
from!(<TypeError>e => ErrorKind::Type(e));
from!(<CodecError>e => ErrorKind::Codec(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ColumnError>e => match e {
    ColumnError::Type(e) => ErrorKind::Type(e),
    ColumnError::Codec(e) => ErrorKind::Codec(e),
});
from!(<tokio::time::error::Elapsed>_ => ErrorKind::Timeout);

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Closed => f.write_str("connection closed"),
            Self::Timeout => f.write_str("operation timed out"),
            Self::Auth(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Type(e) => e.fmt(f),
            Self::Codec(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
            Self::Copy(e) => write!(f, "copy aborted: {e}"),
            Self::Config(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::from(ErrorKind::Closed).is_fatal());
        assert!(Error::from(io::Error::from(io::ErrorKind::UnexpectedEof)).is_fatal());
        assert!(!Error::from(TypeError::UnknownOid(1)).is_fatal());
        assert!(!Error::from(DecodeError::Null).is_fatal());
    }

    #[test]
    fn context_prefix() {
        let err = Error::from(ErrorKind::Closed).with_context("query").with_context("catalog");
        assert_eq!(err.context(), "catalog: query");
        assert!(err.to_string().starts_with("catalog: query: connection closed"));
    }
}
