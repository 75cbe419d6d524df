//! Prepared statement.
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use crate::{postgres::Oid, row::Column};

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

/// Server side name of a prepared statement.
///
/// Names are unique within the process, so statements of different connections
/// never collide when a session is reused.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StatementName([u8; 11]);

impl StatementName {
    pub(crate) fn next() -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let mut buf = [b'q', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0'];
        let len = buf.len();

        let mut b = itoa::Buffer::new();
        let id = b.format(id);
        let i = id.as_bytes();
        buf[len - i.len()..].copy_from_slice(i);

        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        // only ascii digits and `q` are ever written
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl std::fmt::Display for StatementName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for StatementName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("StatementName").field(&self.as_str()).finish()
    }
}

impl AsRef<str> for StatementName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// A statement prepared on the server.
///
/// Parameter and column types are resolved when prepared. Reusable across
/// executions until closed with [`Connection::close_statement`][1].
///
/// [1]: crate::Connection::close_statement
#[derive(Debug, Clone)]
pub struct Statement {
    name: StatementName,
    sql: Arc<str>,
    params: Arc<[Oid]>,
    columns: Arc<[Column]>,
}

impl Statement {
    pub(crate) fn new(name: StatementName, sql: &str, params: Vec<Oid>, columns: Vec<Column>) -> Statement {
        Statement {
            name,
            sql: sql.into(),
            params: params.into(),
            columns: columns.into(),
        }
    }

    pub fn name(&self) -> &StatementName {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter types as described by the server.
    pub fn params(&self) -> &[Oid] {
        &self.params
    }

    /// Result columns, with the format each is requested in.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn columns_arc(&self) -> Arc<[Column]> {
        self.columns.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_are_unique() {
        let a = StatementName::next();
        let b = StatementName::next();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with('q'));
        assert_eq!(a.as_str().len(), 11);
        assert!(a.as_str()[1..].bytes().all(|b| b.is_ascii_digit()));
    }
}
