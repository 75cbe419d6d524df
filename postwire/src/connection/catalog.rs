//! Type metadata lookup over the connection itself.
//!
//! Catalog queries transfer everything in text format and never resolve types
//! themselves, so resolution never recurses.
use bytes::Bytes;
use fallible_iterator::FallibleIterator;
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Connection, State};
use crate::{
    Result,
    codec::CodecError,
    postgres::{BackendMessage, Oid, PgFormat, ProtocolError, backend, frontend, oid},
    types::{
        Catalog, Field, PgTypeRow, TypeInfo,
        catalog::{FIELDS_QUERY, LABELS_QUERY, NAME_QUERY, TYPE_QUERY, TYPE_QUERY_PRE_14},
    },
};

type TextRow = Vec<Option<String>>;

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Run catalog query with one text parameter, values in text format.
    async fn catalog_rows(&mut self, sql: &str, param_type: Oid, param: &str) -> Result<Vec<TextRow>> {
        self.begin(State::ExtendedQuery)?;
        self.send(frontend::Parse { prepare_name: "", sql, oids: &[param_type] });
        self.send(frontend::Bind {
            portal_name: "",
            stmt_name: "",
            param_formats: &[PgFormat::Text],
            params: &[Some(Bytes::copy_from_slice(param.as_bytes()))],
            result_formats: &[PgFormat::Text],
        });
        self.send(frontend::Execute { portal_name: "", max_row: 0 });
        self.send(frontend::Sync);
        let result = self.catalog_cycle().await;
        self.finish(result).await
    }

    async fn catalog_cycle(&mut self) -> Result<Vec<TextRow>> {
        self.flush().await?;
        self.recv::<backend::ParseComplete>().await?;
        self.recv::<backend::BindComplete>().await?;
        let mut rows = vec![];
        loop {
            match self.recv::<BackendMessage>().await? {
                BackendMessage::DataRow(row) => {
                    let row = row
                        .values()
                        .map(|value| {
                            value
                                .map(|v| std::str::from_utf8(&v).map(str::to_owned))
                                .transpose()
                                .map_err(ProtocolError::Utf8)
                        })
                        .collect()?;
                    rows.push(row);
                },
                BackendMessage::CommandComplete(_) => break,
                f => Err(f.unexpected("catalog query"))?,
            }
        }
        self.ready().await?;
        Ok(rows)
    }

    async fn oid_rows(&mut self, sql: &str, oid: Oid) -> Result<Vec<TextRow>> {
        let mut buf = itoa::Buffer::new();
        self.catalog_rows(sql, oid::OID, buf.format(oid)).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Catalog for Connection<S> {
    async fn lookup(&mut self, oid: Oid) -> Result<Option<TypeInfo>> {
        let query = match self.server_major() {
            Some(major) if major < 14 => TYPE_QUERY_PRE_14,
            _ => TYPE_QUERY,
        };
        let Some(row) = self.oid_rows(query, oid).await?.into_iter().next() else {
            return Ok(None);
        };

        let mut values = row.into_iter();
        let mut text = || values.next().flatten();
        let row = PgTypeRow {
            typname: text().unwrap_or_default(),
            nspname: text().unwrap_or_default(),
            typtype: text().unwrap_or_default(),
            typcategory: text().unwrap_or_default(),
            typdelim: text().unwrap_or_default(),
            typelem: parse_oid(text())?.unwrap_or(0),
            typbasetype: parse_oid(text())?.unwrap_or(0),
            rngsubtype: parse_oid(text())?,
            multirange_range: parse_oid(text())?,
            multirange_element: parse_oid(text())?,
        };

        let mut fields = vec![];
        if row.is_composite() {
            for field in self.oid_rows(FIELDS_QUERY, oid).await? {
                let mut values = field.into_iter();
                let name = values.next().flatten().unwrap_or_default();
                let oid = parse_oid(values.next().flatten())?.unwrap_or(0);
                fields.push(Field { name, oid });
            }
        }

        let mut labels = vec![];
        if row.is_enum() {
            for label in self.oid_rows(LABELS_QUERY, oid).await? {
                labels.extend(label.into_iter().next().flatten());
            }
        }

        Ok(Some(row.into_info(fields, labels)?))
    }

    async fn lookup_name(&mut self, name: &str) -> Result<Option<Oid>> {
        let rows = self.catalog_rows(NAME_QUERY, oid::TEXT, name).await?;
        let value = rows.into_iter().next().and_then(|row| row.into_iter().next().flatten());
        parse_oid(value)
    }
}

fn parse_oid(value: Option<String>) -> Result<Option<Oid>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.parse() {
        Ok(oid) => Ok(Some(oid)),
        Err(err) => Err(CodecError::InvalidValue { ty: "oid".into(), reason: format!("{value:?}: {err}") }.into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn oid_text() {
        assert_eq!(parse_oid(Some("1043".into())).unwrap(), Some(1043));
        assert_eq!(parse_oid(None).unwrap(), None);
        assert!(parse_oid(Some("x".into())).is_err());
    }
}
