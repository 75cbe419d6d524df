//! Query cycles, simple and extended.
use bytes::Bytes;
use fallible_iterator::FallibleIterator;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Connection, State};
use crate::{
    ErrorKind, Result,
    codec::{CodecError, Value},
    common::{debug, verbose},
    postgres::{
        BackendMessage, Oid, PgFormat, ProtocolError,
        backend::{self, FieldDescription, ParameterDescription},
        frontend,
    },
    row::{Column, FromRow, Row, RowNotFound, materialize},
    statement::{Statement, StatementName},
};

/// Outcome of executing a statement.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Parsed from the command tag, zero for commands that report no count.
    pub rows_affected: u64,
    /// Execution stopped at the row limit, the portal has more rows.
    pub suspended: bool,
}

/// Encoded `Bind` parameters.
struct Bound {
    formats: Vec<PgFormat>,
    values: Vec<Option<Bytes>>,
    results: Vec<PgFormat>,
}

/// One result set of a simple query, before types are resolved.
#[derive(Default)]
struct RawSet {
    fields: Vec<FieldDescription>,
    rows: Vec<backend::DataRow>,
    rows_affected: u64,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Prepare a statement, parameter types are inferred by the server.
    pub async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        self.prepare_typed(sql, &[]).await
    }

    /// Prepare a statement with explicit parameter types.
    ///
    /// `types` may be shorter than the parameter list, zero leaves a type to the server.
    pub async fn prepare_typed(&mut self, sql: &str, types: &[Oid]) -> Result<Statement> {
        let name = StatementName::next();
        verbose!(statement = %name, sql, "prepare");

        self.begin(State::ExtendedQuery)?;
        self.send(frontend::Parse { prepare_name: name.as_str(), sql, oids: types });
        self.send(frontend::Describe { kind: b'S', name: name.as_str() });
        self.send(frontend::Sync);
        let result = self.describe_cycle().await;
        let (params, fields) = self.finish(result).await?;

        let columns = match self.describe_types(&params, fields).await {
            Ok(columns) => columns,
            Err(err) => {
                if !self.is_closed() {
                    self.close_name(&name).await?;
                }
                return Err(err);
            },
        };

        Ok(Statement::new(name, sql, params, columns))
    }

    async fn describe_types(&mut self, params: &[Oid], fields: Vec<FieldDescription>) -> Result<Vec<Column>> {
        for &oid in params {
            self.resolve_type(oid).await?;
        }
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            self.resolve_column(field.type_oid).await?;
            let format = self.codecs.result_format(field.type_oid);
            columns.push(Column::new(field).with_format(format));
        }
        Ok(columns)
    }

    async fn describe_cycle(&mut self) -> Result<(Vec<Oid>, Vec<FieldDescription>)> {
        self.flush().await?;
        self.recv::<backend::ParseComplete>().await?;
        let ParameterDescription { oids } = self.recv::<ParameterDescription>().await?;
        let fields = match self.recv::<BackendMessage>().await? {
            BackendMessage::RowDescription(rd) => rd.fields().collect()?,
            BackendMessage::NoData(_) => vec![],
            f => Err(f.unexpected("describe statement"))?,
        };
        self.ready().await?;
        Ok((oids, fields))
    }

    /// Resolve type of a parameter, or anything that must be encoded.
    ///
    /// A cached type whose constituents were invalidated is resolved again.
    pub(crate) async fn resolve_type(&mut self, oid: Oid) -> Result<()> {
        if self.codecs.registry().is_complete(oid) {
            return Ok(());
        }
        let registry = self.codecs.registry().clone();
        registry.resolve(oid, &mut *self).await?;
        Ok(())
    }

    /// Resolve type of a result column, an unknown type fails only its column.
    async fn resolve_column(&mut self, oid: Oid) -> Result<()> {
        match self.resolve_type(oid).await {
            Err(err) if matches!(err.kind(), ErrorKind::Type(_)) => {
                debug!("column type {oid} unresolved: {err}");
                Ok(())
            },
            result => result,
        }
    }

    /// Resolve types the registry dropped since the statement was prepared.
    async fn ensure_resolved(&mut self, stmt: &Statement) -> Result<()> {
        for &oid in stmt.params() {
            self.resolve_type(oid).await?;
        }
        for column in stmt.columns() {
            self.resolve_column(column.type_oid()).await?;
        }
        Ok(())
    }

    fn bind_params(&self, stmt: &Statement, params: &[Value]) -> Result<Bound> {
        if params.len() != stmt.params().len() {
            Err(CodecError::ParamCount { expected: stmt.params().len(), found: params.len() })?;
        }
        let mut formats = Vec::with_capacity(params.len());
        let mut values = Vec::with_capacity(params.len());
        for (&oid, value) in stmt.params().iter().zip(params) {
            let format = self.codecs.param_format(oid, value);
            values.push(self.codecs.encode(oid, format, value)?);
            formats.push(format);
        }
        let results = stmt.columns().iter().map(Column::format).collect();
        Ok(Bound { formats, values, results })
    }

    fn send_portal(&mut self, stmt: &Statement, bound: &Bound, max_rows: u32) {
        self.send(frontend::Bind {
            portal_name: "",
            stmt_name: stmt.name().as_str(),
            param_formats: &bound.formats,
            params: &bound.values,
            result_formats: &bound.results,
        });
        self.send(frontend::Execute { portal_name: "", max_row: max_rows });
    }

    /// Bind and execute a prepared statement.
    ///
    /// `max_rows` of zero fetches every row, otherwise execution stops at the limit
    /// and the result is marked [`suspended`][QueryResult::suspended].
    pub async fn execute_statement(&mut self, stmt: &Statement, params: &[Value], max_rows: u32) -> Result<QueryResult> {
        self.ensure_resolved(stmt).await?;
        let bound = self.bind_params(stmt, params)?;
        verbose!(statement = %stmt.name(), "execute");

        self.begin(State::ExtendedQuery)?;
        self.send_portal(stmt, &bound, max_rows);
        self.send(frontend::Sync);
        let result = self.execute_cycle(stmt).await;
        self.finish(result).await
    }

    async fn execute_cycle(&mut self, stmt: &Statement) -> Result<QueryResult> {
        self.flush().await?;
        let result = self.read_portal(&stmt.columns_arc()).await?;
        self.ready().await?;
        Ok(result)
    }

    async fn read_portal(&mut self, columns: &Arc<[Column]>) -> Result<QueryResult> {
        self.recv::<backend::BindComplete>().await?;
        let mut result = QueryResult::default();
        loop {
            use BackendMessage::*;
            match self.recv::<BackendMessage>().await? {
                DataRow(row) => {
                    let values = materialize(&self.codecs, columns, &row)?;
                    result.rows.push(Row::new(columns.clone(), values));
                },
                CommandComplete(cmd) => {
                    result.rows_affected = cmd.rows_affected();
                    break;
                },
                PortalSuspended(_) => {
                    result.suspended = true;
                    break;
                },
                EmptyQueryResponse(_) => break,
                f => Err(f.unexpected("execute"))?,
            }
        }
        Ok(result)
    }

    /// Execute several statements in one round trip.
    ///
    /// Every statement runs before a single `Sync`, a failing statement skips the
    /// remaining ones and its error is returned.
    pub async fn query_batch(&mut self, batch: &[(&Statement, &[Value])]) -> Result<Vec<QueryResult>> {
        let mut bound = Vec::with_capacity(batch.len());
        for (stmt, params) in batch {
            self.ensure_resolved(stmt).await?;
            bound.push(self.bind_params(stmt, params)?);
        }

        self.begin(State::ExtendedQuery)?;
        for ((stmt, _), bound) in batch.iter().zip(&bound) {
            self.send_portal(stmt, bound, 0);
        }
        self.send(frontend::Sync);
        let result = self.batch_cycle(batch).await;
        self.finish(result).await
    }

    async fn batch_cycle(&mut self, batch: &[(&Statement, &[Value])]) -> Result<Vec<QueryResult>> {
        self.flush().await?;
        let mut results = Vec::with_capacity(batch.len());
        for (stmt, _) in batch {
            results.push(self.read_portal(&stmt.columns_arc()).await?);
        }
        self.ready().await?;
        Ok(results)
    }

    /// Prepared statement of `sql` from the cache, or prepared and cached.
    ///
    /// The least recently used statement is closed on the server when evicted.
    pub async fn cached_statement(&mut self, sql: &str) -> Result<Statement> {
        let key = Self::statement_key(sql);
        if let Some(stmt) = self.statements.get(&key).filter(|stmt| stmt.sql() == sql) {
            return Ok(stmt.clone());
        }

        let stmt = self.prepare(sql).await?;
        if let Some((_, evicted)) = self.statements.push(key, stmt.clone()) {
            if evicted.name() != stmt.name() {
                debug!("evict statement {}", evicted.name());
                self.close_statement(&evicted).await?;
            }
        }
        Ok(stmt)
    }

    /// Close a prepared statement on the server.
    pub async fn close_statement(&mut self, stmt: &Statement) -> Result<()> {
        let key = Self::statement_key(stmt.sql());
        if self.statements.peek(&key).is_some_and(|cached| cached.name() == stmt.name()) {
            self.statements.pop(&key);
        }

        self.close_name(stmt.name()).await
    }

    async fn close_name(&mut self, name: &StatementName) -> Result<()> {
        self.begin(State::ExtendedQuery)?;
        self.send(frontend::Close { variant: b'S', name: name.as_str() });
        self.send(frontend::Sync);
        let result = self.close_cycle().await;
        self.finish(result).await
    }

    async fn close_cycle(&mut self) -> Result<()> {
        self.flush().await?;
        self.recv::<backend::CloseComplete>().await?;
        self.ready().await
    }

    /// Run `sql` with parameters, returns every row.
    ///
    /// The statement is prepared once and cached.
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let stmt = self.cached_statement(sql).await?;
        Ok(self.execute_statement(&stmt, params, 0).await?.rows)
    }

    /// Run `sql` with parameters, decoding each row.
    pub async fn query_as<R: FromRow>(&mut self, sql: &str, params: &[Value]) -> Result<Vec<R>> {
        let rows = self.query(sql, params).await?;
        rows.into_iter().map(|row| R::from_row(row).map_err(Into::into)).collect()
    }

    /// Run `sql` returning the first row.
    ///
    /// Errors with [`RowNotFound`] when there is no row, extra rows are ignored.
    pub async fn query_one(&mut self, sql: &str, params: &[Value]) -> Result<Row> {
        self.query_opt(sql, params).await?.ok_or_else(|| RowNotFound.into())
    }

    /// Run `sql` returning the first row, if any.
    pub async fn query_opt(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// Run `sql` with parameters, returns number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let stmt = self.cached_statement(sql).await?;
        Ok(self.execute_statement(&stmt, params, 0).await?.rows_affected)
    }

    /// Run one or more `;` separated statements with the simple query protocol.
    ///
    /// Values arrive in text format, one result per statement.
    pub async fn simple_query(&mut self, sql: &str) -> Result<Vec<QueryResult>> {
        verbose!(sql, "simple query");
        self.begin(State::SimpleQuery)?;
        self.send(frontend::Query { sql });
        let result = self.simple_cycle().await;
        let sets = self.finish(result).await?;

        let mut results = Vec::with_capacity(sets.len());
        for set in sets {
            for field in &set.fields {
                self.resolve_column(field.type_oid).await?;
            }
            let columns: Arc<[Column]> = set.fields.into_iter().map(Column::new).collect();
            let mut rows = Vec::with_capacity(set.rows.len());
            for row in &set.rows {
                let values = materialize(&self.codecs, &columns, row).map_err(|err| self.fail(err.into()))?;
                rows.push(Row::new(columns.clone(), values));
            }
            results.push(QueryResult { rows, rows_affected: set.rows_affected, suspended: false });
        }
        Ok(results)
    }

    async fn simple_cycle(&mut self) -> Result<Vec<RawSet>> {
        self.flush().await?;
        let mut sets = vec![];
        let mut current = None::<RawSet>;
        loop {
            use BackendMessage::*;
            match self.recv::<BackendMessage>().await? {
                RowDescription(rd) => {
                    current = Some(RawSet { fields: rd.fields().collect()?, ..Default::default() });
                },
                DataRow(row) => match &mut current {
                    Some(set) => set.rows.push(row),
                    None => Err(ProtocolError::unexpected_phase(b'D', "simple query without row description"))?,
                },
                CommandComplete(cmd) => {
                    let mut set = current.take().unwrap_or_default();
                    set.rows_affected = cmd.rows_affected();
                    sets.push(set);
                },
                EmptyQueryResponse(_) => {},
                // COPY needs a data source, rejected so the server ends the cycle
                CopyInResponse(_) => {
                    self.send(frontend::CopyFail { message: "COPY FROM STDIN requires copy_in" });
                    self.flush().await?;
                },
                CopyOutResponse(_) | CopyData(_) | CopyDone(_) => {},
                ReadyForQuery(ready) => {
                    self.status = ready.status;
                    break;
                },
                f => Err(f.unexpected("simple query"))?,
            }
        }
        Ok(sets)
    }
}
