//! Statement execution and row fetching.
//!
//! A [`Cursor`] issues statements on a borrowed [`Connection`] and holds the
//! most recent result for forward-only fetching. Immediate queries embed
//! named parameters as typed literals in the query text; prepared execution
//! sends binary-encoded values bound to the positional slots fixed at
//! prepare time.

use bytes::BytesMut;

use crate::codec::notation;
use crate::codec::result::{decode_result, Column, QueryResult, ResultSet, Row};
use crate::codec::value::Value;
use crate::connection::Connection;
use crate::error::{MeridianError, Result};
use crate::protocol::Opcode;

/// Consistency level sent with QUERY and EXECUTE requests.
const CONSISTENCY_ONE: u16 = 0x0001;

/// A parameterized query registered with the server.
///
/// Reusable across any number of executions on the connection that prepared
/// it. A server-side schema change invalidates the statement; the server
/// reports that as an error on the next execution, and the caller re-prepares.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    id: Vec<u8>,
    params: Vec<Column>,
    query: String,
}

impl PreparedStatement {
    /// The source query text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Bind parameter metadata, in positional order.
    pub fn params(&self) -> &[Column] {
        &self.params
    }
}

/// Statement executor bound to one connection.
pub struct Cursor<'a> {
    conn: &'a Connection,
    result: Option<ResultSet>,
    pos: usize,
    rowcount: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            result: None,
            pos: 0,
            rowcount: 0,
        }
    }

    /// Execute an immediate query.
    ///
    /// Named `:name` parameters are substituted into the query text as typed
    /// literals before sending; a referenced name missing from `params` is a
    /// programming error. Pass an empty slice to send the text untouched.
    pub async fn execute(&mut self, query: &str, params: &[(&str, Value)]) -> Result<()> {
        let text = if params.is_empty() {
            query.to_string()
        } else {
            substitute_params(query, params)?
        };

        let mut body = BytesMut::new();
        notation::put_long_string(&mut body, &text);
        notation::put_short(&mut body, CONSISTENCY_ONE);

        let (opcode, bytes) = self.conn.request(Opcode::Query, &body).await?;
        self.consume_result(opcode, &bytes)
    }

    /// Register a parameterized query with the server.
    pub async fn prepare(&mut self, query: &str) -> Result<PreparedStatement> {
        let mut body = BytesMut::new();
        notation::put_long_string(&mut body, query);

        let (opcode, bytes) = self.conn.request(Opcode::Prepare, &body).await?;
        if opcode != Opcode::Result {
            return Err(MeridianError::Protocol(format!(
                "unexpected {:?} response to a prepare request",
                opcode
            )));
        }
        match decode_result(&bytes)? {
            QueryResult::Prepared(info) => Ok(PreparedStatement {
                id: info.id,
                params: info.params,
                query: query.to_string(),
            }),
            other => Err(MeridianError::Protocol(format!(
                "expected a prepared result, got a {} result",
                kind_name(&other)
            ))),
        }
    }

    /// Execute a prepared statement with named parameters.
    ///
    /// Each bind slot takes the value supplied under its name, encoded per
    /// the slot's wire type. A missing name is a programming error.
    pub async fn execute_prepared(
        &mut self,
        stmt: &PreparedStatement,
        params: &[(&str, Value)],
    ) -> Result<()> {
        let mut body = BytesMut::new();
        notation::put_short_bytes(&mut body, &stmt.id);
        notation::put_short(&mut body, stmt.params.len() as u16);
        for column in &stmt.params {
            let value = params
                .iter()
                .find(|(name, _)| *name == column.name)
                .map(|(_, value)| value)
                .ok_or_else(|| {
                    MeridianError::Programming(format!(
                        "missing value for bind parameter :{}",
                        column.name
                    ))
                })?;
            let cell = value.encode_for(column.ty)?;
            notation::put_bytes(&mut body, cell.as_deref());
        }
        notation::put_short(&mut body, CONSISTENCY_ONE);

        let (opcode, bytes) = self.conn.request(Opcode::Execute, &body).await?;
        self.consume_result(opcode, &bytes)
    }

    /// Fetch the next row of the current result, advancing the cursor.
    pub fn fetchone(&mut self) -> Option<Row> {
        let rs = self.result.as_ref()?;
        let row = rs.rows().get(self.pos)?.clone();
        self.pos += 1;
        Some(row)
    }

    /// Fetch all remaining rows of the current result.
    pub fn fetchall(&mut self) -> Vec<Row> {
        let Some(rs) = self.result.as_ref() else {
            return Vec::new();
        };
        let rows = rs.rows()[self.pos..].to_vec();
        self.pos = rs.rows().len();
        rows
    }

    /// Column metadata of the current result, if it produced rows.
    pub fn description(&self) -> Option<&[Column]> {
        self.result.as_ref().map(|rs| rs.columns())
    }

    /// Row count of the current result.
    pub fn rowcount(&self) -> usize {
        self.rowcount
    }

    fn consume_result(&mut self, opcode: Opcode, body: &[u8]) -> Result<()> {
        if opcode != Opcode::Result {
            return Err(MeridianError::Protocol(format!(
                "unexpected {:?} response to a query",
                opcode
            )));
        }
        self.result = None;
        self.pos = 0;
        self.rowcount = 0;
        match decode_result(body)? {
            QueryResult::Rows(rs) => {
                self.rowcount = rs.len();
                self.result = Some(rs);
            }
            QueryResult::Void | QueryResult::SchemaChange { .. } => {}
            QueryResult::SetKeyspace(keyspace) => self.conn.set_keyspace(keyspace),
            QueryResult::Prepared(_) => {
                return Err(MeridianError::Protocol(
                    "unexpected prepared result for an immediate query".to_string(),
                ))
            }
        }
        Ok(())
    }
}

fn kind_name(result: &QueryResult) -> &'static str {
    match result {
        QueryResult::Void => "void",
        QueryResult::Rows(_) => "rows",
        QueryResult::SetKeyspace(_) => "set-keyspace",
        QueryResult::Prepared(_) => "prepared",
        QueryResult::SchemaChange { .. } => "schema-change",
    }
}

/// Replace `:name` markers with typed literals.
///
/// Quoted text is passed through untouched (with `''` as the escape), so a
/// colon inside a string literal never starts a marker.
fn substitute_params(query: &str, params: &[(&str, Value)]) -> Result<String> {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\'' {
                in_string = false;
            }
            continue;
        }
        match c {
            '\'' => {
                in_string = true;
                out.push(c);
            }
            ':' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    out.push(':');
                    continue;
                }
                let value = params
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value)
                    .ok_or_else(|| {
                        MeridianError::Programming(format!(
                            "missing value for bind parameter :{}",
                            name
                        ))
                    })?;
                out.push_str(&value.literal());
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}
