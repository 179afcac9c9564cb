//! RESULT body decoding: kinds, column metadata, and row payloads.
//!
//! A rows result carries metadata (column names and type tags) followed by a
//! row count and the row payloads as `[bytes]` cells. The decoder enforces
//! the arity invariant by construction: every row it yields has exactly one
//! value per column, in column order.

use crate::codec::notation;
use crate::codec::value::{ColumnType, Value};
use crate::error::{MeridianError, Result};

/// Result kinds (`[int]` discriminant at the head of a RESULT body).
pub const RESULT_VOID: i32 = 0x01;
pub const RESULT_ROWS: i32 = 0x02;
pub const RESULT_SET_KEYSPACE: i32 = 0x03;
pub const RESULT_PREPARED: i32 = 0x04;
pub const RESULT_SCHEMA_CHANGE: i32 = 0x05;

/// Rows-metadata flag: keyspace and table are given once, globally.
pub const FLAG_GLOBAL_TABLE_SPEC: i32 = 0x01;

/// One column of result (or bind-parameter) metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub ty: ColumnType,
}

/// An ordered sequence of typed values aligned to the column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Get a value by column position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of values (equals the result's column count).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

/// A fully materialized rows result.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl ResultSet {
    /// Column metadata, in wire order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// All rows, in wire order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Server response to a PREPARE request.
#[derive(Debug, Clone)]
pub struct PreparedInfo {
    /// Server-assigned statement id.
    pub id: Vec<u8>,
    /// Bind parameter metadata, in positional order.
    pub params: Vec<Column>,
}

/// A decoded RESULT body.
#[derive(Debug, Clone)]
pub enum QueryResult {
    Void,
    Rows(ResultSet),
    SetKeyspace(String),
    Prepared(PreparedInfo),
    SchemaChange {
        change: String,
        keyspace: String,
        table: String,
    },
}

/// Decode a complete RESULT body.
///
/// Fails with a protocol error on an unknown kind, an unknown type tag, a
/// truncated payload, or trailing bytes after the result.
pub fn decode_result(body: &[u8]) -> Result<QueryResult> {
    let mut cur: &[u8] = body;
    let kind = notation::read_int(&mut cur)?;
    let result = match kind {
        RESULT_VOID => QueryResult::Void,
        RESULT_ROWS => {
            let columns = decode_metadata(&mut cur)?;
            let row_count = notation::read_int(&mut cur)?;
            if row_count < 0 {
                return Err(MeridianError::Protocol(format!(
                    "negative row count {}",
                    row_count
                )));
            }
            let mut rows = Vec::with_capacity((row_count as usize).min(65536));
            for _ in 0..row_count {
                let mut values = Vec::with_capacity(columns.len());
                for column in &columns {
                    let cell = notation::read_bytes(&mut cur)?;
                    values.push(Value::decode_cell(column.ty, cell.as_deref())?);
                }
                rows.push(Row { values });
            }
            QueryResult::Rows(ResultSet { columns, rows })
        }
        RESULT_SET_KEYSPACE => QueryResult::SetKeyspace(notation::read_string(&mut cur)?),
        RESULT_PREPARED => {
            let id = notation::read_short_bytes(&mut cur)?;
            let params = decode_metadata(&mut cur)?;
            QueryResult::Prepared(PreparedInfo { id, params })
        }
        RESULT_SCHEMA_CHANGE => QueryResult::SchemaChange {
            change: notation::read_string(&mut cur)?,
            keyspace: notation::read_string(&mut cur)?,
            table: notation::read_string(&mut cur)?,
        },
        other => {
            return Err(MeridianError::Protocol(format!(
                "unknown result kind {}",
                other
            )))
        }
    };
    if !cur.is_empty() {
        return Err(MeridianError::Protocol(format!(
            "{} trailing bytes after result body",
            cur.len()
        )));
    }
    Ok(result)
}

fn decode_metadata(cur: &mut &[u8]) -> Result<Vec<Column>> {
    let meta_flags = notation::read_int(cur)?;
    let column_count = notation::read_int(cur)?;
    if column_count < 0 {
        return Err(MeridianError::Protocol(format!(
            "negative column count {}",
            column_count
        )));
    }
    let global = meta_flags & FLAG_GLOBAL_TABLE_SPEC != 0;
    let (global_ks, global_table) = if global {
        (notation::read_string(cur)?, notation::read_string(cur)?)
    } else {
        (String::new(), String::new())
    };

    let mut columns = Vec::with_capacity((column_count as usize).min(4096));
    for _ in 0..column_count {
        let (keyspace, table) = if global {
            (global_ks.clone(), global_table.clone())
        } else {
            (notation::read_string(cur)?, notation::read_string(cur)?)
        };
        let name = notation::read_string(cur)?;
        let ty = ColumnType::from_tag(notation::read_short(cur)?)?;
        columns.push(Column {
            keyspace,
            table,
            name,
            ty,
        });
    }
    Ok(columns)
}
