//! SQL over the current snapshot
//!
//! The snapshot is copied into an in-memory SQLite table named `azq` before
//! each statement runs, so user queries may read or even mutate the table
//! without touching the stored snapshot. The result is rebuilt as an Arrow
//! batch with column types inferred from the declared column type and the
//! returned values.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder, TimestampMicrosecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use thiserror::Error;
use tracing::debug;

use crate::store::{Cell, Snapshot};

/// Table name queries refer to
pub const TABLE_ALIAS: &str = "azq";

const SQL_TIMESTAMP: &str = "TIMESTAMP";
const TIMESTAMP_WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_READ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query text is empty")]
    EmptyQuery,

    #[error("no data to query")]
    EmptyStore,

    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

pub struct QueryEngine {
    conn: Connection,
    executions: usize,
}

impl QueryEngine {
    pub fn open_in_memory() -> Result<Self, QueryError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            executions: 0,
        })
    }

    /// Statements handed to SQLite so far
    pub fn executions(&self) -> usize {
        self.executions
    }

    /// Run one statement against `snapshot` registered as `azq`
    pub fn run(&mut self, snapshot: &Snapshot, sql: &str) -> Result<Snapshot, QueryError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        if snapshot.is_empty() {
            return Err(QueryError::EmptyStore);
        }

        self.register(snapshot)?;
        self.executions += 1;
        let result = self.execute(sql)?;
        debug!(
            rows_in = snapshot.num_rows(),
            rows_out = result.num_rows(),
            columns = result.batch().num_columns(),
            "Query executed"
        );
        Ok(result)
    }

    fn register(&mut self, snapshot: &Snapshot) -> Result<(), QueryError> {
        let schema = snapshot.schema();
        let column_defs: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| format!("{} {}", quote_ident(f.name()), sql_type(f.data_type())))
            .collect();
        let placeholders = vec!["?"; schema.fields().len()].join(", ");

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {alias}; CREATE TABLE {alias} ({cols});",
            alias = TABLE_ALIAS,
            cols = column_defs.join(", ")
        ))?;
        {
            let mut insert =
                tx.prepare(&format!("INSERT INTO {} VALUES ({})", TABLE_ALIAS, placeholders))?;
            for row in snapshot.rows()? {
                insert.execute(params_from_iter(row.into_iter().map(to_sql_value)))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<Snapshot, QueryError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .collect();

        let mut values: Vec<Vec<Value>> = vec![Vec::new(); columns.len()];
        let mut num_rows = 0usize;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (i, column) in values.iter_mut().enumerate() {
                column.push(row.get::<_, Value>(i)?);
            }
            num_rows += 1;
        }

        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays = Vec::with_capacity(columns.len());
        for ((name, decl), column) in columns.into_iter().zip(values) {
            let (data_type, array) = build_column(column, decl.as_deref());
            fields.push(Field::new(name, data_type, true));
            arrays.push(array);
        }

        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        let batch =
            RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
        Ok(Snapshot::new(batch))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Boolean => "INTEGER",
        DataType::Float16 | DataType::Float32 | DataType::Float64 => "REAL",
        DataType::Timestamp(_, _) => SQL_TIMESTAMP,
        _ => "TEXT",
    }
}

fn to_sql_value(cell: Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Int(v) => Value::Integer(v),
        Cell::Float(v) => Value::Real(v),
        Cell::Text(v) => Value::Text(v),
        Cell::Timestamp(t) => Value::Text(t.format(TIMESTAMP_WRITE_FORMAT).to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inferred {
    Int,
    Float,
    Text,
}

fn infer(values: &[Value], decl: Option<&str>) -> Inferred {
    let mut inferred: Option<Inferred> = None;
    for value in values {
        let this = match value {
            Value::Null => continue,
            Value::Integer(_) => Inferred::Int,
            Value::Real(_) => Inferred::Float,
            Value::Text(_) | Value::Blob(_) => return Inferred::Text,
        };
        inferred = Some(match (inferred, this) {
            (Some(Inferred::Float), _) | (_, Inferred::Float) => Inferred::Float,
            _ => Inferred::Int,
        });
    }
    inferred.unwrap_or_else(|| match decl.map(str::to_ascii_uppercase).as_deref() {
        Some("INTEGER") => Inferred::Int,
        Some("REAL") => Inferred::Float,
        _ => Inferred::Text,
    })
}

fn build_column(values: Vec<Value>, decl: Option<&str>) -> (DataType, ArrayRef) {
    if decl.is_some_and(|d| d.eq_ignore_ascii_case(SQL_TIMESTAMP)) {
        if let Some(array) = timestamp_column(&values) {
            return (DataType::Timestamp(TimeUnit::Microsecond, None), array);
        }
    }

    match infer(&values, decl) {
        Inferred::Int => {
            let mut b = Int64Builder::with_capacity(values.len());
            for v in &values {
                match v {
                    Value::Integer(i) => b.append_value(*i),
                    _ => b.append_null(),
                }
            }
            (DataType::Int64, Arc::new(b.finish()))
        }
        Inferred::Float => {
            let mut b = Float64Builder::with_capacity(values.len());
            for v in &values {
                match v {
                    Value::Integer(i) => b.append_value(*i as f64),
                    Value::Real(f) => b.append_value(*f),
                    _ => b.append_null(),
                }
            }
            (DataType::Float64, Arc::new(b.finish()))
        }
        Inferred::Text => {
            let mut b = StringBuilder::new();
            for v in &values {
                match v {
                    Value::Null => b.append_null(),
                    Value::Integer(i) => b.append_value(i.to_string()),
                    Value::Real(f) => b.append_value(f.to_string()),
                    Value::Text(s) => b.append_value(s),
                    Value::Blob(bytes) => b.append_value(String::from_utf8_lossy(bytes)),
                }
            }
            (DataType::Utf8, Arc::new(b.finish()))
        }
    }
}

/// None if any non-null value is not a timestamp string
fn timestamp_column(values: &[Value]) -> Option<ArrayRef> {
    let mut b = TimestampMicrosecondBuilder::with_capacity(values.len());
    for v in values {
        match v {
            Value::Null => b.append_null(),
            Value::Text(s) => {
                let t = NaiveDateTime::parse_from_str(s, TIMESTAMP_READ_FORMAT).ok()?;
                b.append_value(t.and_utc().timestamp_micros());
            }
            _ => return None,
        }
    }
    Some(Arc::new(b.finish()))
}
