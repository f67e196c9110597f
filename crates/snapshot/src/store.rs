use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::*;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use chrono::{DateTime, NaiveDateTime};

/// One immutable table: either a fetch result or a query result
#[derive(Debug, Clone)]
pub struct Snapshot {
    batch: RecordBatch,
}

/// A single cell value, detached from Arrow
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Snapshot {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(RecordBatch::new_empty(schema))
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn columns(&self) -> Vec<String> {
        self.batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.batch.schema_ref().index_of(name).ok()
    }

    pub fn cell(&self, row: usize, column: usize) -> Result<Cell, ArrowError> {
        cell_at(self.batch.column(column), row)
    }

    pub fn row(&self, row: usize) -> Result<Vec<Cell>, ArrowError> {
        (0..self.batch.num_columns())
            .map(|c| self.cell(row, c))
            .collect()
    }

    pub fn rows(&self) -> Result<Vec<Vec<Cell>>, ArrowError> {
        (0..self.num_rows()).map(|r| self.row(r)).collect()
    }
}

fn cell_at(array: &ArrayRef, row: usize) -> Result<Cell, ArrowError> {
    if array.is_null(row) {
        return Ok(Cell::Null);
    }
    let cell = match array.data_type() {
        DataType::Int64 => Cell::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::Int32 => Cell::Int(array.as_primitive::<Int32Type>().value(row) as i64),
        DataType::UInt32 => Cell::Int(array.as_primitive::<UInt32Type>().value(row) as i64),
        DataType::UInt64 => {
            let v = array.as_primitive::<UInt64Type>().value(row);
            match i64::try_from(v) {
                Ok(v) => Cell::Int(v),
                Err(_) => Cell::Text(v.to_string()),
            }
        }
        DataType::Float64 => Cell::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Float32 => Cell::Float(array.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Boolean => Cell::Int(array.as_boolean().value(row) as i64),
        DataType::Utf8 => Cell::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Cell::Text(array.as_string::<i64>().value(row).to_string()),
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let micros = array.as_primitive::<TimestampMicrosecondType>().value(row);
            match DateTime::from_timestamp_micros(micros) {
                Some(t) => Cell::Timestamp(t.naive_utc()),
                None => Cell::Null,
            }
        }
        _ => Cell::Text(array_value_to_string(array, row)?),
    };
    Ok(cell)
}

/// Holder of the current snapshot. Each load or query replaces it whole.
#[derive(Debug, Default)]
pub struct TabularStore {
    current: Option<Snapshot>,
}

impl TabularStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, snapshot: Snapshot) -> &Snapshot {
        self.current.insert(snapshot)
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.as_ref().map_or(true, Snapshot::is_empty)
    }

    pub fn num_rows(&self) -> usize {
        self.current.as_ref().map_or(0, Snapshot::num_rows)
    }

    pub fn columns(&self) -> Vec<String> {
        self.current
            .as_ref()
            .map(Snapshot::columns)
            .unwrap_or_default()
    }

    pub fn rows(&self) -> Result<Vec<Vec<Cell>>, ArrowError> {
        match &self.current {
            Some(snapshot) => snapshot.rows(),
            None => Ok(Vec::new()),
        }
    }
}
