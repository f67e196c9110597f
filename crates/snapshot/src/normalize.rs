//! Raw broker messages to tabular rows
//!
//! Active and dead-letter snapshots have different column sets, so the
//! normalized rows are tagged by queue kind rather than carried as a
//! loosely typed row map.

use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use qpeek_middleware::{QueueKind, RawMessage, DEAD_LETTER_ERROR_DESCRIPTION, DEAD_LETTER_REASON};

use crate::store::Snapshot;

pub const COL_ID: &str = "id";
pub const COL_SEQUENCE_NUM: &str = "sequence_num";
pub const COL_MESSAGE_ID: &str = "message_id";
pub const COL_MESSAGE: &str = "message";
pub const COL_ENQUEUED_TIME_UTC: &str = "enqueued_time_utc";
pub const COL_DEAD_LETTER_REASON: &str = "dead_letter_reason";
pub const COL_DEAD_LETTER_ERROR_DESCRIPTION: &str = "dead_letter_error_description";

fn ts_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

/// Column layout for a snapshot of the given queue kind
pub fn record_schema(kind: QueueKind) -> SchemaRef {
    let mut fields = vec![
        Field::new(COL_ID, DataType::Int64, false),
        Field::new(COL_SEQUENCE_NUM, DataType::Utf8, false),
        Field::new(COL_MESSAGE_ID, DataType::Utf8, false),
        Field::new(COL_MESSAGE, DataType::Utf8, false),
        Field::new(COL_ENQUEUED_TIME_UTC, ts_type(), true),
    ];
    if kind.is_dead_letter() {
        fields.push(Field::new(COL_DEAD_LETTER_REASON, DataType::Utf8, false));
        fields.push(Field::new(
            COL_DEAD_LETTER_ERROR_DESCRIPTION,
            DataType::Utf8,
            false,
        ));
    }
    Arc::new(Schema::new(fields))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    /// 1-based position in the fetch result
    pub id: i64,
    pub sequence_num: String,
    pub message_id: String,
    pub message: String,
    pub enqueued_time_utc: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterRow {
    pub row: MessageRow,
    pub dead_letter_reason: String,
    pub dead_letter_error_description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRows {
    Active(Vec<MessageRow>),
    DeadLetter(Vec<DeadLetterRow>),
}

/// Convert fetched messages to rows, numbering them from 1 in fetch order
pub fn normalize(messages: Vec<RawMessage>, kind: QueueKind) -> NormalizedRows {
    let rows = messages
        .iter()
        .enumerate()
        .map(|(i, msg)| message_row(i as i64 + 1, msg));

    match kind {
        QueueKind::Active => NormalizedRows::Active(rows.collect()),
        QueueKind::DeadLetter => NormalizedRows::DeadLetter(
            rows.zip(&messages)
                .map(|(row, msg)| DeadLetterRow {
                    row,
                    dead_letter_reason: property_text(msg, DEAD_LETTER_REASON),
                    dead_letter_error_description: property_text(
                        msg,
                        DEAD_LETTER_ERROR_DESCRIPTION,
                    ),
                })
                .collect(),
        ),
    }
}

fn message_row(id: i64, msg: &RawMessage) -> MessageRow {
    MessageRow {
        id,
        sequence_num: msg
            .sequence_number
            .map(|s| s.to_string())
            .unwrap_or_default(),
        message_id: msg.message_id.clone().unwrap_or_default(),
        message: single_line(&msg.body_text()),
        enqueued_time_utc: msg.enqueued_time_utc.map(|t| t.naive_utc()),
    }
}

/// Body text with line feeds turned into spaces and carriage returns dropped
pub(crate) fn single_line(text: &str) -> String {
    text.replace('\n', " ").replace('\r', "")
}

fn property_text(msg: &RawMessage, key: &[u8]) -> String {
    msg.property(key)
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .unwrap_or_default()
}

impl NormalizedRows {
    pub fn kind(&self) -> QueueKind {
        match self {
            NormalizedRows::Active(_) => QueueKind::Active,
            NormalizedRows::DeadLetter(_) => QueueKind::DeadLetter,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NormalizedRows::Active(rows) => rows.len(),
            NormalizedRows::DeadLetter(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let schema = record_schema(self.kind());
        match self {
            NormalizedRows::Active(rows) => {
                RecordBatch::try_new(schema, common_columns(rows.iter()))
            }
            NormalizedRows::DeadLetter(rows) => {
                let mut columns = common_columns(rows.iter().map(|r| &r.row));
                let mut reason = StringBuilder::new();
                let mut description = StringBuilder::new();
                for r in rows {
                    reason.append_value(&r.dead_letter_reason);
                    description.append_value(&r.dead_letter_error_description);
                }
                columns.push(Arc::new(reason.finish()));
                columns.push(Arc::new(description.finish()));
                RecordBatch::try_new(schema, columns)
            }
        }
    }

    pub fn into_snapshot(self) -> Result<Snapshot, ArrowError> {
        self.to_record_batch().map(Snapshot::new)
    }
}

fn common_columns<'a>(rows: impl Iterator<Item = &'a MessageRow>) -> Vec<ArrayRef> {
    let mut id = Int64Builder::new();
    let mut sequence_num = StringBuilder::new();
    let mut message_id = StringBuilder::new();
    let mut message = StringBuilder::new();
    let mut enqueued = TimestampMicrosecondBuilder::new();

    for row in rows {
        id.append_value(row.id);
        sequence_num.append_value(&row.sequence_num);
        message_id.append_value(&row.message_id);
        message.append_value(&row.message);
        enqueued.append_option(row.enqueued_time_utc.map(|t| t.and_utc().timestamp_micros()));
    }

    vec![
        Arc::new(id.finish()),
        Arc::new(sequence_num.finish()),
        Arc::new(message_id.finish()),
        Arc::new(message.finish()),
        Arc::new(enqueued.finish()),
    ]
}
