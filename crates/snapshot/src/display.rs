use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, StringBuilder};
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use qpeek_metadata::DisplayConfig;

use crate::normalize::{single_line, COL_MESSAGE};
use crate::store::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Show message bodies untruncated
    pub full_message: bool,
    /// Characters of the message column kept when truncating
    pub truncate_width: usize,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self::from(&DisplayConfig::default())
    }
}

impl From<&DisplayConfig> for DisplayOptions {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            full_message: false,
            truncate_width: config.truncate_width,
        }
    }
}

/// Copy of `snapshot` as it should be shown. The stored snapshot is never
/// modified; only this copy has its message column shortened.
pub fn display_copy(snapshot: &Snapshot, options: &DisplayOptions) -> Result<RecordBatch, ArrowError> {
    let batch = snapshot.batch();
    let Some(idx) = snapshot.column_index(COL_MESSAGE) else {
        return Ok(batch.clone());
    };
    if options.full_message || batch.column(idx).data_type() != &DataType::Utf8 {
        return Ok(batch.clone());
    }

    let source = batch.column(idx).as_string::<i32>();
    let mut truncated = StringBuilder::new();
    for i in 0..source.len() {
        if source.is_null(i) {
            truncated.append_null();
        } else {
            truncated.append_value(truncate(source.value(i), options.truncate_width));
        }
    }

    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns[idx] = Arc::new(truncated.finish());
    RecordBatch::try_new(batch.schema(), columns)
}

fn truncate(text: &str, width: usize) -> String {
    single_line(text).chars().take(width).collect()
}

/// Bordered text grid of the snapshot
pub fn render(snapshot: &Snapshot, options: &DisplayOptions) -> Result<String, ArrowError> {
    let batch = display_copy(snapshot, options)?;
    Ok(pretty_format_batches(&[batch])?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::store::Cell;
    use qpeek_middleware::{QueueKind, RawMessage};

    fn snapshot() -> Snapshot {
        normalize(
            vec![
                RawMessage::new(1, "a fairly long message body that will be cut"),
                RawMessage::new(2, "short"),
            ],
            QueueKind::Active,
        )
        .into_snapshot()
        .unwrap()
    }

    #[test]
    fn test_default_width() {
        let options = DisplayOptions::default();
        assert_eq!(options.truncate_width, 20);
        assert!(!options.full_message);
    }

    #[test]
    fn test_truncation_leaves_store_untouched() {
        let snap = snapshot();
        let options = DisplayOptions::default();
        let shown = Snapshot::new(display_copy(&snap, &options).unwrap());

        assert_eq!(
            shown.cell(0, 3).unwrap(),
            Cell::Text("a fairly long messag".into())
        );
        assert_eq!(shown.cell(1, 3).unwrap(), Cell::Text("short".into()));
        assert_eq!(
            snap.cell(0, 3).unwrap(),
            Cell::Text("a fairly long message body that will be cut".into())
        );
    }

    #[test]
    fn test_full_message_mode() {
        let snap = snapshot();
        let options = DisplayOptions {
            full_message: true,
            truncate_width: 5,
        };
        let rendered = render(&snap, &options).unwrap();
        assert!(rendered.contains("a fairly long message body that will be cut"));
    }

    #[test]
    fn test_truncates_on_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 4), "héll");
    }

    #[test]
    fn test_render_grid() {
        let rendered = render(&snapshot(), &DisplayOptions::default()).unwrap();
        assert!(rendered.starts_with('+'));
        assert!(rendered.contains("| id"));
        assert!(rendered.contains("a fairly long messag "));
        assert!(!rendered.contains("will be cut"));
    }

    #[test]
    fn test_snapshot_without_message_column() {
        let mut engine = crate::query::QueryEngine::open_in_memory().unwrap();
        let counted = engine.run(&snapshot(), "SELECT COUNT(*) AS n FROM azq").unwrap();
        let rendered = render(&counted, &DisplayOptions::default()).unwrap();
        assert!(rendered.contains("| n |"));
    }
}
