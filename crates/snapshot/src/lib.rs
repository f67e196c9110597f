//! qpeek-snapshot: non-destructive queue snapshots
//!
//! Pages through a queue (or its dead-letter sub-queue) with peek calls,
//! normalizes the messages into a fixed Arrow schema, and lets callers run
//! SQL over the snapshot under the `azq` alias before rendering or
//! exporting it.

pub mod display;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod normalize;
pub mod query;
pub mod session;
pub mod store;
pub mod window;

pub use display::{render, DisplayOptions};
pub use error::{Error, ErrorKind};
pub use export::{export_snapshot, ExportError, ExportFormat, ExportSummary};
pub use fetcher::{FetchRequest, SnapshotFetcher};
pub use normalize::{normalize, record_schema, DeadLetterRow, MessageRow, NormalizedRows};
pub use query::{QueryEngine, QueryError, TABLE_ALIAS};
pub use session::{LoadRequest, Session, SessionState};
pub use store::{Cell, Snapshot, TabularStore};
pub use window::PeekWindow;

pub type Result<T> = std::result::Result<T, Error>;
