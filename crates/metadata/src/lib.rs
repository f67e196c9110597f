//! qpeek-metadata: settings shared by the snapshot core and the CLI
//!
//! Maps environment names to broker connection strings and carries the
//! peek/display tuning knobs. Loaded once at startup and passed around
//! explicitly.

pub mod environment;
pub mod error;

pub use environment::{
    DisplayConfig, PeekConfig, Settings, DEFAULT_PAGE_CAP, DEFAULT_TRUNCATE_WIDTH, MAX_PAGE_CAP,
    MIN_PAGE_CAP,
};
pub use error::MetadataError;
