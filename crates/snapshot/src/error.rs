//! Error types for qpeek-snapshot
//!
//! Every variant displays as a short category message suitable for an
//! operator. The underlying cause is kept as the error source for logging.

use arrow::error::ArrowError;
use qpeek_middleware::BrokerError;
use thiserror::Error;

use crate::export::ExportError;
use crate::query::QueryError;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad input: missing queue name, malformed window, nothing loaded
    #[error("{0}")]
    Validation(String),

    /// Broker unreachable, rejected credentials, or a failed page
    #[error("Failed to receive messages.")]
    Connectivity(#[source] BrokerError),

    /// Query text or SQL engine failure
    #[error("Query execution failed.")]
    Query(#[source] QueryError),

    /// Export sink failure
    #[error("Failed to export.")]
    Export(#[source] ExportError),

    /// Snapshot construction or rendering failure
    #[error("Failed to build snapshot.")]
    Snapshot(#[source] ArrowError),
}

/// Category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Connectivity,
    Query,
    Export,
    Snapshot,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Connectivity(_) => ErrorKind::Connectivity,
            Error::Query(_) => ErrorKind::Query,
            Error::Export(_) => ErrorKind::Export,
            Error::Snapshot(_) => ErrorKind::Snapshot,
        }
    }

    /// Message safe to show an operator; never includes the cause
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
