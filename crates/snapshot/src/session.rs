//! One operator session: load, query, render, export
//!
//! The session owns the only tabular store and the query engine. Every
//! operation takes `&mut self` or `&self`, so a load and a query can never
//! overlap.

use std::path::Path;
use std::sync::Arc;

use qpeek_metadata::Settings;
use qpeek_middleware::{BrokerConnector, BrokerFactory, QueueKind};
use tracing::{error, info, warn};

use crate::display::{render, DisplayOptions};
use crate::error::Error;
use crate::export::{export_snapshot, ExportFormat, ExportSummary};
use crate::fetcher::{FetchRequest, SnapshotFetcher};
use crate::normalize::normalize;
use crate::query::{QueryEngine, QueryError};
use crate::store::{Snapshot, TabularStore};
use crate::window::PeekWindow;
use crate::Result;

/// Whether the store holds rows that can be queried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Empty,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub environment: String,
    pub queue_name: String,
    pub kind: QueueKind,
    pub window: PeekWindow,
}

impl LoadRequest {
    pub fn new(
        environment: impl Into<String>,
        queue_name: impl Into<String>,
        kind: QueueKind,
        window: PeekWindow,
    ) -> Self {
        Self {
            environment: environment.into(),
            queue_name: queue_name.into(),
            kind,
            window,
        }
    }
}

enum ConnectorSource {
    /// Every environment goes through the same connector
    Shared(Arc<dyn BrokerConnector>),
    /// Pick a backend from each environment's connection scheme
    ByScheme,
}

pub struct Session {
    settings: Settings,
    connectors: ConnectorSource,
    page_cap: usize,
    engine: QueryEngine,
    store: TabularStore,
    state: SessionState,
    display: DisplayOptions,
}

impl Session {
    /// Session whose backends are chosen per environment from the
    /// connection string scheme
    pub fn new(settings: Settings) -> Result<Self> {
        Self::build(settings, ConnectorSource::ByScheme)
    }

    /// Session that routes every environment through `connector`
    pub fn with_connector(settings: Settings, connector: Arc<dyn BrokerConnector>) -> Result<Self> {
        Self::build(settings, ConnectorSource::Shared(connector))
    }

    fn build(settings: Settings, connectors: ConnectorSource) -> Result<Self> {
        let (peek, clamped) = settings.peek.clone().validated();
        if clamped {
            warn!(
                configured = settings.peek.page_cap,
                page_cap = peek.page_cap,
                "Page cap out of range, clamped"
            );
        }
        let engine = QueryEngine::open_in_memory().map_err(Error::Query)?;
        let display = DisplayOptions::from(&settings.display);
        Ok(Self {
            page_cap: peek.page_cap,
            settings,
            connectors,
            engine,
            store: TabularStore::new(),
            state: SessionState::Empty,
            display,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &TabularStore {
        &self.store
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn page_cap(&self) -> usize {
        self.page_cap
    }

    pub fn display_options_mut(&mut self) -> &mut DisplayOptions {
        &mut self.display
    }

    /// Fetch a fresh snapshot and make it the current table.
    ///
    /// On failure the previous table stays in the store but the session
    /// drops to [`SessionState::Empty`], so queries are refused until the
    /// next successful load.
    pub async fn load(&mut self, request: &LoadRequest) -> Result<&Snapshot> {
        let fetched = match self.prepare_fetch(request) {
            Ok(prepared) => prepared.run(request.kind).await,
            Err(e) => Err(e),
        };
        match fetched {
            Ok(snapshot) => {
                self.state = state_for(&snapshot);
                info!(
                    environment = %request.environment,
                    queue = %request.queue_name,
                    kind = ?request.kind,
                    window = %request.window,
                    rows = snapshot.num_rows(),
                    "Snapshot loaded"
                );
                Ok(self.store.replace(snapshot))
            }
            Err(e) => {
                self.state = SessionState::Empty;
                log_failure("load", &e);
                Err(e)
            }
        }
    }

    /// Resolve everything a fetch needs up front so the await holds no
    /// borrow of the session
    fn prepare_fetch(&self, request: &LoadRequest) -> Result<PreparedFetch> {
        let fetch = FetchRequest::new(request.queue_name.clone(), request.kind, request.window);
        fetch.validate()?;

        let credential = self.settings.connection(&request.environment).map_err(|_| {
            Error::validation(format!("Unknown environment '{}'.", request.environment))
        })?;
        let connector = self.connector_for(&request.environment, credential)?;
        Ok(PreparedFetch {
            fetcher: SnapshotFetcher::new(connector, self.page_cap),
            credential: credential.to_string(),
            request: fetch,
        })
    }

    fn connector_for(&self, environment: &str, credential: &str) -> Result<Arc<dyn BrokerConnector>> {
        match &self.connectors {
            ConnectorSource::Shared(connector) => Ok(connector.clone()),
            ConnectorSource::ByScheme => BrokerFactory::create_connector(credential).map_err(|e| {
                Error::validation(format!(
                    "Unsupported connection for environment '{}': {}",
                    environment, e
                ))
            }),
        }
    }

    /// Run SQL against the current table (as `azq`) and replace it with the
    /// result
    pub fn run_query(&mut self, sql: &str) -> Result<&Snapshot> {
        if sql.trim().is_empty() {
            return Err(Error::validation("Please enter a query."));
        }
        let current = match (self.state, self.store.current()) {
            (SessionState::Loaded, Some(current)) => current,
            _ => return Err(Error::validation("No data in queue.")),
        };

        let result = match self.engine.run(current, sql) {
            Ok(result) => result,
            Err(QueryError::EmptyStore) => return Err(Error::validation("No data in queue.")),
            Err(QueryError::EmptyQuery) => return Err(Error::validation("Please enter a query.")),
            Err(e) => {
                let err = Error::Query(e);
                log_failure("query", &err);
                return Err(err);
            }
        };

        self.state = state_for(&result);
        info!(rows = result.num_rows(), "Query result stored");
        Ok(self.store.replace(result))
    }

    /// Text grid of the current table, or None when there is nothing to show
    pub fn render(&self) -> Result<Option<String>> {
        match self.store.current() {
            Some(snapshot) if !snapshot.is_empty() => render(snapshot, &self.display)
                .map(Some)
                .map_err(Error::Snapshot),
            _ => Ok(None),
        }
    }

    /// Write the current table, whatever its state, to `path`
    pub fn export(&self, path: &Path, format: ExportFormat) -> Result<ExportSummary> {
        let snapshot = match self.store.current() {
            Some(snapshot) if !snapshot.is_empty() => snapshot,
            _ => return Err(Error::validation("No data to export.")),
        };
        export_snapshot(snapshot, path, format).map_err(|e| {
            let err = Error::Export(e);
            log_failure("export", &err);
            err
        })
    }
}

struct PreparedFetch {
    fetcher: SnapshotFetcher,
    credential: String,
    request: FetchRequest,
}

impl PreparedFetch {
    async fn run(self, kind: QueueKind) -> Result<Snapshot> {
        let messages = self.fetcher.fetch(&self.credential, &self.request).await?;
        normalize(messages, kind)
            .into_snapshot()
            .map_err(Error::Snapshot)
    }
}

fn state_for(snapshot: &Snapshot) -> SessionState {
    if snapshot.is_empty() {
        SessionState::Empty
    } else {
        SessionState::Loaded
    }
}

fn log_failure(operation: &str, err: &Error) {
    match std::error::Error::source(err) {
        Some(cause) => error!(operation, error = %err, cause = %cause, "Operation failed"),
        None => warn!(operation, error = %err, "Operation rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qpeek_middleware::InMemoryBroker;

    fn settings() -> Settings {
        Settings::parse("connections:\n  dev: memory://\n").unwrap()
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new(settings()).unwrap();
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.store().is_empty());
        assert_eq!(session.page_cap(), 300);
        assert!(session.render().unwrap().is_none());
    }

    #[test]
    fn test_query_before_load_rejected() {
        let mut session = Session::new(settings()).unwrap();
        let err = session.run_query("SELECT * FROM azq").unwrap_err();
        assert_eq!(err.user_message(), "No data in queue.");
        assert_eq!(session.engine().executions(), 0);
    }

    #[test]
    fn test_blank_query_rejected() {
        let mut session = Session::new(settings()).unwrap();
        assert!(matches!(session.run_query("  \n"), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_environment() {
        let broker = InMemoryBroker::new();
        let mut session = Session::with_connector(settings(), Arc::new(broker)).unwrap();
        let request = LoadRequest::new("prod", "orders", QueueKind::Active, PeekWindow::Unbounded);
        let err = session.load(&request).await.unwrap_err();
        assert_eq!(err.user_message(), "Unknown environment 'prod'.");
    }

    #[tokio::test]
    async fn test_scheme_routing_uses_fresh_memory_broker() {
        let mut session = Session::new(settings()).unwrap();
        let request = LoadRequest::new("dev", "orders", QueueKind::Active, PeekWindow::Unbounded);
        // memory:// yields an empty broker with no queues
        let err = session.load(&request).await.unwrap_err();
        assert!(matches!(err, Error::Connectivity(_)));
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn test_page_cap_clamped_from_settings() {
        let settings = Settings::parse("connections:\n  dev: memory://\npeek:\n  page_cap: 0\n").unwrap();
        let session = Session::new(settings).unwrap();
        assert_eq!(session.page_cap(), 1);
    }
}
