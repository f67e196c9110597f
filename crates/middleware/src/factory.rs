use std::sync::Arc;

use crate::memory::InMemoryBroker;
use crate::nats::NatsConnector;
use crate::peek::BrokerConnector;

/// Error creating a broker connector
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("unsupported connection scheme: {0}")]
    UnsupportedScheme(String),
    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Picks a broker backend from a connection string's scheme
pub struct BrokerFactory;

impl BrokerFactory {
    /// `memory://` yields an empty in-memory broker, `nats://` and `tls://`
    /// a JetStream connector.
    pub fn create_connector(connection: &str) -> Result<Arc<dyn BrokerConnector>, FactoryError> {
        let (scheme, _) = connection.split_once("://").ok_or_else(|| {
            FactoryError::ConfigError(format!("connection string has no scheme: {}", connection))
        })?;

        match scheme.to_ascii_lowercase().as_str() {
            "memory" => Ok(Arc::new(InMemoryBroker::new())),
            "nats" | "tls" => Ok(Arc::new(NatsConnector::default())),
            other => Err(FactoryError::UnsupportedScheme(other.to_string())),
        }
    }
}
