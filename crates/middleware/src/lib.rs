//! qpeek-middleware: Pluggable broker access
//!
//! Provides the trait-based peek abstraction used by the snapshot fetcher,
//! with an in-memory broker for testing and a NATS JetStream backend.

pub mod error;
pub mod factory;
pub mod memory;
pub mod nats;
pub mod peek;
pub mod queue;

pub use error::BrokerError;
pub use factory::{BrokerFactory, FactoryError};
pub use memory::{BrokerStats, InMemoryBroker, PeekCall};
pub use nats::NatsConnector;
pub use peek::{
    BrokerConnector, PeekClient, PeekReceiver, RawMessage, DEAD_LETTER_ERROR_DESCRIPTION,
    DEAD_LETTER_REASON,
};
pub use queue::{QueueKind, DEAD_LETTER_SEGMENT};
