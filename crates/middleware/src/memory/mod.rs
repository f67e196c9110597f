//! In-memory implementations for testing
pub mod broker;

pub use broker::{BrokerStats, InMemoryBroker, PeekCall};
