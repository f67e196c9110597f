use std::borrow::Cow;
use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::BrokerError;

/// Application property carrying the dead-letter reason
pub const DEAD_LETTER_REASON: &[u8] = b"DeadLetterReason";
/// Application property carrying the dead-letter error description
pub const DEAD_LETTER_ERROR_DESCRIPTION: &[u8] = b"DeadLetterErrorDescription";

/// Message as returned by a peek, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMessage {
    pub sequence_number: Option<u64>,
    pub message_id: Option<String>,
    pub body: Bytes,
    pub enqueued_time_utc: Option<DateTime<Utc>>,
    pub application_properties: HashMap<Bytes, Bytes>,
}

impl RawMessage {
    pub fn new(sequence_number: u64, body: impl Into<Bytes>) -> Self {
        Self {
            sequence_number: Some(sequence_number),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_enqueued_time(mut self, enqueued: DateTime<Utc>) -> Self {
        self.enqueued_time_utc = Some(enqueued);
        self
    }

    pub fn with_property(mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }

    /// Byte-keyed property lookup
    pub fn property(&self, key: &[u8]) -> Option<&Bytes> {
        self.application_properties.get(key)
    }

    /// Body rendered as text (lossy for non-UTF-8 payloads)
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Receiver bound to one queue path. Peeks never lock or remove messages.
#[async_trait]
pub trait PeekReceiver: Send {
    /// Peek up to `max_count` messages in ascending sequence order, from the
    /// queue head when `from_sequence` is None, otherwise from that sequence.
    /// May return fewer than requested; an empty result means exhausted.
    async fn peek(
        &mut self,
        max_count: usize,
        from_sequence: Option<u64>,
    ) -> Result<Vec<RawMessage>, BrokerError>;

    /// Close the receiver
    async fn close(self: Box<Self>) -> Result<(), BrokerError>;
}

/// Connected broker client
#[async_trait]
pub trait PeekClient: Send + Sync {
    /// Open a receiver on a queue path (see `QueueKind::queue_path`)
    async fn receiver(&self, queue_path: &str) -> Result<Box<dyn PeekReceiver>, BrokerError>;

    /// Close the client and its connection
    async fn close(self: Box<Self>) -> Result<(), BrokerError>;
}

/// Opens broker clients from a pre-resolved connection string
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, credential: &str) -> Result<Box<dyn PeekClient>, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_message_builder() {
        let msg = RawMessage::new(42, "hello")
            .with_message_id("abc-1")
            .with_property(DEAD_LETTER_REASON, "MaxDeliveryCountExceeded");

        assert_eq!(msg.sequence_number, Some(42));
        assert_eq!(msg.message_id.as_deref(), Some("abc-1"));
        assert_eq!(msg.body_text(), "hello");
        assert_eq!(
            msg.property(DEAD_LETTER_REASON),
            Some(&Bytes::from("MaxDeliveryCountExceeded"))
        );
        assert!(msg.property(DEAD_LETTER_ERROR_DESCRIPTION).is_none());
    }

    #[test]
    fn test_body_text_lossy() {
        let msg = RawMessage::new(1, vec![0x66, 0x6f, 0xff]);
        assert_eq!(msg.body_text(), "fo\u{fffd}");
    }
}
