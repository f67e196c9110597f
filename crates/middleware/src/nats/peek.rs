use std::time::Duration;

use async_nats::jetstream::consumer::{pull, AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::stream::Stream;
use async_nats::jetstream::{self, Context};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::error::BrokerError;
use crate::nats::streams::stream_name_for_path;
use crate::peek::{BrokerConnector, PeekClient, PeekReceiver, RawMessage};

/// Header carrying the publisher-assigned message id
const MSG_ID_HEADER: &str = "Nats-Msg-Id";
/// Headers copied into application properties
const PROPERTY_HEADERS: [&str; 2] = ["DeadLetterReason", "DeadLetterErrorDescription"];

const DEFAULT_FETCH_EXPIRY: Duration = Duration::from_secs(5);
const CONSUMER_INACTIVE_THRESHOLD: Duration = Duration::from_secs(30);

/// JetStream-backed connector: each queue path is a stream, each peek an
/// ephemeral no-ack consumer starting at the requested sequence.
pub struct NatsConnector {
    fetch_expiry: Duration,
}

impl NatsConnector {
    pub fn new(fetch_expiry: Duration) -> Self {
        Self { fetch_expiry }
    }
}

impl Default for NatsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_EXPIRY)
    }
}

#[async_trait]
impl BrokerConnector for NatsConnector {
    async fn connect(&self, credential: &str) -> Result<Box<dyn PeekClient>, BrokerError> {
        let client = async_nats::connect(credential).await.map_err(|e| {
            match e.kind() {
                async_nats::ConnectErrorKind::AuthorizationViolation => {
                    BrokerError::Unauthorized(e.to_string())
                }
                _ => BrokerError::ConnectionFailed(e.to_string()),
            }
        })?;
        info!("Connected to NATS");
        let jetstream = jetstream::new(client.clone());
        Ok(Box::new(NatsPeekClient {
            client,
            jetstream,
            fetch_expiry: self.fetch_expiry,
        }))
    }
}

struct NatsPeekClient {
    client: Client,
    jetstream: Context,
    fetch_expiry: Duration,
}

#[async_trait]
impl PeekClient for NatsPeekClient {
    async fn receiver(&self, queue_path: &str) -> Result<Box<dyn PeekReceiver>, BrokerError> {
        let stream_name = stream_name_for_path(queue_path);
        let stream = self
            .jetstream
            .get_stream(&stream_name)
            .await
            .map_err(|e| BrokerError::QueueNotFound(format!("{}: {}", stream_name, e)))?;
        debug!(queue = %queue_path, stream = %stream_name, "Opened peek receiver");
        Ok(Box::new(NatsPeekReceiver {
            stream,
            stream_name,
            fetch_expiry: self.fetch_expiry,
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), BrokerError> {
        // Drain flushes pending publishes and unsubscribes before closing
        self.client
            .drain()
            .await
            .map_err(|e| BrokerError::CloseFailed(e.to_string()))
    }
}

struct NatsPeekReceiver {
    stream: Stream,
    stream_name: String,
    fetch_expiry: Duration,
}

#[async_trait]
impl PeekReceiver for NatsPeekReceiver {
    async fn peek(
        &mut self,
        max_count: usize,
        from_sequence: Option<u64>,
    ) -> Result<Vec<RawMessage>, BrokerError> {
        let deliver_policy = match from_sequence {
            Some(start_sequence) => DeliverPolicy::ByStartSequence { start_sequence },
            None => DeliverPolicy::All,
        };

        let consumer = self
            .stream
            .create_consumer(pull::Config {
                deliver_policy,
                ack_policy: AckPolicy::None,
                inactive_threshold: CONSUMER_INACTIVE_THRESHOLD,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::PeekFailed(e.to_string()))?;

        let page = collect_page(&consumer, max_count, self.fetch_expiry).await;

        // Runs whether or not the fetch succeeded; ephemeral consumers also
        // expire on their own
        let consumer_name = consumer.cached_info().name.clone();
        if let Err(e) = self.stream.delete_consumer(&consumer_name).await {
            warn!(stream = %self.stream_name, consumer = %consumer_name, error = %e, "Failed to delete peek consumer");
        }

        let result = page?;
        debug!(
            stream = %self.stream_name,
            requested = max_count,
            returned = result.len(),
            from = ?from_sequence,
            "Peeked messages"
        );
        Ok(result)
    }

    async fn close(self: Box<Self>) -> Result<(), BrokerError> {
        Ok(())
    }
}

async fn collect_page(
    consumer: &PullConsumer,
    max_count: usize,
    expiry: Duration,
) -> Result<Vec<RawMessage>, BrokerError> {
    let messages = consumer
        .fetch()
        .max_messages(max_count)
        .expires(expiry)
        .messages()
        .await
        .map_err(|e| BrokerError::PeekFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(max_count);
    tokio::pin!(messages);
    while let Some(msg_result) = messages.next().await {
        let msg = msg_result.map_err(|e| BrokerError::PeekFailed(e.to_string()))?;
        result.push(to_raw_message(&msg)?);
    }
    Ok(result)
}

fn to_raw_message(msg: &jetstream::Message) -> Result<RawMessage, BrokerError> {
    let info = msg
        .info()
        .map_err(|e| BrokerError::Protocol(format!("missing JetStream metadata: {}", e)))?;
    let published_nanos = info.published.unix_timestamp_nanos() as i64;

    let headers = msg.headers.as_ref();
    let header = |name: &str| {
        headers
            .and_then(|h| h.get(name))
            .map(|v| v.as_str().to_string())
    };

    let mut raw = RawMessage {
        sequence_number: Some(info.stream_sequence),
        message_id: header(MSG_ID_HEADER),
        body: msg.payload.clone(),
        enqueued_time_utc: Some(DateTime::from_timestamp_nanos(published_nanos)),
        ..Default::default()
    };
    for key in PROPERTY_HEADERS {
        if let Some(value) = header(key) {
            raw.application_properties
                .insert(Bytes::from_static(key.as_bytes()), Bytes::from(value));
        }
    }
    Ok(raw)
}
