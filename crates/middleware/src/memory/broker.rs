use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::BrokerError;
use crate::peek::{
    BrokerConnector, PeekClient, PeekReceiver, RawMessage, DEAD_LETTER_ERROR_DESCRIPTION,
    DEAD_LETTER_REASON,
};
use crate::queue::{parent_queue, QueueKind};

/// Lifecycle counters, shared by every client the broker hands out
#[derive(Debug, Default)]
pub struct BrokerStats {
    pub connects: AtomicUsize,
    pub client_closes: AtomicUsize,
    pub receivers_opened: AtomicUsize,
    pub receiver_closes: AtomicUsize,
    pub peek_calls: AtomicUsize,
}

/// One recorded peek request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeekCall {
    pub queue_path: String,
    pub max_count: usize,
    pub from_sequence: Option<u64>,
}

#[derive(Default)]
struct Inner {
    /// queue path -> messages in ascending sequence order
    queues: DashMap<String, Vec<RawMessage>>,
    stats: BrokerStats,
    calls: Mutex<Vec<PeekCall>>,
    /// 1-based peek call that fails; 0 disables
    fail_peek_at: AtomicUsize,
    /// Upper bound on messages per page; 0 disables
    max_page: AtomicUsize,
    reject_connections: AtomicBool,
}

/// Broker that keeps queues in process memory.
///
/// Cloning shares the same queues and counters, so a test can keep a handle
/// for inspection while the fetcher owns another.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue (and implicitly its dead-letter sub-queue)
    pub fn create_queue(&self, queue_name: &str) {
        self.inner.queues.entry(queue_name.to_string()).or_default();
    }

    /// Append a message, assigning the next sequence number for that path
    pub fn enqueue(&self, queue_path: &str, body: impl Into<Bytes>) -> u64 {
        let mut queue = self.inner.queues.entry(queue_path.to_string()).or_default();
        let seq = queue
            .last()
            .and_then(|m| m.sequence_number)
            .map_or(1, |last| last + 1);
        let msg = RawMessage::new(seq, body)
            .with_message_id(format!("msg-{}", seq))
            .with_enqueued_time(Utc::now());
        queue.push(msg);
        seq
    }

    /// Append a message to a queue's dead-letter sub-queue with diagnostics
    pub fn dead_letter(
        &self,
        queue_name: &str,
        body: impl Into<Bytes>,
        reason: &str,
        description: &str,
    ) -> u64 {
        self.create_queue(queue_name);
        let path = QueueKind::DeadLetter.queue_path(queue_name);
        let seq = self.enqueue(&path, body);
        if let Some(mut queue) = self.inner.queues.get_mut(&path) {
            if let Some(last) = queue.last_mut() {
                last.application_properties
                    .insert(Bytes::from_static(DEAD_LETTER_REASON), Bytes::from(reason.to_string()));
                last.application_properties.insert(
                    Bytes::from_static(DEAD_LETTER_ERROR_DESCRIPTION),
                    Bytes::from(description.to_string()),
                );
            }
        }
        seq
    }

    /// Insert a prepared message, keeping the queue sorted by sequence number
    pub fn insert(&self, queue_path: &str, msg: RawMessage) {
        let mut queue = self.inner.queues.entry(queue_path.to_string()).or_default();
        queue.push(msg);
        queue.sort_by_key(|m| m.sequence_number.unwrap_or(0));
    }

    /// Make the n-th peek call (1-based, counted across all receivers) fail
    pub fn fail_peek_on_call(&self, call: usize) {
        self.inner.fail_peek_at.store(call, Ordering::SeqCst);
    }

    /// Return at most `limit` messages per peek regardless of the request
    pub fn limit_page_size(&self, limit: usize) {
        self.inner.max_page.store(limit, Ordering::SeqCst);
    }

    /// Refuse new connections as if the credential were invalid
    pub fn reject_connections(&self, reject: bool) {
        self.inner.reject_connections.store(reject, Ordering::SeqCst);
    }

    pub fn stats(&self) -> &BrokerStats {
        &self.inner.stats
    }

    /// Every peek request received so far, in order
    pub fn peek_calls(&self) -> Vec<PeekCall> {
        self.inner
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn queue_exists(&self, queue_path: &str) -> bool {
        self.inner.queues.contains_key(queue_path)
            || parent_queue(queue_path).is_some_and(|parent| self.inner.queues.contains_key(parent))
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(&self, _credential: &str) -> Result<Box<dyn PeekClient>, BrokerError> {
        if self.inner.reject_connections.load(Ordering::SeqCst) {
            return Err(BrokerError::Unauthorized("connection rejected".to_string()));
        }
        self.inner.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryPeekClient {
            broker: self.clone(),
        }))
    }
}

struct InMemoryPeekClient {
    broker: InMemoryBroker,
}

#[async_trait]
impl PeekClient for InMemoryPeekClient {
    async fn receiver(&self, queue_path: &str) -> Result<Box<dyn PeekReceiver>, BrokerError> {
        if !self.broker.queue_exists(queue_path) {
            return Err(BrokerError::QueueNotFound(queue_path.to_string()));
        }
        self.broker
            .inner
            .stats
            .receivers_opened
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryPeekReceiver {
            broker: self.broker.clone(),
            queue_path: queue_path.to_string(),
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), BrokerError> {
        self.broker
            .inner
            .stats
            .client_closes
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct InMemoryPeekReceiver {
    broker: InMemoryBroker,
    queue_path: String,
}

#[async_trait]
impl PeekReceiver for InMemoryPeekReceiver {
    async fn peek(
        &mut self,
        max_count: usize,
        from_sequence: Option<u64>,
    ) -> Result<Vec<RawMessage>, BrokerError> {
        let inner = &self.broker.inner;
        let call = inner.stats.peek_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut calls) = inner.calls.lock() {
            calls.push(PeekCall {
                queue_path: self.queue_path.clone(),
                max_count,
                from_sequence,
            });
        }

        if inner.fail_peek_at.load(Ordering::SeqCst) == call {
            return Err(BrokerError::PeekFailed(format!(
                "injected fault on peek call {}",
                call
            )));
        }

        let limit = match inner.max_page.load(Ordering::SeqCst) {
            0 => max_count,
            cap => max_count.min(cap),
        };
        let start = from_sequence.unwrap_or(0);

        Ok(inner
            .queues
            .get(&self.queue_path)
            .map(|queue| {
                queue
                    .iter()
                    .filter(|m| m.sequence_number.unwrap_or(0) >= start)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<(), BrokerError> {
        self.broker
            .inner
            .stats
            .receiver_closes
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(broker: &InMemoryBroker, path: &str) -> Box<dyn PeekReceiver> {
        let client = broker.connect("memory://").await.unwrap();
        client.receiver(path).await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_assigns_sequence_numbers() {
        let broker = InMemoryBroker::new();
        assert_eq!(broker.enqueue("orders", "a"), 1);
        assert_eq!(broker.enqueue("orders", "b"), 2);
        assert_eq!(broker.enqueue("invoices", "c"), 1);
    }

    #[tokio::test]
    async fn test_peek_from_head_and_resume() {
        let broker = InMemoryBroker::new();
        for i in 0..5 {
            broker.enqueue("orders", format!("m{}", i));
        }
        let mut receiver = open(&broker, "orders").await;

        let first = receiver.peek(2, None).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].sequence_number, Some(2));

        let rest = receiver.peek(10, Some(3)).await.unwrap();
        let seqs: Vec<u64> = rest.iter().filter_map(|m| m.sequence_number).collect();
        assert_eq!(seqs, vec![3, 4, 5]);

        assert!(receiver.peek(10, Some(6)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_peek_is_non_destructive() {
        let broker = InMemoryBroker::new();
        broker.enqueue("orders", "a");
        let mut receiver = open(&broker, "orders").await;
        assert_eq!(receiver.peek(10, None).await.unwrap().len(), 1);
        assert_eq!(receiver.peek(10, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dead_letter_sub_queue() {
        let broker = InMemoryBroker::new();
        broker.enqueue("orders", "ok");
        broker.dead_letter("orders", "bad", "MaxDeliveryCountExceeded", "gave up");

        let mut receiver = open(&broker, "orders/$DeadLetterQueue").await;
        let msgs = receiver.peek(10, None).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(
            msgs[0].property(DEAD_LETTER_REASON),
            Some(&Bytes::from("MaxDeliveryCountExceeded"))
        );
    }

    #[tokio::test]
    async fn test_unknown_queue() {
        let broker = InMemoryBroker::new();
        let client = broker.connect("memory://").await.unwrap();
        let result = client.receiver("missing").await;
        assert!(matches!(result, Err(BrokerError::QueueNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_dead_letter_of_existing_queue() {
        let broker = InMemoryBroker::new();
        broker.create_queue("orders");
        let mut receiver = open(&broker, "orders/$DeadLetterQueue").await;
        assert!(receiver.peek(10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_fault_and_page_limit() {
        let broker = InMemoryBroker::new();
        for i in 0..10 {
            broker.enqueue("orders", format!("m{}", i));
        }
        broker.limit_page_size(3);
        broker.fail_peek_on_call(2);
        let mut receiver = open(&broker, "orders").await;

        assert_eq!(receiver.peek(300, None).await.unwrap().len(), 3);
        assert!(matches!(
            receiver.peek(300, Some(4)).await,
            Err(BrokerError::PeekFailed(_))
        ));
        assert_eq!(broker.stats().peek_calls.load(Ordering::SeqCst), 2);
        assert_eq!(broker.peek_calls()[1].from_sequence, Some(4));
    }

    #[tokio::test]
    async fn test_rejected_connection() {
        let broker = InMemoryBroker::new();
        broker.reject_connections(true);
        assert!(matches!(
            broker.connect("memory://").await,
            Err(BrokerError::Unauthorized(_))
        ));
        assert_eq!(broker.stats().connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_counters() {
        let broker = InMemoryBroker::new();
        broker.create_queue("orders");
        let client = broker.connect("memory://").await.unwrap();
        let receiver = client.receiver("orders").await.unwrap();
        receiver.close().await.unwrap();
        client.close().await.unwrap();

        let stats = broker.stats();
        assert_eq!(stats.connects.load(Ordering::SeqCst), 1);
        assert_eq!(stats.receivers_opened.load(Ordering::SeqCst), 1);
        assert_eq!(stats.receiver_closes.load(Ordering::SeqCst), 1);
        assert_eq!(stats.client_closes.load(Ordering::SeqCst), 1);
    }
}
