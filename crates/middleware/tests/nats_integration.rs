//! Integration tests for the JetStream peek backend
//!
//! Run with: cargo test -p qpeek-middleware --test nats_integration -- --ignored
//! Requires: docker run -p 4222:4222 nats:latest -js

use async_nats::jetstream::{self, stream};
use async_nats::HeaderMap;
use bytes::Bytes;
use qpeek_middleware::{
    BrokerConnector, NatsConnector, QueueKind, DEAD_LETTER_ERROR_DESCRIPTION, DEAD_LETTER_REASON,
};

const URL: &str = "nats://localhost:4222";

async fn seed_stream(name: &str, subject: &str, bodies: &[&str], dead_letter: bool) {
    let client = async_nats::connect(URL).await.expect("Failed to connect to NATS");
    let js = jetstream::new(client);
    let _ = js.delete_stream(name).await;
    js.create_stream(stream::Config {
        name: name.to_string(),
        subjects: vec![subject.to_string()],
        ..Default::default()
    })
    .await
    .expect("Failed to create stream");

    for (i, body) in bodies.iter().enumerate() {
        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", format!("msg-{}", i + 1).as_str());
        if dead_letter {
            headers.insert("DeadLetterReason", "MaxDeliveryCountExceeded");
            headers.insert("DeadLetterErrorDescription", "Delivered 10 times");
        }
        js.publish_with_headers(subject.to_string(), headers, Bytes::from(body.to_string()))
            .await
            .expect("Failed to publish")
            .await
            .expect("Publish not acknowledged");
    }
}

#[tokio::test]
#[ignore]
async fn test_peek_pages_through_stream() {
    seed_stream("QPEEK_IT", "qpeek.it", &["a", "b", "c", "d", "e"], false).await;

    let client = NatsConnector::default().connect(URL).await.unwrap();
    let mut receiver = client.receiver("QPEEK_IT").await.unwrap();

    let first = receiver.peek(2, None).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].sequence_number, Some(1));
    assert_eq!(first[0].message_id.as_deref(), Some("msg-1"));
    assert!(first[0].enqueued_time_utc.is_some());

    let rest = receiver.peek(10, Some(3)).await.unwrap();
    let seqs: Vec<u64> = rest.iter().filter_map(|m| m.sequence_number).collect();
    assert_eq!(seqs, vec![3, 4, 5]);

    // Peeking is non-destructive
    let again = receiver.peek(10, None).await.unwrap();
    assert_eq!(again.len(), 5);

    let drained = receiver.peek(10, Some(6)).await.unwrap();
    assert!(drained.is_empty());

    receiver.close().await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_dead_letter_stream_carries_properties() {
    seed_stream("QPEEK_IT_DLQ", "qpeek.it.dlq", &["poison"], true).await;

    let client = NatsConnector::default().connect(URL).await.unwrap();
    let path = QueueKind::DeadLetter.queue_path("QPEEK_IT");
    let mut receiver = client.receiver(&path).await.unwrap();

    let messages = receiver.peek(10, None).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].property(DEAD_LETTER_REASON).map(|v| v.as_ref()),
        Some(&b"MaxDeliveryCountExceeded"[..])
    );
    assert_eq!(
        messages[0].property(DEAD_LETTER_ERROR_DESCRIPTION).map(|v| v.as_ref()),
        Some(&b"Delivered 10 times"[..])
    );

    receiver.close().await.unwrap();
    client.close().await.unwrap();
}

async fn consumer_count(name: &str) -> usize {
    let client = async_nats::connect(URL).await.expect("Failed to connect to NATS");
    let mut stream = jetstream::new(client)
        .get_stream(name)
        .await
        .expect("Stream missing");
    stream.info().await.expect("Failed to read stream info").state.consumer_count
}

#[tokio::test]
#[ignore]
async fn test_peek_leaves_no_consumers_behind() {
    seed_stream("QPEEK_IT_CLEANUP", "qpeek.it.cleanup", &["a", "b", "c"], false).await;

    let client = NatsConnector::default().connect(URL).await.unwrap();
    let mut receiver = client.receiver("QPEEK_IT_CLEANUP").await.unwrap();

    assert_eq!(receiver.peek(2, None).await.unwrap().len(), 2);
    assert_eq!(consumer_count("QPEEK_IT_CLEANUP").await, 0);

    // Past the end: the fetch expires empty and the consumer still goes
    assert!(receiver.peek(2, Some(4)).await.unwrap().is_empty());
    assert_eq!(consumer_count("QPEEK_IT_CLEANUP").await, 0);

    receiver.close().await.unwrap();
    client.close().await.unwrap();
}
