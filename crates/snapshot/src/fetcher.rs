//! Paginated peek over a queue or its dead-letter sub-queue
//!
//! One fetch holds one client connection and one receiver. Both are closed
//! on every exit path, and close failures are logged rather than masking
//! the fetch outcome.

use std::sync::Arc;

use qpeek_middleware::{BrokerConnector, BrokerError, PeekClient, PeekReceiver, QueueKind, RawMessage};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::window::PeekWindow;
use crate::Result;

/// What to fetch: a queue, which side of it, and which sequence range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub queue_name: String,
    pub kind: QueueKind,
    pub window: PeekWindow,
}

impl FetchRequest {
    pub fn new(queue_name: impl Into<String>, kind: QueueKind, window: PeekWindow) -> Self {
        Self {
            queue_name: queue_name.into(),
            kind,
            window,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_name.trim().is_empty() {
            return Err(Error::validation("Please enter a queue name."));
        }
        self.window.validate()
    }

    pub fn queue_path(&self) -> String {
        self.kind.queue_path(self.queue_name.trim())
    }
}

pub struct SnapshotFetcher {
    connector: Arc<dyn BrokerConnector>,
    page_cap: usize,
}

impl SnapshotFetcher {
    pub fn new(connector: Arc<dyn BrokerConnector>, page_cap: usize) -> Self {
        Self {
            connector,
            page_cap: page_cap.max(1),
        }
    }

    pub fn page_cap(&self) -> usize {
        self.page_cap
    }

    /// Peek every message in the request's window, in sequence order.
    ///
    /// Messages are never consumed or locked. Any failure discards the
    /// partial result.
    pub async fn fetch(&self, credential: &str, request: &FetchRequest) -> Result<Vec<RawMessage>> {
        request.validate()?;
        let queue_path = request.queue_path();

        let client = self
            .connector
            .connect(credential)
            .await
            .map_err(Error::Connectivity)?;

        let result = self
            .fetch_with_client(client.as_ref(), &queue_path, request.window)
            .await;

        if let Err(e) = client.close().await {
            warn!(queue = %queue_path, error = %e, "Failed to close broker client");
        }

        let messages = result?;
        info!(
            queue = %queue_path,
            window = %request.window,
            count = messages.len(),
            "Fetched snapshot"
        );
        Ok(messages)
    }

    async fn fetch_with_client(
        &self,
        client: &dyn PeekClient,
        queue_path: &str,
        window: PeekWindow,
    ) -> Result<Vec<RawMessage>> {
        let mut receiver = client
            .receiver(queue_path)
            .await
            .map_err(Error::Connectivity)?;

        let result = paginate(receiver.as_mut(), window, self.page_cap, queue_path).await;

        if let Err(e) = receiver.close().await {
            warn!(queue = %queue_path, error = %e, "Failed to close peek receiver");
        }
        result
    }
}

/// Drive peek calls until the window is exhausted or the broker returns an
/// empty page. Short pages do not end pagination; only an empty one does.
async fn paginate(
    receiver: &mut dyn PeekReceiver,
    window: PeekWindow,
    page_cap: usize,
    queue_path: &str,
) -> Result<Vec<RawMessage>> {
    let mut messages = Vec::new();
    let mut last_seq: Option<u64> = None;
    let mut pages = 0usize;

    while let Some(page_size) = window.next_page_size(last_seq, page_cap) {
        let from = match last_seq {
            Some(last) => match last.checked_add(1) {
                Some(next) => Some(next),
                // Nothing can follow the largest sequence number
                None => break,
            },
            None => window.start(),
        };

        let page = receiver
            .peek(page_size, from)
            .await
            .map_err(Error::Connectivity)?;
        pages += 1;

        let Some(last) = page.last() else {
            debug!(queue = %queue_path, page = pages, "Empty page, queue drained");
            break;
        };
        let seq = last.sequence_number.ok_or_else(|| {
            Error::Connectivity(BrokerError::Protocol(
                "peeked message has no sequence number".to_string(),
            ))
        })?;
        // Cursor must advance or the loop would never end
        if last_seq.is_some_and(|prev| seq <= prev) {
            return Err(Error::Connectivity(BrokerError::Protocol(format!(
                "sequence number went backwards: {} after {}",
                seq,
                last_seq.unwrap_or_default()
            ))));
        }

        debug!(
            queue = %queue_path,
            page = pages,
            requested = page_size,
            returned = page.len(),
            last_seq = seq,
            "Peeked page"
        );
        messages.extend(page);
        last_seq = Some(seq);

        if window.is_exhausted_by(seq) {
            break;
        }
    }

    // A final page may overshoot the upper bound
    messages.retain(|m| m.sequence_number.map_or(true, |s| window.contains(s)));
    Ok(messages)
}
