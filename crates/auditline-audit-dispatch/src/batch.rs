//! Consumer side of the in-process queue: batches queued records and
//! indexes them into a document store.

use crate::{DocumentStore, PublishedMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Configuration for the queue indexer.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Index every message is written to.
    pub index: String,
    /// Maximum messages per batch.
    pub max_batch_size: usize,
    /// Maximum time a message waits before its batch is flushed.
    pub max_batch_age: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index: "audit-logs".to_string(),
            max_batch_size: 100,
            max_batch_age: Duration::from_secs(1),
        }
    }
}

/// Collected batch of queued messages.
#[derive(Debug)]
pub struct MessageBatch {
    pub messages: Vec<PublishedMessage>,
    pub started_at: Instant,
}

impl MessageBatch {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Groups messages by size and age.
pub struct BatchCollector {
    max_batch_size: usize,
    max_batch_age: Duration,
    current: MessageBatch,
}

impl BatchCollector {
    pub fn new(max_batch_size: usize, max_batch_age: Duration) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            max_batch_age,
            current: MessageBatch::new(),
        }
    }

    /// Add a message; returns the batch when it is ready to flush.
    pub fn add(&mut self, message: PublishedMessage) -> Option<MessageBatch> {
        if self.current.is_empty() {
            self.current.started_at = Instant::now();
        }
        self.current.messages.push(message);

        if self.current.len() >= self.max_batch_size || self.is_due() {
            Some(self.take_batch())
        } else {
            None
        }
    }

    /// Whether pending messages have waited long enough.
    pub fn is_due(&self) -> bool {
        !self.current.is_empty() && self.current.started_at.elapsed() >= self.max_batch_age
    }

    /// Take the current batch and reset.
    pub fn take_batch(&mut self) -> MessageBatch {
        std::mem::replace(&mut self.current, MessageBatch::new())
    }

    pub fn has_pending(&self) -> bool {
        !self.current.is_empty()
    }
}

/// Totals reported when the indexer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerStats {
    pub indexed: u64,
    pub failed: u64,
    pub batches: u64,
}

async fn flush(
    batch: MessageBatch,
    store: &dyn DocumentStore,
    index: &str,
    stats: &mut IndexerStats,
) {
    debug!(size = batch.len(), index = %index, "flushing audit batch");
    stats.batches += 1;
    for message in batch.messages {
        match store.upsert(index, &message.key, &message.payload).await {
            Ok(()) => stats.indexed += 1,
            Err(e) => {
                stats.failed += 1;
                error!(
                    record_id = %message.key,
                    topic = %message.topic,
                    store = %store.name(),
                    error = %e,
                    "failed to index queued audit record"
                );
            }
        }
    }
}

/// Drain the queue into `store` until every publisher is dropped.
///
/// Remaining messages are flushed before returning.
pub async fn index_queue(
    mut receiver: mpsc::Receiver<PublishedMessage>,
    store: Arc<dyn DocumentStore>,
    config: IndexerConfig,
) -> IndexerStats {
    let mut collector = BatchCollector::new(config.max_batch_size, config.max_batch_age);
    let mut stats = IndexerStats::default();
    let tick = (config.max_batch_age / 2).max(Duration::from_millis(1));
    let mut interval = tokio::time::interval(tick);

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(message) => {
                    if let Some(batch) = collector.add(message) {
                        flush(batch, store.as_ref(), &config.index, &mut stats).await;
                    }
                }
                None => break,
            },
            _ = interval.tick() => {
                if collector.is_due() {
                    flush(collector.take_batch(), store.as_ref(), &config.index, &mut stats).await;
                }
            }
        }
    }

    if collector.has_pending() {
        flush(collector.take_batch(), store.as_ref(), &config.index, &mut stats).await;
    }

    info!(
        indexed = stats.indexed,
        failed = stats.failed,
        batches = stats.batches,
        "audit queue indexer stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrokerPublisher, ChannelPublisher, InMemoryDocumentStore, SinkError};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn message(key: &str) -> PublishedMessage {
        PublishedMessage {
            topic: "audit-logs".into(),
            key: key.into(),
            payload: json!({"id": key}),
            enqueued_at: std::time::Instant::now(),
        }
    }

    #[test]
    fn test_collector_flushes_on_size() {
        let mut collector = BatchCollector::new(2, Duration::from_secs(60));
        assert!(collector.add(message("a")).is_none());
        let batch = collector.add(message("b")).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(!collector.has_pending());
    }

    #[test]
    fn test_collector_zero_age_flushes_immediately() {
        let mut collector = BatchCollector::new(100, Duration::ZERO);
        assert_eq!(collector.add(message("a")).map(|b| b.len()), Some(1));
    }

    #[tokio::test]
    async fn test_indexer_drains_queue_on_close() {
        let (publisher, rx) = ChannelPublisher::new(16);
        let store = Arc::new(InMemoryDocumentStore::new());
        let config = IndexerConfig {
            max_batch_size: 2,
            ..IndexerConfig::default()
        };

        for key in ["a", "b", "c"] {
            publisher.publish("audit-logs", key, &json!({"id": key})).await.unwrap();
        }
        drop(publisher);

        let stats = index_queue(rx, store.clone(), config).await;
        assert_eq!(stats.indexed, 3);
        assert_eq!(stats.batches, 2);
        assert_eq!(store.count("audit-logs"), 3);
        assert_eq!(store.get("audit-logs", "b").unwrap()["id"], "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_indexer_flushes_on_age() {
        let (publisher, rx) = ChannelPublisher::new(16);
        let store = Arc::new(InMemoryDocumentStore::new());
        let handle = tokio::spawn(index_queue(
            rx,
            store.clone(),
            IndexerConfig {
                max_batch_size: 100,
                max_batch_age: Duration::from_millis(200),
                ..IndexerConfig::default()
            },
        ));

        publisher.publish("audit-logs", "a", &json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.count("audit-logs"), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.count("audit-logs"), 1);

        drop(publisher);
        assert_eq!(handle.await.unwrap().indexed, 1);
    }

    struct RejectingStore;

    #[async_trait]
    impl DocumentStore for RejectingStore {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn upsert(&self, _index: &str, _id: &str, _document: &Value) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("read-only index".into()))
        }
    }

    #[tokio::test]
    async fn test_indexer_counts_failures_and_keeps_going() {
        let (publisher, rx) = ChannelPublisher::new(4);
        publisher.publish("audit-logs", "a", &json!({})).await.unwrap();
        publisher.publish("audit-logs", "b", &json!({})).await.unwrap();
        drop(publisher);

        let stats = index_queue(rx, Arc::new(RejectingStore), IndexerConfig::default()).await;
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.indexed, 0);
    }
}
