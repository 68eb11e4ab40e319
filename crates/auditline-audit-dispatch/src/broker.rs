//! Broker sink: publish records onto a topic keyed by record id.

use crate::{Sink, SinkError};
use async_trait::async_trait;
use auditline_audit_types::AuditRecord;
use auditline_common_config::SinkKind;
use auditline_common_http::{endpoint_url, headers, HttpClient};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Publishes keyed JSON payloads to a topic.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publisher name for logs.
    fn name(&self) -> &str;

    /// Publish one message. Returns once the broker (or queue) accepted it.
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), SinkError>;
}

/// A message accepted by the in-process queue.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Value,
    pub enqueued_at: Instant,
}

/// Bounded in-process queue. Publishing never waits: a full queue is an
/// error the dispatcher logs.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<PublishedMessage>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end for a consumer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishedMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Whether a consumer is still attached.
    pub fn is_healthy(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Approximate fraction of the queue in use.
    pub fn buffer_usage(&self) -> f64 {
        let capacity = self.sender.capacity();
        let max_capacity = self.sender.max_capacity();
        1.0 - (capacity as f64 / max_capacity as f64)
    }
}

#[async_trait]
impl BrokerPublisher for ChannelPublisher {
    fn name(&self) -> &str {
        "in-process"
    }

    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), SinkError> {
        let message = PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.clone(),
            enqueued_at: Instant::now(),
        };

        match self.sender.try_send(message) {
            Ok(()) => {
                debug!(topic = %topic, key = %key, "audit record enqueued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(SinkError::QueueFull {
                capacity: self.sender.max_capacity(),
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::QueueClosed),
        }
    }
}

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: [ProduceRecord<'a>; 1],
}

#[derive(Serialize)]
struct ProduceRecord<'a> {
    key: &'a str,
    value: &'a Value,
}

#[derive(Debug, Default, Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<ProduceOffset>,
}

#[derive(Debug, Deserialize)]
struct ProduceOffset {
    error_code: Option<i32>,
    error: Option<String>,
}

/// Kafka REST proxy (v2) publisher: `POST {endpoint}/topics/{topic}`.
#[derive(Debug, Clone)]
pub struct HttpBrokerPublisher {
    client: HttpClient,
    endpoint: String,
}

impl HttpBrokerPublisher {
    pub fn new(client: HttpClient, endpoint: impl Into<String>) -> Result<Self, SinkError> {
        let endpoint = endpoint.into();
        endpoint_url(&endpoint, &[]).map_err(|source| SinkError::Endpoint {
            endpoint: endpoint.clone(),
            source,
        })?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl BrokerPublisher for HttpBrokerPublisher {
    fn name(&self) -> &str {
        "kafka-rest"
    }

    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), SinkError> {
        let url = endpoint_url(&self.endpoint, &["topics", topic]).map_err(|source| {
            SinkError::Endpoint {
                endpoint: self.endpoint.clone(),
                source,
            }
        })?;
        let body = ProduceRequest {
            records: [ProduceRecord { key, value: payload }],
        };

        let response = self
            .client
            .post_json(url, headers::CONTENT_TYPE_KAFKA_JSON_V2, &body)
            .await?;

        // A 200 can still carry a per-record failure.
        match response.json::<ProduceResponse>().await {
            Ok(produced) => {
                if let Some(failed) = produced.offsets.into_iter().find(|o| o.error_code.is_some()) {
                    return Err(SinkError::Rejected {
                        code: failed.error_code.unwrap_or_default(),
                        message: failed.error.unwrap_or_default(),
                    });
                }
            }
            Err(e) => warn!(topic = %topic, error = %e, "unreadable produce response, assuming accepted"),
        }

        debug!(topic = %topic, key = %key, "audit record published");
        Ok(())
    }
}

/// Publishes each record as JSON, keyed by record id.
pub struct BrokerSink {
    publisher: Arc<dyn BrokerPublisher>,
    topic: String,
    name: String,
}

impl BrokerSink {
    pub fn new(publisher: Arc<dyn BrokerPublisher>, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        let name = format!("{}:{}", publisher.name(), topic);
        Self {
            publisher,
            topic,
            name,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl Sink for BrokerSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Queued
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), SinkError> {
        let payload = record.to_document()?;
        self.publisher
            .publish(&self.topic, &record.id().to_string(), &payload)
            .await
    }
}
