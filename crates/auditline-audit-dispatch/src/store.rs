//! Direct document-store sink.

use crate::{Sink, SinkError};
use async_trait::async_trait;
use auditline_audit_types::AuditRecord;
use auditline_common_config::SinkKind;
use auditline_common_http::{endpoint_url, HttpClient};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A document store keyed by `(index, id)`.
///
/// `upsert` must be idempotent: writing the same id twice leaves one
/// document holding the latest body.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store name for logs.
    fn name(&self) -> &str;

    /// Insert or replace the document at `index/id`.
    async fn upsert(&self, index: &str, id: &str, document: &Value) -> Result<(), SinkError>;
}

/// In-process store, handy for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    indices: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    writes: AtomicU64,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch one document.
    pub fn get(&self, index: &str, id: &str) -> Option<Value> {
        self.indices.read().get(index).and_then(|docs| docs.get(id)).cloned()
    }

    /// Number of distinct documents in an index.
    pub fn count(&self, index: &str) -> usize {
        self.indices.read().get(index).map_or(0, BTreeMap::len)
    }

    /// All documents in an index, ordered by id.
    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.indices
            .read()
            .get(index)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total upserts received, including overwrites.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn upsert(&self, index: &str, id: &str, document: &Value) -> Result<(), SinkError> {
        self.indices
            .write()
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Elasticsearch-compatible store: `PUT {endpoint}/{index}/_doc/{id}`.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: HttpClient,
    endpoint: String,
}

impl HttpDocumentStore {
    /// Create a store for `endpoint`, which must be an absolute http(s) URL.
    pub fn new(client: HttpClient, endpoint: impl Into<String>) -> Result<Self, SinkError> {
        let endpoint = endpoint.into();
        endpoint_url(&endpoint, &[]).map_err(|source| SinkError::Endpoint {
            endpoint: endpoint.clone(),
            source,
        })?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn upsert(&self, index: &str, id: &str, document: &Value) -> Result<(), SinkError> {
        let url = endpoint_url(&self.endpoint, &[index, "_doc", id]).map_err(|source| {
            SinkError::Endpoint {
                endpoint: self.endpoint.clone(),
                source,
            }
        })?;
        self.client.put_json(url, document).await?;
        debug!(index = %index, id = %id, "document upserted");
        Ok(())
    }
}

/// Writes each record to a document store under its own id.
pub struct DocumentStoreSink {
    store: Arc<dyn DocumentStore>,
    index: String,
    name: String,
}

impl DocumentStoreSink {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>) -> Self {
        let index = index.into();
        let name = format!("{}:{}", store.name(), index);
        Self { store, index, name }
    }

    pub fn index(&self) -> &str {
        &self.index
    }
}

#[async_trait]
impl Sink for DocumentStoreSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Direct
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), SinkError> {
        let document = record.to_document()?;
        self.store
            .upsert(&self.index, &record.id().to_string(), &document)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditline_audit_types::AuditAction;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> AuditRecord {
        AuditRecord::builder("Account", AuditAction::Update)
            .entity_id(Some("42".into()))
            .changed_by(Some("alice".into()))
            .build()
    }

    #[tokio::test]
    async fn test_same_record_twice_yields_one_document() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let sink = DocumentStoreSink::new(store.clone(), "audit-logs");
        let record = record();

        sink.write(&record).await.unwrap();
        sink.write(&record).await.unwrap();

        assert_eq!(store.count("audit-logs"), 1);
        assert_eq!(store.write_count(), 2);
        let doc = store.get("audit-logs", &record.id().to_string()).unwrap();
        assert_eq!(doc["entityId"], "42");
        assert_eq!(doc["action"], "UPDATE");
    }

    #[tokio::test]
    async fn test_indices_are_separate() {
        let store = Arc::new(InMemoryDocumentStore::new());
        DocumentStoreSink::new(store.clone(), "a").write(&record()).await.unwrap();
        DocumentStoreSink::new(store.clone(), "b").write(&record()).await.unwrap();
        assert_eq!(store.count("a"), 1);
        assert_eq!(store.count("b"), 1);
        assert_eq!(store.count("c"), 0);
        assert!(store.documents("c").is_empty());
    }

    #[test]
    fn test_sink_name_and_kind() {
        let sink = DocumentStoreSink::new(Arc::new(InMemoryDocumentStore::new()), "kyc-audit");
        assert_eq!(sink.name(), "in-memory:kyc-audit");
        assert_eq!(sink.kind(), SinkKind::Direct);
        assert_eq!(sink.index(), "kyc-audit");
    }

    #[test]
    fn test_http_store_rejects_bad_endpoint() {
        let client = HttpClient::new().unwrap();
        let err = HttpDocumentStore::new(client, "not a url").unwrap_err();
        assert!(matches!(err, SinkError::Endpoint { .. }));
    }

    #[tokio::test]
    async fn test_http_store_puts_document_by_id() {
        let server = MockServer::start().await;
        let record = record();
        let doc = record.to_document().unwrap();

        Mock::given(method("PUT"))
            .and(path(format!("/audit-logs/_doc/{}", record.id())))
            .and(body_json(&doc))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"result": "created"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpDocumentStore::new(HttpClient::new().unwrap(), server.uri()).unwrap();
        let sink = DocumentStoreSink::new(Arc::new(store), "audit-logs");
        sink.write(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_store_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = HttpDocumentStore::new(HttpClient::new().unwrap(), server.uri()).unwrap();
        let err = store
            .upsert("audit-logs", "1", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, SinkError::Http(_)));
    }
}
