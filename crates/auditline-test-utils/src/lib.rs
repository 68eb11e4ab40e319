//! Test utilities for Auditline crates.

use async_trait::async_trait;
use auditline_audit_dispatch::{DocumentStore, InMemoryDocumentStore, Sink, SinkError, SinkKind};
use auditline_audit_types::{AuditAction, AuditRecord};
use parking_lot::Mutex;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Config directory removed on drop.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("create temp config dir")
}

/// Write `yaml` as `audit.yaml` inside `dir`.
pub fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("audit.yaml");
    std::fs::write(&path, yaml).expect("write audit.yaml");
    path
}

/// The canonical record: alice updating Account 42 from 10.0.0.5.
pub fn sample_record() -> AuditRecord {
    AuditRecord::builder("Account", AuditAction::Update)
        .entity_id(Some("42".to_string()))
        .changed_by(Some("alice".to_string()))
        .source_address(Some("10.0.0.5".to_string()))
        .request_path(Some("/accounts/42".to_string()))
        .new_value(Some(r#"{"id":42,"owner":"alice"}"#.to_string()))
        .build()
}

/// Sink that keeps every record it is given.
#[derive(Debug)]
pub struct RecordingSink {
    kind: SinkKind,
    records: Mutex<Vec<AuditRecord>>,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::with_kind(SinkKind::Direct)
    }

    pub fn with_kind(kind: SinkKind) -> Self {
        Self {
            kind,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn last(&self) -> Option<AuditRecord> {
        self.records.lock().last().cloned()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn kind(&self) -> SinkKind {
        self.kind
    }

    fn name(&self) -> &str {
        "recording"
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Sink whose every write fails with [`SinkError::Unavailable`].
#[derive(Debug)]
pub struct FailingSink {
    message: String,
    calls: AtomicUsize,
}

impl FailingSink {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for FailingSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Direct
    }

    fn name(&self) -> &str {
        "failing"
    }

    async fn write(&self, _record: &AuditRecord) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Unavailable(self.message.clone()))
    }
}

/// Document store that logs every upsert and keeps the documents.
#[derive(Debug, Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<(String, String)>>,
    inner: InMemoryDocumentStore,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(index, id)` for every upsert, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn documents(&self) -> &InMemoryDocumentStore {
        &self.inner
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    fn name(&self) -> &str {
        "recording-store"
    }

    async fn upsert(&self, index: &str, id: &str, document: &Value) -> Result<(), SinkError> {
        self.calls.lock().push((index.to_string(), id.to_string()));
        self.inner.upsert(index, id, document).await
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = SharedBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Logs captured on the current thread until dropped.
pub struct LogCapture {
    buffer: SharedBuffer,
    _guard: DefaultGuard,
}

impl LogCapture {
    /// Everything logged so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.0.lock()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    /// Lines logged at `level` (e.g. `"ERROR"`).
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.split_whitespace().any(|word| word == level))
            .map(str::to_string)
            .collect()
    }
}

/// Install a thread-local subscriber that records every event at `TRACE`
/// and above. Works with `#[tokio::test]`'s current-thread runtime.
pub fn capture_logs() -> LogCapture {
    let buffer = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .without_time()
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    LogCapture {
        buffer,
        _guard: guard,
    }
}

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_config_lands_in_dir() {
        let dir = temp_dir();
        let path = write_config(dir.path(), "audit:\n  enabled: false\n");
        assert_eq!(path, dir.path().join("audit.yaml"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("enabled: false"));
    }

    #[test]
    fn test_sample_record_fields() {
        let record = sample_record();
        assert_eq!(record.entity_name(), "Account");
        assert_eq!(record.entity_id(), Some("42"));
        assert_eq!(record.changed_by(), Some("alice"));
        assert_eq!(record.action(), AuditAction::Update);
    }

    #[tokio::test]
    async fn test_recording_sink_keeps_records() {
        let sink = RecordingSink::with_kind(SinkKind::Queued);
        let record = sample_record();
        assert_ok!(sink.write(&record).await);
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.last(), Some(record));
        assert_eq!(sink.kind(), SinkKind::Queued);
    }

    #[tokio::test]
    async fn test_failing_sink_counts_calls() {
        let sink = FailingSink::new("disk full");
        let err = assert_err!(sink.write(&sample_record()).await);
        assert!(err.to_string().contains("disk full"));
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test]
    async fn test_recording_store_logs_upserts() {
        let store = RecordingStore::new();
        assert_ok!(store.upsert("audit-logs", "1", &serde_json::json!({"a": 1})).await);
        assert_ok!(store.upsert("audit-logs", "1", &serde_json::json!({"a": 2})).await);
        assert_eq!(store.calls().len(), 2);
        assert_eq!(store.documents().count("audit-logs"), 1);
        assert_eq!(store.documents().get("audit-logs", "1").unwrap()["a"], 2);
    }

    #[test]
    fn test_capture_logs_sees_events() {
        let logs = capture_logs();
        tracing::error!(record_id = "abc", "dispatch failed");
        tracing::debug!("noise");
        assert!(logs.contains("record_id=\"abc\"") || logs.contains("record_id=abc"));
        assert_eq!(logs.lines_at("ERROR").len(), 1);
    }
}
