//! Configuration types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use strum::{Display, EnumString};

/// Root of the configuration file; everything lives under `audit:`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub audit: AuditConfig,
}

/// Audit pipeline configuration (`audit.*`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AuditConfig {
    /// Master switch; `false` turns dispatch into a no-op.
    pub enabled: bool,
    /// Name of the service emitting records.
    pub service_name: String,
    /// Regulatory label stamped on every record (e.g. `KYC`, `GDPR`).
    pub compliance_tag: String,
    /// Static metadata merged into every record.
    pub metadata: BTreeMap<String, String>,
    /// Sink selection and tuning.
    pub sink: SinkConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "default-service".to_string(),
            compliance_tag: "GENERAL".to_string(),
            metadata: BTreeMap::new(),
            sink: SinkConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Whether records will reach a backend at all.
    pub fn is_active(&self) -> bool {
        self.enabled && matches!(self.sink.kind, Some(SinkKind::Direct | SinkKind::Queued))
    }
}

/// Sink configuration (`audit.sink.*`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SinkConfig {
    /// Which backend receives records. Must be chosen explicitly while
    /// auditing is enabled; `none` is the documented way to disable sinks.
    pub kind: Option<SinkKind>,
    /// Document index for the direct sink.
    pub index: String,
    /// Topic for the queued sink.
    pub topic: String,
    /// Base URL of the document store or broker REST proxy. A queued sink
    /// without an endpoint publishes to an in-process queue.
    pub endpoint: Option<String>,
    /// Whether callers wait for the sink.
    pub delivery: DeliveryMode,
    /// Per-request timeout for HTTP backends.
    pub timeout_ms: u64,
    /// Capacity of the in-process queue.
    pub queue_capacity: usize,
    /// Credentials for HTTP backends.
    pub auth: Option<AuthConfig>,
    /// Retry policy; absent means a single attempt.
    pub retry: Option<RetryConfig>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: None,
            index: "audit-logs".to_string(),
            topic: "audit-logs".to_string(),
            endpoint: None,
            delivery: DeliveryMode::Acknowledged,
            timeout_ms: 5_000,
            queue_capacity: 10_000,
            auth: None,
            retry: None,
        }
    }
}

impl SinkConfig {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SinkKind {
    /// Write straight to a document store.
    Direct,
    /// Publish onto a broker topic.
    Queued,
    /// Auditing explicitly switched off at the sink level.
    None,
}

/// How the dispatcher hands records to sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeliveryMode {
    /// Caller awaits every sink write.
    #[default]
    Acknowledged,
    /// Writes run on a spawned task; the caller returns immediately.
    Detached,
}

/// Credentials for HTTP backends. At most one scheme may be set.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Retry with exponential backoff (`audit.sink.retry.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}
