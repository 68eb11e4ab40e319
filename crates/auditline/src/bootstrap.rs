//! Startup wiring: logging, configuration, dispatcher, hooks.

use anyhow::{Context, Result};
use auditline_audit_capture::{EntityAuditor, RecordBuilder};
use auditline_audit_dispatch::{
    index_queue, Dispatcher, DocumentStore, IndexerConfig, IndexerStats, PublishedMessage,
};
use auditline_common_config::{AuditConfig, ConfigLoader, Environment};
use auditline_common_log::{LogConfig, LogError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A ready audit pipeline.
#[derive(Debug)]
pub struct AuditPipeline {
    config: AuditConfig,
    auditor: EntityAuditor,
    queue: Option<mpsc::Receiver<PublishedMessage>>,
}

impl AuditPipeline {
    /// Build from an already loaded configuration.
    pub fn from_config(config: AuditConfig) -> Result<Self> {
        let setup = Dispatcher::from_config(&config).context("invalid audit sink configuration")?;
        let auditor = EntityAuditor::new(RecordBuilder::from_config(&config), setup.dispatcher);
        Ok(Self {
            config,
            auditor,
            queue: setup.queue,
        })
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Hooks for the persistence layer. Clone freely.
    pub fn auditor(&self) -> &EntityAuditor {
        &self.auditor
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.auditor.dispatcher()
    }

    /// Take the in-process queue for a custom consumer.
    pub fn take_queue(&mut self) -> Option<mpsc::Receiver<PublishedMessage>> {
        self.queue.take()
    }

    /// Index the in-process queue into `store` on a background task.
    ///
    /// Returns `None` when records are not queued in-process or the queue
    /// was already taken.
    pub fn spawn_indexer(&mut self, store: Arc<dyn DocumentStore>) -> Option<JoinHandle<IndexerStats>> {
        let queue = self.queue.take()?;
        let config = IndexerConfig {
            index: self.config.sink.index.clone(),
            ..IndexerConfig::default()
        };
        Some(tokio::spawn(index_queue(queue, store, config)))
    }

    /// Wait up to `timeout` for detached deliveries before the host exits.
    /// Returns how many were still in flight.
    pub async fn shutdown(self, timeout: Duration) -> u64 {
        self.dispatcher().shutdown(timeout).await
    }
}

/// Install the global subscriber from `AUDITLINE_LOG_*`. An already
/// installed subscriber is kept.
pub fn init_logging() -> Result<()> {
    match auditline_common_log::init(LogConfig::from_env()) {
        Ok(()) => Ok(()),
        Err(LogError::InitError(reason)) => {
            debug!(%reason, "keeping existing tracing subscriber");
            Ok(())
        }
        Err(e) => Err(e).context("failed to initialize audit logging"),
    }
}

/// Start the audit pipeline from `<config_dir>/audit.yaml`.
///
/// Any configuration problem is returned here so the host can refuse to
/// start.
pub fn init(config_dir: impl AsRef<Path>) -> Result<AuditPipeline> {
    Environment::init().context("failed to load .env files")?;
    init_logging()?;

    let loader = ConfigLoader::new(config_dir.as_ref());
    let config = loader
        .load()
        .with_context(|| format!("failed to load {}", loader.config_path().display()))?;

    let pipeline = AuditPipeline::from_config(config)?;
    info!(
        service = %pipeline.config().service_name,
        compliance_tag = %pipeline.config().compliance_tag,
        sinks = ?pipeline.dispatcher().sink_names(),
        "audit pipeline ready"
    );
    Ok(pipeline)
}
