//! Auditline: a compliance audit trail for entity mutations.
//!
//! Each create, update or delete of an audited entity produces one
//! immutable record (who, what, when, from where) delivered to a document
//! store or a message broker.
//!
//! ```no_run
//! use auditline::{auditable, CallerContext, RequestContext};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Account { id: u64, owner: String }
//! auditable!(Account as "Account", id: u64);
//!
//! # async fn run() -> anyhow::Result<()> {
//! let pipeline = auditline::init("config")?;
//! let auditor = pipeline.auditor().clone();
//!
//! let caller = CallerContext::new(Some("alice"), Some("10.0.0.5"), Some("/accounts/42"));
//! RequestContext::scope(caller, async move {
//!     let account = Account { id: 42, owner: "alice".into() };
//!     auditor.before_update(&account).await;
//! })
//! .await;
//! # Ok(())
//! # }
//! ```

mod bootstrap;

pub use bootstrap::{init, init_logging, AuditPipeline};

pub use auditline_audit_capture::{auditable, Auditable, EntityAuditor, HasIdentifier, RecordBuilder};
pub use auditline_audit_context::{CallerContext, RequestContext};
pub use auditline_audit_dispatch::{
    index_queue, BrokerPublisher, BrokerSink, ChannelPublisher, DeliveryMode, DispatchSetup,
    DispatchStatsSnapshot, Dispatcher, DocumentStore, DocumentStoreSink, HttpBrokerPublisher,
    HttpDocumentStore, InMemoryDocumentStore, IndexerConfig, IndexerStats, PublishedMessage, RetryPolicy,
    RetryingSink, SetupError, Sink, SinkError, SinkKind,
};
pub use auditline_audit_types::{AuditAction, AuditRecord, AuditRecordId, Metadata};
pub use auditline_common_config::{AuditConfig, ConfigError, ConfigLoader};
