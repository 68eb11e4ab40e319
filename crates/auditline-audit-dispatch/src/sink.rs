//! The sink abstraction.

use crate::SinkError;
use async_trait::async_trait;
use auditline_audit_types::AuditRecord;
use auditline_common_config::SinkKind;

/// A destination for audit records.
///
/// Implementations do not retry on their own; wrap them in
/// [`RetryingSink`](crate::RetryingSink) for that.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Backend family, used in failure logs.
    fn kind(&self) -> SinkKind;

    /// Human-readable sink name, used in failure logs.
    fn name(&self) -> &str;

    /// Persist or publish one record.
    async fn write(&self, record: &AuditRecord) -> Result<(), SinkError>;
}

