//! Turns an entity mutation plus caller context into an [`AuditRecord`].

use crate::Auditable;
use auditline_audit_context::CallerContext;
use auditline_audit_types::{AuditAction, AuditRecord, AuditRecordBuilder, Metadata};
use auditline_common_config::AuditConfig;
use serde::Serialize;
use tracing::warn;

/// Builds records stamped with this service's static fields.
///
/// Building never fails. An entity whose snapshot cannot be serialized
/// still yields a record, with the snapshot left empty and a warning logged.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    service_name: String,
    compliance_tag: String,
    metadata: Metadata,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new(
            AuditRecordBuilder::DEFAULT_SERVICE_NAME,
            AuditRecordBuilder::DEFAULT_COMPLIANCE_TAG,
        )
    }
}

impl RecordBuilder {
    pub fn new(service_name: impl Into<String>, compliance_tag: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            compliance_tag: compliance_tag.into(),
            metadata: Metadata::new(),
        }
    }

    /// Service name, compliance tag and static metadata from `audit.*`.
    pub fn from_config(config: &AuditConfig) -> Self {
        let metadata = config
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        Self {
            service_name: config.service_name.clone(),
            compliance_tag: config.compliance_tag.clone(),
            metadata,
        }
    }

    /// Add a metadata entry stamped on every record.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => {
                self.metadata.insert(key.into(), json);
            }
            Err(e) => warn!(error = %e, "ignoring unserializable static audit metadata"),
        }
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn compliance_tag(&self) -> &str {
        &self.compliance_tag
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Record for `entity` as it stands now.
    pub fn build<E>(&self, entity: &E, action: AuditAction, caller: &CallerContext) -> AuditRecord
    where
        E: Auditable + ?Sized,
    {
        self.assemble(None, entity, action, caller, Metadata::new())
    }

    /// Record carrying both the previous and the current snapshot.
    pub fn build_change<E>(
        &self,
        previous: Option<&E>,
        current: &E,
        action: AuditAction,
        caller: &CallerContext,
    ) -> AuditRecord
    where
        E: Auditable + ?Sized,
    {
        self.assemble(previous, current, action, caller, Metadata::new())
    }

    /// Like [`build`](Self::build) with extra per-call metadata. Per-call
    /// entries win over static ones with the same key.
    pub fn build_with_metadata<E>(
        &self,
        entity: &E,
        action: AuditAction,
        caller: &CallerContext,
        extra: Metadata,
    ) -> AuditRecord
    where
        E: Auditable + ?Sized,
    {
        self.assemble(None, entity, action, caller, extra)
    }

    fn assemble<E>(
        &self,
        previous: Option<&E>,
        current: &E,
        action: AuditAction,
        caller: &CallerContext,
        extra: Metadata,
    ) -> AuditRecord
    where
        E: Auditable + ?Sized,
    {
        let old_value = previous.and_then(snapshot);
        let new_value = snapshot(current);

        AuditRecord::builder(current.entity_name(), action)
            .entity_id(current.entity_id())
            .changed_by(caller.acting_user().map(str::to_owned))
            .source_address(caller.source_address().map(str::to_owned))
            .request_path(caller.request_path().map(str::to_owned))
            .old_value(old_value)
            .new_value(new_value)
            .service_name(self.service_name.as_str())
            .compliance_tag(self.compliance_tag.as_str())
            .extend_metadata(self.metadata.clone())
            .extend_metadata(extra)
            .build()
    }
}

/// Serialize an entity snapshot, logging instead of failing.
fn snapshot<E: Auditable + ?Sized>(entity: &E) -> Option<String> {
    match serde_json::to_string(entity) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(
                entity = %entity.entity_name(),
                entity_id = ?entity.entity_id(),
                error = %e,
                "failed to serialize audit snapshot"
            );
            None
        }
    }
}
